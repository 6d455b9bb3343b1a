//! Transcript discovery
//!
//! Walks each configured root and returns every `.jsonl` file beneath it.
//! Discovery is best-effort: missing roots and unreadable entries are skipped
//! without error. No file is opened here.

use crate::config::SourceRoots;
use crate::types::{FileDescriptor, Source};
use std::path::Path;
use std::time::UNIX_EPOCH;
use walkdir::{DirEntry, WalkDir};

/// Extension shared by both transcript formats.
pub const LOG_EXTENSION: &str = "jsonl";

/// Discover candidate log files under every configured root.
///
/// Output order is unspecified.
pub fn scan_roots(roots: &SourceRoots) -> Vec<FileDescriptor> {
    let mut files = Vec::new();
    for (source, root) in roots.iter() {
        let found = scan_root(source, root);
        tracing::debug!(
            source = %source,
            root = %root.display(),
            count = found.len(),
            "Scanned root"
        );
        files.extend(found);
    }
    files
}

/// Discover candidate log files under a single root.
pub fn scan_root(source: Source, root: &Path) -> Vec<FileDescriptor> {
    if !root.is_dir() {
        return Vec::new();
    }

    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !is_excluded_dir(source, entry))
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| is_candidate_file(source, entry.path()))
        .filter_map(|entry| describe(source, &entry))
        .collect()
}

fn is_excluded_dir(source: Source, entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| source.excluded_dir_names().contains(&name))
}

fn is_candidate_file(source: Source, path: &Path) -> bool {
    if path.extension().and_then(|e| e.to_str()) != Some(LOG_EXTENSION) {
        return false;
    }
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    !source
        .excluded_file_fragments()
        .iter()
        .any(|fragment| name.contains(fragment))
}

fn describe(source: Source, entry: &DirEntry) -> Option<FileDescriptor> {
    let metadata = entry.metadata().ok()?;
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    Some(FileDescriptor {
        path: entry.path().to_path_buf(),
        source,
        mtime,
        size: metadata.len() as i64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "{}\n").unwrap();
    }

    #[test]
    fn test_missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let files = scan_root(Source::Claude, &dir.path().join("nope"));
        assert!(files.is_empty());
    }

    #[test]
    fn test_claude_exclusions() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        touch(&root.join("-home-me-proj/a.jsonl"));
        touch(&root.join("-home-me-proj/nested/b.jsonl"));
        touch(&root.join("-home-me-proj/subagents/agent-1.jsonl"));
        touch(&root.join("-home-me-proj/sessions-index.jsonl"));
        touch(&root.join("-home-me-proj/notes.txt"));

        let mut names: Vec<_> = scan_root(Source::Claude, root)
            .into_iter()
            .map(|f| f.path.strip_prefix(root).unwrap().to_path_buf())
            .collect();
        names.sort();

        assert_eq!(
            names,
            vec![
                Path::new("-home-me-proj/a.jsonl").to_path_buf(),
                Path::new("-home-me-proj/nested/b.jsonl").to_path_buf(),
            ]
        );
    }

    #[test]
    fn test_codex_has_no_exclusions() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        touch(&root.join("2025/01/02/rollout-1.jsonl"));
        touch(&root.join("subagents/rollout-2.jsonl"));

        let files = scan_root(Source::Codex, root);
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.source == Source::Codex));
        assert!(files.iter().all(|f| f.size == 3));
    }

    #[test]
    fn test_root_named_like_excluded_dir_is_scanned() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("subagents");
        touch(&root.join("a.jsonl"));

        assert_eq!(scan_root(Source::Claude, &root).len(), 1);
    }

    #[test]
    fn test_scan_roots_tags_sources() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("claude/p/a.jsonl"));
        touch(&dir.path().join("codex/2025/rollout.jsonl"));

        let roots = SourceRoots::new(dir.path().join("claude"), dir.path().join("codex"));
        let files = scan_roots(&roots);

        assert_eq!(files.len(), 2);
        assert_eq!(
            files.iter().filter(|f| f.source == Source::Claude).count(),
            1
        );
        assert!(files.iter().all(|f| f.mtime > 0));
    }
}
