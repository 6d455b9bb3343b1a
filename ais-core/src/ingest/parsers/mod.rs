//! Source-specific parsers
//!
//! Each supported source has a parser module that implements
//! the [`SessionParser`](super::SessionParser) trait.
//!
//! | Source | Module | Layout |
//! |--------|--------|--------|
//! | Claude Code | [`claude`] | `projects/<encoded-cwd>/<session>.jsonl` |
//! | Codex | [`codex`] | `sessions/YYYY/MM/DD/rollout-*.jsonl` |

mod claude;
mod codex;

pub use claude::ClaudeCodeParser;
pub use codex::CodexParser;

use super::SessionParser;
use crate::types::Source;

/// Get the parser for a source.
pub fn parser_for(source: Source) -> Box<dyn SessionParser> {
    match source {
        Source::Claude => Box::new(ClaudeCodeParser::new()),
        Source::Codex => Box::new(CodexParser::new()),
    }
}
