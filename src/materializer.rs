//! Turns a backend's raw text reply into file writes on disk.
//!
//! The reply is scanned for blocks of the shape
//!
//! ````text
//! FILE: relative/path.ext
//! ```language
//! ...content...
//! ```
//! ````
//!
//! Each block becomes one file under the base directory. A reply with no
//! blocks is not an error; the full text is surfaced back to the caller as a
//! plain message instead.

use crate::error::Result;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

const FILE_MARKER: &str = "FILE:";

/// Outcome of materializing one reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Materialized {
    /// Relative paths written, in the order they appeared in the reply.
    Files(Vec<String>),
    /// No file blocks were found; the verbatim reply text.
    Message(String),
}

#[derive(Debug, Clone, PartialEq)]
struct ParsedFile {
    path: String,
    content: String,
}

/// Scan `text` for file blocks and write each one under `base_dir`.
///
/// Writes are sequential and not transactional: the first I/O failure aborts
/// the remaining writes and earlier files stay on disk. Paths are joined onto
/// `base_dir` exactly as the model wrote them, so a reply using `..` segments
/// can escape the base directory; callers own that trust decision.
pub fn materialize(text: &str, base_dir: &Path) -> Result<Materialized> {
    let files = parse_blocks(text);

    if files.is_empty() {
        debug!("No file blocks found in response");
        return Ok(Materialized::Message(text.to_string()));
    }

    let mut written = Vec::with_capacity(files.len());
    for file in files {
        let full_path = base_dir.join(&file.path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&full_path, &file.content)?;
        info!("Created: {}", file.path);
        written.push(file.path);
    }

    Ok(Materialized::Files(written))
}

/// Small-state scanner over the reply's lines: look for a `FILE:` marker
/// line, then an opening fence on the very next line, then collect until a
/// closing fence on its own line. An unterminated block at end of input is
/// discarded.
fn parse_blocks(text: &str) -> Vec<ParsedFile> {
    enum State {
        Scanning,
        ExpectFence { path: String },
        InBlock { path: String, body: Vec<String> },
    }

    let mut state = State::Scanning;
    let mut files = Vec::new();

    for raw_line in text.split('\n') {
        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);

        state = match state {
            State::Scanning => match marker_path(line) {
                Some(path) => State::ExpectFence { path },
                None => State::Scanning,
            },
            State::ExpectFence { path } => {
                if line.trim_start().starts_with("```") {
                    State::InBlock {
                        path,
                        body: Vec::new(),
                    }
                } else {
                    // Not a fence: re-examine this line as a fresh marker
                    // candidate so adjacent blocks are not swallowed.
                    match marker_path(line) {
                        Some(path) => State::ExpectFence { path },
                        None => State::Scanning,
                    }
                }
            }
            State::InBlock { path, mut body } => {
                if line == "```" {
                    files.push(ParsedFile {
                        path,
                        content: body.join("\n").trim().to_string(),
                    });
                    State::Scanning
                } else {
                    body.push(line.to_string());
                    State::InBlock { path, body }
                }
            }
        };
    }

    files
}

fn marker_path(line: &str) -> Option<String> {
    let rest = line.trim_start().strip_prefix(FILE_MARKER)?;
    let path = rest.trim();
    if path.is_empty() {
        None
    } else {
        Some(path.to_string())
    }
}
