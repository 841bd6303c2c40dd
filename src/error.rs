//! Errors surfaced by a parse.
//!
//! Individual malformed lines never show up here; the scanner drops them and
//! carries on. Each variant is a terminal result of a whole parse call.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    /// The backing file could not be opened or mapped.
    #[error("can't open link map {}: {source}", path.display())]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The scan finished but never saw a `# Path:` header, so there is no
    /// map to return.
    #[error("no link map found in input")]
    ParseFailed,

    /// Cancellation was observed mid-scan.
    #[error("parse canceled")]
    Canceled,

    #[error("unknown parse failure: {0}")]
    Unknown(String),
}

pub type Result<T> = std::result::Result<T, ParseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_failed_names_the_path() {
        let err = ParseError::OpenFailed {
            path: PathBuf::from("/nowhere/App-LinkMap.txt"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert_eq!(
            err.to_string(),
            "can't open link map /nowhere/App-LinkMap.txt: gone"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn terminal_kinds_display() {
        assert_eq!(ParseError::ParseFailed.to_string(), "no link map found in input");
        assert_eq!(ParseError::Canceled.to_string(), "parse canceled");
    }
}
