//! Error types for YAML composing and emitting.

use std::fmt;
use thiserror::Error;

/// Result type for YAML engine operations.
pub type Result<T> = std::result::Result<T, YamlError>;

/// A position in the source text. Lines and columns are zero-based
/// internally and rendered one-based for humans.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Mark {
    pub line: usize,
    pub column: usize,
}

impl Mark {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line + 1, self.column + 1)
    }
}

/// Error type for YAML composing.
///
/// Every failure is fatal for the whole parse or emit call; there are no
/// warnings and no partial results.
#[derive(Error, Debug)]
pub enum YamlError {
    /// Non-printable code point in the input.
    #[error("non-printable code point U+{codepoint:04X} at {mark}")]
    NonPrintable { codepoint: u32, mark: Mark },

    /// The underlying reader failed.
    #[error("read error: {0}")]
    Reader(#[from] std::io::Error),

    /// The input is not valid UTF-8.
    #[error("invalid UTF-8 byte sequence in input")]
    InvalidUtf8,

    /// Malformed lexical construct (bad escape, unterminated scalar,
    /// invalid indicator usage, malformed block scalar header).
    #[error("{message} at {mark}")]
    Lexical { message: String, mark: Mark },

    /// Tab used as indentation.
    #[error("tab characters may not be used for indentation at {mark}")]
    TabIndent { mark: Mark },

    /// Indentation that does not correspond to any open block.
    #[error("{message} at {mark}")]
    Indentation { message: String, mark: Mark },

    /// Structural violation in the document grammar.
    #[error("{message} at {mark}")]
    Grammar { message: String, mark: Mark },

    /// Alias referring to an anchor that was never defined.
    #[error("undefined anchor *{name} at {mark}")]
    UndefinedAnchor { name: String, mark: Mark },

    /// Anchor defined twice without permission.
    #[error("anchor &{name} redefined at {mark}")]
    AnchorRedefined { name: String, mark: Mark },

    /// Duplicate `%YAML` directive in one document.
    #[error("duplicate %YAML directive at {mark}")]
    DuplicateVersionDirective { mark: Mark },

    /// Duplicate `%TAG` handle in one document.
    #[error("duplicate %TAG handle {handle} at {mark}")]
    DuplicateTagHandle { handle: String, mark: Mark },

    /// YAML version this engine cannot process.
    #[error("unsupported YAML version {version} at {mark}")]
    UnsupportedVersion { version: String, mark: Mark },

    /// Duplicate mapping key without permission.
    #[error("duplicate mapping key {key:?}")]
    DuplicateKey { key: String },

    /// The composed value does not match the expected shape.
    #[error("{message} at {path}")]
    Projection { message: String, path: String },

    /// Error wrapped with the name of the file it came from.
    #[error("{source} in <{filename}>")]
    InFile {
        filename: String,
        #[source]
        source: Box<YamlError>,
    },
}

impl YamlError {
    /// Build a lexical error at a position.
    pub fn lexical(message: impl Into<String>, mark: Mark) -> Self {
        YamlError::Lexical {
            message: message.into(),
            mark,
        }
    }

    /// Build an indentation error at a position.
    pub fn indentation(message: impl Into<String>, mark: Mark) -> Self {
        YamlError::Indentation {
            message: message.into(),
            mark,
        }
    }

    /// Build a grammar error at a position.
    pub fn grammar(message: impl Into<String>, mark: Mark) -> Self {
        YamlError::Grammar {
            message: message.into(),
            mark,
        }
    }

    /// Build a projection error at a dotted field path.
    pub fn projection(message: impl Into<String>, path: impl Into<String>) -> Self {
        YamlError::Projection {
            message: message.into(),
            path: path.into(),
        }
    }

    /// Attach a filename for error reporting.
    pub fn in_file(self, filename: &str) -> Self {
        YamlError::InFile {
            filename: filename.to_string(),
            source: Box::new(self),
        }
    }
}
