//! Parse events: the flat representation between tokens and trees.
//!
//! The composer lowers the token stream into a sequence of events per
//! document; the serializer produces the same event language from a value
//! tree, and the emitter writes events back out as text. One event
//! language on both paths keeps composition and emission symmetric.

use crate::token::TokenKind;

/// Presentation style of a scalar, preserved from the source text so the
/// emitter can reproduce it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarStyle {
    Plain,
    SingleQuoted,
    DoubleQuoted,
    Literal,
    Folded,
}

impl ScalarStyle {
    pub(crate) fn from_token(kind: TokenKind) -> Option<Self> {
        match kind {
            TokenKind::PlainScalar => Some(ScalarStyle::Plain),
            TokenKind::SingleQuoted => Some(ScalarStyle::SingleQuoted),
            TokenKind::DoubleQuoted => Some(ScalarStyle::DoubleQuoted),
            TokenKind::LiteralScalar => Some(ScalarStyle::Literal),
            TokenKind::FoldedScalar => Some(ScalarStyle::Folded),
            _ => None,
        }
    }
}

/// Which kind of collection an event opens or closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Sequence,
    Mapping,
}

/// One parse event.
///
/// A document is a balanced event sequence: every `StartCollection` has a
/// matching `EndCollection` of the same kind, and scalars and aliases are
/// leaves. `DocumentBoundary` only appears in multi-document streams
/// handed to the emitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseEvent {
    Scalar {
        value: String,
        style: ScalarStyle,
        anchor: Option<String>,
        tag: Option<String>,
    },
    StartCollection {
        kind: CollectionKind,
        /// Written in flow style (`[...]`/`{...}`) in the source, and
        /// emitted that way again.
        flow: bool,
        anchor: Option<String>,
        tag: Option<String>,
    },
    EndCollection {
        kind: CollectionKind,
    },
    /// A `*name` reference, only present before alias resolution.
    Alias {
        name: String,
    },
    /// Separates documents in a multi-document event stream.
    DocumentBoundary,
}

impl ParseEvent {
    /// Plain scalar with no properties.
    pub fn plain(value: impl Into<String>) -> Self {
        ParseEvent::Scalar {
            value: value.into(),
            style: ScalarStyle::Plain,
            anchor: None,
            tag: None,
        }
    }

    pub fn start(kind: CollectionKind, flow: bool) -> Self {
        ParseEvent::StartCollection {
            kind,
            flow,
            anchor: None,
            tag: None,
        }
    }

    pub fn end(kind: CollectionKind) -> Self {
        ParseEvent::EndCollection { kind }
    }

    /// The anchor property, if this event can carry one.
    pub fn anchor(&self) -> Option<&str> {
        match self {
            ParseEvent::Scalar { anchor, .. } | ParseEvent::StartCollection { anchor, .. } => {
                anchor.as_deref()
            }
            _ => None,
        }
    }
}
