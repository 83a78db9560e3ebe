//! Token stream vocabulary shared by the tokenizer and the composer.

use crate::error::Mark;

/// The closed set of token kinds the tokenizer can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// `---` at column zero.
    DocumentStart,
    /// `...` at column zero.
    DocumentEnd,
    /// `-` introducing a block sequence entry.
    BlockEntry,
    /// `?` introducing an explicit mapping key.
    ExplicitKey,
    /// `:` separating a key from its value.
    Value,
    /// `[`
    FlowSequenceStart,
    /// `]`
    FlowSequenceEnd,
    /// `{`
    FlowMappingStart,
    /// `}`
    FlowMappingEnd,
    /// `,` inside a flow collection.
    FlowEntry,
    /// Unquoted scalar.
    PlainScalar,
    /// `'...'` scalar.
    SingleQuoted,
    /// `"..."` scalar.
    DoubleQuoted,
    /// `|` block scalar body.
    LiteralScalar,
    /// `>` block scalar body.
    FoldedScalar,
    /// `*name`
    Alias,
    /// `&name`
    Anchor,
    /// `!`, `!!suffix`, `!handle!suffix` or `!<verbatim>`.
    Tag,
    /// The handle part of a `%TAG` directive.
    TagHandle,
    /// The prefix part of a `%TAG` directive.
    TagPrefix,
    /// `%YAML major.minor`
    VersionDirective,
    /// `%TAG`, followed by a `TagHandle` and a `TagPrefix` token.
    TagDirective,
    /// Any other `%name ...` directive line, carried verbatim.
    ReservedDirective,
    /// `# ...` to end of line.
    Comment,
    /// A line containing only whitespace.
    EmptyLine,
    /// A line break outside any scalar.
    LineBreak,
    /// End of the input stream.
    StreamEnd,
}

/// Which kind of block collection an indent-stack entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndentKind {
    Sequence,
    Mapping,
}

/// Direction of an indentation change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndentChange {
    Increase,
    NoChange,
    Decrease,
}

/// One entry on the indent stack: the column a block collection opened at
/// and its kind. Columns increase bottom-to-top, except that a Sequence
/// may share a Mapping's column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndentEntry {
    pub column: usize,
    pub kind: IndentKind,
}

/// The tokenizer's verdict on a block construct's indentation, attached to
/// the token that triggered it. The composer synthesizes collection
/// start/end events from this and never inspects columns itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Indentation {
    pub change: Option<IndentChange>,
    /// Kind of the collection this construct newly opened, if any.
    pub opened: Option<IndentKind>,
    /// Collections closed by this construct, innermost first.
    pub closed: Vec<IndentKind>,
}

impl Indentation {
    pub fn is_empty(&self) -> bool {
        self.change.is_none() && self.opened.is_none() && self.closed.is_empty()
    }
}

/// A single token.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    /// Scalar content, anchor/alias/handle name, tag text, or directive
    /// payload; empty for pure indicator tokens.
    pub lexeme: String,
    /// Where the token started.
    pub mark: Mark,
    /// Indentation verdict, present on tokens that open, continue or close
    /// block collections (and on document/stream boundaries, which close
    /// everything still open).
    pub indent: Option<Indentation>,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, mark: Mark) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            mark,
            indent: None,
        }
    }

    pub fn with_indent(mut self, indent: Indentation) -> Self {
        if !indent.is_empty() {
            self.indent = Some(indent);
        }
        self
    }

    /// Is this token one of the scalar styles?
    pub fn is_scalar(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::PlainScalar
                | TokenKind::SingleQuoted
                | TokenKind::DoubleQuoted
                | TokenKind::LiteralScalar
                | TokenKind::FoldedScalar
        )
    }
}
