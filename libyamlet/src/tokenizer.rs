//! Tokenizer: turns a codepoint stream into a stream of tokens.
//!
//! The tokenizer is a context-sensitive state machine, not a regular
//! lexer. It owns the indent stack: every token that opens, continues or
//! closes a block collection carries an [`Indentation`] verdict, and the
//! composer synthesizes collection boundaries from those verdicts without
//! ever looking at a column itself.
//!
//! Scanning proceeds in three layers:
//!
//! 1. `Start` dispatches on the next codepoint: trivia (comments, blank
//!    lines, line breaks), document markers, indicators, or a scalar.
//! 2. Dedicated contexts handle multi-step constructs: directives, node
//!    properties, quoted scalars, and block scalar headers and bodies.
//! 3. `handle_indent` arbitrates every block construct's column against
//!    the indent stack and reports what opened and what closed.

use crate::error::{Mark, Result, YamlError};
use crate::reader::{CharSource, CodepointStream, StrSource};
use crate::token::{IndentChange, IndentEntry, IndentKind, Indentation, Token, TokenKind};

/// The active lexical context. Exactly one is active at a time; `Start`
/// is the rest state between tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexerContext {
    /// Between tokens; dispatches on the next codepoint.
    Start,
    /// After `%` at the start of a directive line.
    Directive,
    /// The handle part of a `%TAG` directive.
    TagHandle,
    /// The prefix part of a `%TAG` directive.
    TagPrefix,
    /// The payload of an unknown `%name` directive.
    ReservedDirective,
    /// An `&` anchor, `*` alias or `!` tag.
    NodeProperty,
    /// Inside a `"..."` scalar.
    DoubleQuote,
    /// Inside a `'...'` scalar.
    SingleQuote,
    /// The `|`/`>` indicator line with chomping and indentation hints.
    BlockHeader,
    /// The indented body of a block scalar.
    Literal,
}

/// Chomping behavior from a block scalar header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Chomping {
    Strip,
    Clip,
    Keep,
}

/// The tokenizer proper.
pub struct Tokenizer<S: CharSource> {
    stream: CodepointStream<S>,
    context: LexerContext,
    /// Open block collections, outermost first.
    indents: Vec<IndentEntry>,
    /// Nesting depth of flow collections; zero means block context.
    flow_level: usize,
    /// May the next scalar serve as an implicit mapping key?
    allow_simple_key: bool,
    /// Column of the first node property on this line, used as the key
    /// column when an anchored or tagged scalar turns out to be a key.
    property_column: Option<usize>,
    /// Name of the directive being scanned, carried into `ReservedDirective`.
    directive_name: String,
    /// Block scalar header, carried from `BlockHeader` into `Literal`.
    block_folded: bool,
    block_chomping: Chomping,
    block_increment: Option<usize>,
    block_mark: Mark,
    done: bool,
}

impl<'a> Tokenizer<StrSource<'a>> {
    /// Tokenizer over an in-memory string.
    pub fn from_text(input: &'a str) -> Self {
        Tokenizer::new(CodepointStream::new(StrSource::new(input)))
    }
}

impl<S: CharSource> Tokenizer<S> {
    pub fn new(stream: CodepointStream<S>) -> Self {
        Self {
            stream,
            context: LexerContext::Start,
            indents: Vec::new(),
            flow_level: 0,
            allow_simple_key: true,
            property_column: None,
            directive_name: String::new(),
            block_folded: false,
            block_chomping: Chomping::Clip,
            block_increment: None,
            block_mark: Mark::default(),
            done: false,
        }
    }

    /// Produce the next token. After the first `StreamEnd`, every further
    /// call returns another `StreamEnd`.
    pub fn next_token(&mut self) -> Result<Token> {
        if self.done {
            return Ok(Token::new(TokenKind::StreamEnd, "", self.stream.mark()));
        }
        loop {
            let token = match self.context {
                LexerContext::Start => self.scan_start()?,
                LexerContext::Directive => self.scan_directive()?,
                LexerContext::TagHandle => Some(self.scan_tag_handle()?),
                LexerContext::TagPrefix => Some(self.scan_tag_prefix()?),
                LexerContext::ReservedDirective => Some(self.scan_reserved_directive()?),
                LexerContext::NodeProperty => Some(self.scan_node_property()?),
                LexerContext::DoubleQuote => Some(self.scan_double_quoted()?),
                LexerContext::SingleQuote => Some(self.scan_single_quoted()?),
                LexerContext::BlockHeader => {
                    self.scan_block_header()?;
                    None
                }
                LexerContext::Literal => Some(self.scan_block_scalar()?),
            };
            if let Some(token) = token {
                return Ok(token);
            }
        }
    }

    // ====================================================================
    // Start context
    // ====================================================================

    fn scan_start(&mut self) -> Result<Option<Token>> {
        let at_line_start = self.stream.column() == 0;
        if at_line_start && self.flow_level == 0 {
            self.allow_simple_key = true;
            self.property_column = None;
        }
        self.skip_inline_space(at_line_start)?;
        let mark = self.stream.mark();
        let c = match self.stream.look()? {
            None => return self.stream_end().map(Some),
            Some(c) => c,
        };
        match c {
            '\n' | '\r' => {
                self.consume_break()?;
                let kind = if at_line_start {
                    TokenKind::EmptyLine
                } else {
                    TokenKind::LineBreak
                };
                return Ok(Some(Token::new(kind, "", mark)));
            }
            '#' => {
                self.stream.advance(1)?;
                let text = self.take_line()?;
                return Ok(Some(Token::new(TokenKind::Comment, text, mark)));
            }
            _ => {}
        }
        if mark.column == 0 {
            if let Some(kind) = self.check_document_marker()? {
                let report = self.close_all();
                self.stream.advance(3)?;
                self.flow_level = 0;
                self.allow_simple_key = true;
                return Ok(Some(Token::new(kind, "", mark).with_indent(report)));
            }
            if c == '%' && self.flow_level == 0 {
                self.context = LexerContext::Directive;
                return Ok(None);
            }
        }
        match c {
            '&' | '*' | '!' => {
                if self.property_column.is_none() {
                    self.property_column = Some(mark.column);
                }
                self.context = LexerContext::NodeProperty;
                Ok(None)
            }
            '\'' => {
                self.context = LexerContext::SingleQuote;
                Ok(None)
            }
            '"' => {
                self.context = LexerContext::DoubleQuote;
                Ok(None)
            }
            '|' | '>' if self.flow_level == 0 => {
                self.context = LexerContext::BlockHeader;
                Ok(None)
            }
            '|' | '>' => Err(YamlError::lexical(
                "block scalars are not allowed in flow context",
                mark,
            )),
            '[' => {
                self.stream.advance(1)?;
                self.flow_level += 1;
                Ok(Some(Token::new(TokenKind::FlowSequenceStart, "", mark)))
            }
            '{' => {
                self.stream.advance(1)?;
                self.flow_level += 1;
                Ok(Some(Token::new(TokenKind::FlowMappingStart, "", mark)))
            }
            ']' | '}' => {
                if self.flow_level == 0 {
                    return Err(YamlError::lexical(
                        format!("unexpected {c:?} outside flow context"),
                        mark,
                    ));
                }
                self.stream.advance(1)?;
                self.flow_level -= 1;
                let kind = if c == ']' {
                    TokenKind::FlowSequenceEnd
                } else {
                    TokenKind::FlowMappingEnd
                };
                Ok(Some(Token::new(kind, "", mark)))
            }
            ',' if self.flow_level > 0 => {
                self.stream.advance(1)?;
                Ok(Some(Token::new(TokenKind::FlowEntry, "", mark)))
            }
            '-' if is_blank_or_break(self.stream.peek(1)?) => {
                if self.flow_level > 0 {
                    return Err(YamlError::lexical(
                        "block sequence entries are not allowed in flow context",
                        mark,
                    ));
                }
                let report = self.handle_indent(IndentKind::Sequence, mark.column, mark)?;
                self.stream.advance(1)?;
                self.allow_simple_key = true;
                Ok(Some(Token::new(TokenKind::BlockEntry, "", mark).with_indent(report)))
            }
            '?' if is_blank_or_break(self.stream.peek(1)?)
                || (self.flow_level > 0 && is_flow_indicator(self.stream.peek(1)?)) =>
            {
                let token = Token::new(TokenKind::ExplicitKey, "", mark);
                self.stream.advance(1)?;
                if self.flow_level == 0 {
                    let report = self.handle_indent(IndentKind::Mapping, mark.column, mark)?;
                    self.allow_simple_key = true;
                    Ok(Some(token.with_indent(report)))
                } else {
                    Ok(Some(token))
                }
            }
            ':' if self.flow_level > 0 || is_blank_or_break(self.stream.peek(1)?) => {
                self.stream.advance(1)?;
                // A `:` resuming a mapping at its own column (explicit key
                // values) may close deeper collections.
                let report = if self.flow_level == 0
                    && self.allow_simple_key
                    && self
                        .indents
                        .iter()
                        .any(|e| e.kind == IndentKind::Mapping && e.column == mark.column)
                {
                    Some(self.handle_indent(IndentKind::Mapping, mark.column, mark)?)
                } else {
                    None
                };
                self.allow_simple_key = false;
                let token = Token::new(TokenKind::Value, "", mark);
                Ok(Some(match report {
                    Some(report) => token.with_indent(report),
                    None => token,
                }))
            }
            '@' | '`' => Err(YamlError::lexical(
                format!("reserved indicator {c:?} may not start a plain scalar"),
                mark,
            )),
            _ => {
                let token = self.scan_plain()?;
                Ok(Some(self.finish_scalar(token)?))
            }
        }
    }

    /// Skip spaces (and tabs where they are separation, not indentation).
    /// A tab used as indentation before content on a block line is fatal.
    fn skip_inline_space(&mut self, at_line_start: bool) -> Result<()> {
        loop {
            match self.stream.look()? {
                Some(' ') => {
                    self.stream.advance(1)?;
                }
                Some('\t') if self.flow_level == 0 && at_line_start => {
                    let mark = self.stream.mark();
                    let mut k = 0;
                    loop {
                        match self.stream.peek(k)? {
                            Some(' ') | Some('\t') => k += 1,
                            Some('#') | Some('\n') | Some('\r') | None => break,
                            Some(_) => return Err(YamlError::TabIndent { mark }),
                        }
                    }
                    self.stream.advance(k)?;
                }
                Some('\t') => {
                    self.stream.advance(1)?;
                }
                _ => return Ok(()),
            }
        }
    }

    /// `---` or `...` at column zero, followed by whitespace or the end of
    /// the line.
    fn check_document_marker(&mut self) -> Result<Option<TokenKind>> {
        let kind = match (self.stream.peek(0)?, self.stream.peek(1)?, self.stream.peek(2)?) {
            (Some('-'), Some('-'), Some('-')) => TokenKind::DocumentStart,
            (Some('.'), Some('.'), Some('.')) => TokenKind::DocumentEnd,
            _ => return Ok(None),
        };
        if is_blank_or_break(self.stream.peek(3)?) {
            Ok(Some(kind))
        } else {
            Ok(None)
        }
    }

    /// Rest of the current line, leaving the break unconsumed.
    fn take_line(&mut self) -> Result<String> {
        let mut text = String::new();
        while let Some(c) = self.stream.look()? {
            if c == '\n' || c == '\r' {
                break;
            }
            text.push(c);
            self.stream.advance(1)?;
        }
        Ok(text)
    }

    fn consume_break(&mut self) -> Result<()> {
        if self.stream.look()? == Some('\r') {
            self.stream.advance(1)?;
            if self.stream.look()? == Some('\n') {
                self.stream.advance(1)?;
            }
        } else {
            self.stream.advance(1)?;
        }
        Ok(())
    }

    fn stream_end(&mut self) -> Result<Token> {
        self.done = true;
        let mark = self.stream.mark();
        let report = self.close_all();
        Ok(Token::new(TokenKind::StreamEnd, "", mark).with_indent(report))
    }

    fn close_all(&mut self) -> Indentation {
        let mut closed = Vec::new();
        while let Some(entry) = self.indents.pop() {
            closed.push(entry.kind);
        }
        Indentation {
            change: if closed.is_empty() {
                None
            } else {
                Some(IndentChange::Decrease)
            },
            opened: None,
            closed,
        }
    }

    // ====================================================================
    // Indent stack
    // ====================================================================

    /// Arbitrate a block construct of `kind` found at `column` against the
    /// indent stack. The stack holds open block collections with strictly
    /// increasing columns, except that a sequence may share the column of
    /// the mapping it nests under.
    fn handle_indent(
        &mut self,
        kind: IndentKind,
        column: usize,
        mark: Mark,
    ) -> Result<Indentation> {
        let mut closed = Vec::new();
        while let Some(top) = self.indents.last() {
            if top.column > column {
                closed.push(top.kind);
                self.indents.pop();
            } else {
                break;
            }
        }
        let popped = !closed.is_empty();
        let change = |opened_or_closed: bool| {
            if popped {
                IndentChange::Decrease
            } else if opened_or_closed {
                IndentChange::Increase
            } else {
                IndentChange::NoChange
            }
        };
        match self.indents.last().copied() {
            None => {
                self.indents.push(IndentEntry { column, kind });
                Ok(Indentation {
                    change: Some(change(true)),
                    opened: Some(kind),
                    closed,
                })
            }
            Some(top) if top.column < column => {
                if popped {
                    // Dedented to a column no open block ever used.
                    return Err(YamlError::indentation(
                        "indentation does not match any open block",
                        mark,
                    ));
                }
                self.indents.push(IndentEntry { column, kind });
                Ok(Indentation {
                    change: Some(IndentChange::Increase),
                    opened: Some(kind),
                    closed,
                })
            }
            Some(top) if top.kind == kind => Ok(Indentation {
                change: Some(change(false)),
                opened: None,
                closed,
            }),
            Some(_) => {
                if self
                    .indents
                    .iter()
                    .any(|e| e.column == column && e.kind == kind)
                {
                    // Reopen the matching collection deeper in the stack.
                    while let Some(top) = self.indents.last() {
                        if top.column == column && top.kind == kind {
                            break;
                        }
                        closed.push(top.kind);
                        self.indents.pop();
                    }
                    Ok(Indentation {
                        change: Some(IndentChange::Decrease),
                        opened: None,
                        closed,
                    })
                } else if kind == IndentKind::Sequence {
                    // A sequence may sit at the column of its parent mapping.
                    self.indents.push(IndentEntry { column, kind });
                    Ok(Indentation {
                        change: Some(change(true)),
                        opened: Some(kind),
                        closed,
                    })
                } else {
                    Err(YamlError::indentation(
                        "mapping at the same indentation as an open sequence",
                        mark,
                    ))
                }
            }
        }
    }

    // ====================================================================
    // Plain scalars
    // ====================================================================

    fn scan_plain(&mut self) -> Result<Token> {
        let start = self.stream.mark();
        let indent = self.indents.last().map(|e| e.column + 1).unwrap_or(0);
        let mut chunks = String::new();
        let mut spaces = String::new();
        'outer: loop {
            // A run of content characters.
            let mut length = 0;
            loop {
                let c = match self.stream.peek(length)? {
                    None => break,
                    Some(c) => c,
                };
                if matches!(c, ' ' | '\t' | '\n' | '\r') {
                    break;
                }
                if c == ':' {
                    let next = self.stream.peek(length + 1)?;
                    if is_blank_or_break(next)
                        || (self.flow_level > 0 && is_flow_indicator(next))
                    {
                        break;
                    }
                }
                if self.flow_level > 0 && matches!(c, ',' | '[' | ']' | '{' | '}') {
                    break;
                }
                length += 1;
            }
            if length == 0 {
                break 'outer;
            }
            chunks.push_str(&spaces);
            spaces.clear();
            for _ in 0..length {
                if let Some(c) = self.stream.bump()? {
                    chunks.push(c);
                }
            }
            // Whitespace after the run: separation, folding, or the end.
            let mut ws = String::new();
            while matches!(self.stream.look()?, Some(' ') | Some('\t')) {
                if let Some(c) = self.stream.bump()? {
                    ws.push(c);
                }
            }
            match self.stream.look()? {
                None => break 'outer,
                Some('#') => break 'outer,
                Some('\n') | Some('\r') => {
                    self.consume_break()?;
                    let mut breaks = String::new();
                    loop {
                        if self.stream.column() == 0 && self.check_document_marker()?.is_some() {
                            break 'outer;
                        }
                        while self.stream.look()? == Some(' ') {
                            self.stream.advance(1)?;
                        }
                        match self.stream.look()? {
                            Some('\n') | Some('\r') => {
                                self.consume_break()?;
                                breaks.push('\n');
                            }
                            _ => break,
                        }
                    }
                    if self.stream.look()?.is_none() {
                        break 'outer;
                    }
                    if self.flow_level == 0 && self.stream.column() < indent {
                        break 'outer;
                    }
                    if self.stream.look()? == Some('#') {
                        break 'outer;
                    }
                    if self.flow_level == 0
                        && self.stream.look()? == Some('-')
                        && is_blank_or_break(self.stream.peek(1)?)
                    {
                        break 'outer;
                    }
                    spaces.clear();
                    if breaks.is_empty() {
                        spaces.push(' ');
                    } else {
                        spaces.push_str(&breaks);
                    }
                }
                _ => {
                    spaces = ws;
                }
            }
        }
        Ok(Token::new(TokenKind::PlainScalar, chunks, start))
    }

    /// Post-scalar bookkeeping shared by plain and quoted scalars: in
    /// block context, a scalar followed on the same line by `: ` is an
    /// implicit mapping key and takes the indent verdict.
    fn finish_scalar(&mut self, mut token: Token) -> Result<Token> {
        if self.flow_level == 0 && self.stream.line() == token.mark.line {
            while matches!(self.stream.look()?, Some(' ') | Some('\t')) {
                self.stream.advance(1)?;
            }
            if self.stream.look()? == Some(':') && is_blank_or_break(self.stream.peek(1)?) {
                if !self.allow_simple_key {
                    return Err(YamlError::lexical(
                        "mapping values are not allowed in this context",
                        self.stream.mark(),
                    ));
                }
                let column = self.property_column.take().unwrap_or(token.mark.column);
                let report = self.handle_indent(IndentKind::Mapping, column, token.mark)?;
                token = token.with_indent(report);
            }
        }
        self.allow_simple_key = false;
        Ok(token)
    }

    // ====================================================================
    // Quoted scalars
    // ====================================================================

    fn scan_single_quoted(&mut self) -> Result<Token> {
        let start = self.stream.mark();
        self.stream.advance(1)?;
        let mut chunks = String::new();
        loop {
            match self.stream.look()? {
                None => {
                    return Err(YamlError::lexical(
                        "unexpected end of stream within single-quoted scalar",
                        start,
                    ))
                }
                Some('\'') => {
                    if self.stream.peek(1)? == Some('\'') {
                        chunks.push('\'');
                        self.stream.advance(2)?;
                    } else {
                        self.stream.advance(1)?;
                        break;
                    }
                }
                Some(' ') | Some('\t') | Some('\n') | Some('\r') => {
                    self.scan_quoted_whitespace(&mut chunks, start)?;
                }
                Some(c) => {
                    chunks.push(c);
                    self.stream.advance(1)?;
                }
            }
        }
        self.context = LexerContext::Start;
        let token = Token::new(TokenKind::SingleQuoted, chunks, start);
        self.finish_scalar(token)
    }

    fn scan_double_quoted(&mut self) -> Result<Token> {
        let start = self.stream.mark();
        self.stream.advance(1)?;
        let mut chunks = String::new();
        loop {
            match self.stream.look()? {
                None => {
                    return Err(YamlError::lexical(
                        "unexpected end of stream within double-quoted scalar",
                        start,
                    ))
                }
                Some('"') => {
                    self.stream.advance(1)?;
                    break;
                }
                Some('\\') => self.scan_escape(&mut chunks)?,
                Some(' ') | Some('\t') | Some('\n') | Some('\r') => {
                    self.scan_quoted_whitespace(&mut chunks, start)?;
                }
                Some(c) => {
                    chunks.push(c);
                    self.stream.advance(1)?;
                }
            }
        }
        self.context = LexerContext::Start;
        let token = Token::new(TokenKind::DoubleQuoted, chunks, start);
        self.finish_scalar(token)
    }

    /// Whitespace and line folding inside a quoted scalar: a single break
    /// folds to a space, further breaks each contribute a newline, and
    /// whitespace around a fold is discarded.
    fn scan_quoted_whitespace(&mut self, chunks: &mut String, start: Mark) -> Result<()> {
        let mut ws = String::new();
        while matches!(self.stream.look()?, Some(' ') | Some('\t')) {
            if let Some(c) = self.stream.bump()? {
                ws.push(c);
            }
        }
        match self.stream.look()? {
            None => Err(YamlError::lexical(
                "unexpected end of stream within quoted scalar",
                start,
            )),
            Some('\n') | Some('\r') => {
                self.consume_break()?;
                let breaks = self.scan_quoted_breaks(start)?;
                if breaks.is_empty() {
                    chunks.push(' ');
                } else {
                    chunks.push_str(&breaks);
                }
                Ok(())
            }
            _ => {
                chunks.push_str(&ws);
                Ok(())
            }
        }
    }

    /// Blank lines inside a quoted scalar, one `\n` per blank line.
    fn scan_quoted_breaks(&mut self, start: Mark) -> Result<String> {
        let mut breaks = String::new();
        loop {
            if self.stream.column() == 0 && self.check_document_marker()?.is_some() {
                return Err(YamlError::lexical(
                    "unexpected document marker within quoted scalar",
                    self.stream.mark(),
                ));
            }
            while matches!(self.stream.look()?, Some(' ') | Some('\t')) {
                self.stream.advance(1)?;
            }
            match self.stream.look()? {
                Some('\n') | Some('\r') => {
                    self.consume_break()?;
                    breaks.push('\n');
                }
                None => {
                    return Err(YamlError::lexical(
                        "unexpected end of stream within quoted scalar",
                        start,
                    ))
                }
                _ => return Ok(breaks),
            }
        }
    }

    fn scan_escape(&mut self, chunks: &mut String) -> Result<()> {
        self.stream.advance(1)?;
        let mark = self.stream.mark();
        let c = match self.stream.look()? {
            None => {
                return Err(YamlError::lexical(
                    "unexpected end of stream within escape sequence",
                    mark,
                ))
            }
            Some(c) => c,
        };
        if c == '\n' || c == '\r' {
            // Escaped line break: the break vanishes, blank lines stay.
            self.consume_break()?;
            loop {
                while matches!(self.stream.look()?, Some(' ') | Some('\t')) {
                    self.stream.advance(1)?;
                }
                match self.stream.look()? {
                    Some('\n') | Some('\r') => {
                        self.consume_break()?;
                        chunks.push('\n');
                    }
                    _ => return Ok(()),
                }
            }
        }
        let simple = match c {
            '0' => Some('\0'),
            'a' => Some('\u{07}'),
            'b' => Some('\u{08}'),
            't' | '\t' => Some('\t'),
            'n' => Some('\n'),
            'v' => Some('\u{0B}'),
            'f' => Some('\u{0C}'),
            'r' => Some('\r'),
            'e' => Some('\u{1B}'),
            ' ' => Some(' '),
            '"' => Some('"'),
            '/' => Some('/'),
            '\\' => Some('\\'),
            'N' => Some('\u{85}'),
            '_' => Some('\u{A0}'),
            'L' => Some('\u{2028}'),
            'P' => Some('\u{2029}'),
            _ => None,
        };
        if let Some(out) = simple {
            self.stream.advance(1)?;
            chunks.push(out);
            return Ok(());
        }
        let width = match c {
            'x' => 2,
            'u' => 4,
            'U' => 8,
            _ => {
                return Err(YamlError::lexical(
                    format!("unknown escape character {c:?}"),
                    mark,
                ))
            }
        };
        self.stream.advance(1)?;
        let mut code: u32 = 0;
        for _ in 0..width {
            let digit = match self.stream.look()?.and_then(|d| d.to_digit(16)) {
                Some(d) => d,
                None => {
                    return Err(YamlError::lexical(
                        format!("expected {width} hexadecimal digits in escape sequence"),
                        self.stream.mark(),
                    ))
                }
            };
            code = code * 16 + digit;
            self.stream.advance(1)?;
        }
        match char::from_u32(code) {
            Some(out) => {
                chunks.push(out);
                Ok(())
            }
            None => Err(YamlError::lexical(
                format!("escape sequence U+{code:04X} is not a Unicode code point"),
                mark,
            )),
        }
    }

    // ====================================================================
    // Block scalars
    // ====================================================================

    /// The `|`/`>` header: optional chomping (`+`/`-`) and indentation
    /// indicator (`1`-`9`) in either order, then only whitespace or a
    /// comment before the line break.
    fn scan_block_header(&mut self) -> Result<()> {
        self.block_mark = self.stream.mark();
        self.block_folded = self.stream.bump()? == Some('>');
        self.block_chomping = Chomping::Clip;
        self.block_increment = None;
        let mut saw_chomping = false;
        let mut saw_digit = false;
        loop {
            match self.stream.look()? {
                Some('+') | Some('-') if !saw_chomping => {
                    self.block_chomping = if self.stream.look()? == Some('+') {
                        Chomping::Keep
                    } else {
                        Chomping::Strip
                    };
                    saw_chomping = true;
                    self.stream.advance(1)?;
                }
                Some(d @ '1'..='9') if !saw_digit => {
                    self.block_increment = d.to_digit(10).map(|d| d as usize);
                    saw_digit = true;
                    self.stream.advance(1)?;
                }
                Some('0') => {
                    return Err(YamlError::lexical(
                        "block scalar indentation indicator must be between 1 and 9",
                        self.stream.mark(),
                    ))
                }
                _ => break,
            }
        }
        while matches!(self.stream.look()?, Some(' ') | Some('\t')) {
            self.stream.advance(1)?;
        }
        if self.stream.look()? == Some('#') {
            self.take_line()?;
        }
        match self.stream.look()? {
            None => {}
            Some('\n') | Some('\r') => self.consume_break()?,
            Some(c) => {
                return Err(YamlError::lexical(
                    format!("expected a comment or a line break after block scalar header, found {c:?}"),
                    self.stream.mark(),
                ))
            }
        }
        self.allow_simple_key = true;
        self.context = LexerContext::Literal;
        Ok(())
    }

    fn scan_block_scalar(&mut self) -> Result<Token> {
        let folded = self.block_folded;
        let min_indent = self.indents.last().map(|e| e.column + 1).unwrap_or(0);
        let mut chunks = String::new();
        let mut breaks;
        let indent;
        if let Some(increment) = self.block_increment {
            indent = min_indent + increment - 1;
            breaks = self.scan_block_breaks(indent)?;
        } else {
            let (leading, max_indent) = self.scan_block_indentation()?;
            breaks = leading;
            indent = std::cmp::max(min_indent, max_indent);
        }
        let mut line_break = String::new();
        while self.stream.column() == indent && self.stream.look()?.is_some() {
            chunks.push_str(&breaks);
            let leading_blank = matches!(self.stream.look()?, Some(' ') | Some('\t'));
            let line = self.take_line()?;
            chunks.push_str(&line);
            line_break.clear();
            if self.stream.look()?.is_some() {
                self.consume_break()?;
                line_break.push('\n');
            }
            breaks = self.scan_block_breaks(indent)?;
            if self.stream.column() == indent && self.stream.look()?.is_some() {
                let next_blank = matches!(self.stream.look()?, Some(' ') | Some('\t'));
                // A single break between two non-indented lines folds to a
                // space; anything else keeps its break.
                if folded && line_break == "\n" && !leading_blank && !next_blank {
                    if breaks.is_empty() {
                        chunks.push(' ');
                    }
                } else {
                    chunks.push_str(&line_break);
                }
            } else {
                break;
            }
        }
        match self.block_chomping {
            Chomping::Strip => {}
            Chomping::Clip => chunks.push_str(&line_break),
            Chomping::Keep => {
                chunks.push_str(&line_break);
                chunks.push_str(&breaks);
            }
        }
        self.context = LexerContext::Start;
        let kind = if folded {
            TokenKind::FoldedScalar
        } else {
            TokenKind::LiteralScalar
        };
        Ok(Token::new(kind, chunks, self.block_mark))
    }

    /// Consume blank lines and the indentation of the next content line,
    /// collecting one `\n` per blank line.
    fn scan_block_breaks(&mut self, indent: usize) -> Result<String> {
        let mut breaks = String::new();
        loop {
            while self.stream.column() < indent && self.stream.look()? == Some(' ') {
                self.stream.advance(1)?;
            }
            match self.stream.look()? {
                Some('\n') | Some('\r') => {
                    self.consume_break()?;
                    breaks.push('\n');
                }
                _ => return Ok(breaks),
            }
        }
    }

    /// Auto-detect content indentation: consume leading blank lines and
    /// report the deepest whitespace column seen among them.
    fn scan_block_indentation(&mut self) -> Result<(String, usize)> {
        let mut breaks = String::new();
        let mut max_indent = 0;
        loop {
            match self.stream.look()? {
                Some('\n') | Some('\r') => {
                    self.consume_break()?;
                    breaks.push('\n');
                }
                Some(' ') => {
                    self.stream.advance(1)?;
                    if self.stream.column() > max_indent {
                        max_indent = self.stream.column();
                    }
                }
                _ => return Ok((breaks, max_indent)),
            }
        }
    }

    // ====================================================================
    // Node properties
    // ====================================================================

    fn scan_node_property(&mut self) -> Result<Token> {
        let mark = self.stream.mark();
        self.context = LexerContext::Start;
        match self.stream.look()? {
            Some(indicator @ ('&' | '*')) => {
                self.stream.advance(1)?;
                let mut name = String::new();
                while let Some(c) = self.stream.look()? {
                    if c.is_alphanumeric() || c == '-' || c == '_' {
                        name.push(c);
                        self.stream.advance(1)?;
                    } else {
                        break;
                    }
                }
                if name.is_empty() {
                    return Err(YamlError::lexical(
                        format!("expected an anchor name after {indicator:?}"),
                        mark,
                    ));
                }
                if indicator == '*' {
                    self.allow_simple_key = false;
                    Ok(Token::new(TokenKind::Alias, name, mark))
                } else {
                    Ok(Token::new(TokenKind::Anchor, name, mark))
                }
            }
            Some('!') => self.scan_tag(mark),
            _ => Err(YamlError::lexical("expected a node property", mark)),
        }
    }

    /// A tag in any of its spellings: `!`, `!suffix`, `!!suffix`,
    /// `!handle!suffix` or `!<verbatim>`. The raw text is carried; the
    /// composer resolves handles against the tag directives in force.
    fn scan_tag(&mut self, mark: Mark) -> Result<Token> {
        let mut text = String::from("!");
        self.stream.advance(1)?;
        if self.stream.look()? == Some('<') {
            text.push('<');
            self.stream.advance(1)?;
            loop {
                match self.stream.look()? {
                    Some('>') => {
                        text.push('>');
                        self.stream.advance(1)?;
                        break;
                    }
                    Some(c) if !matches!(c, '\n' | '\r') => {
                        text.push(c);
                        self.stream.advance(1)?;
                    }
                    _ => {
                        return Err(YamlError::lexical("unterminated verbatim tag", mark));
                    }
                }
            }
        } else {
            while let Some(c) = self.stream.look()? {
                if is_blank_or_break(Some(c)) {
                    break;
                }
                if self.flow_level > 0 && matches!(c, ',' | '[' | ']' | '{' | '}') {
                    break;
                }
                text.push(c);
                self.stream.advance(1)?;
            }
        }
        Ok(Token::new(TokenKind::Tag, text, mark))
    }

    // ====================================================================
    // Directives
    // ====================================================================

    fn scan_directive(&mut self) -> Result<Option<Token>> {
        let mark = self.stream.mark();
        self.stream.advance(1)?;
        let mut name = String::new();
        while let Some(c) = self.stream.look()? {
            if c.is_alphanumeric() || c == '-' {
                name.push(c);
                self.stream.advance(1)?;
            } else {
                break;
            }
        }
        if name.is_empty() {
            return Err(YamlError::lexical("expected a directive name after '%'", mark));
        }
        match name.as_str() {
            "YAML" => {
                while matches!(self.stream.look()?, Some(' ') | Some('\t')) {
                    self.stream.advance(1)?;
                }
                let mut version = String::new();
                while let Some(c) = self.stream.look()? {
                    if c.is_ascii_digit() || c == '.' {
                        version.push(c);
                        self.stream.advance(1)?;
                    } else {
                        break;
                    }
                }
                let well_formed = matches!(
                    version.split('.').collect::<Vec<_>>().as_slice(),
                    [major, minor]
                        if !major.is_empty() && !minor.is_empty()
                            && major.chars().all(|c| c.is_ascii_digit())
                            && minor.chars().all(|c| c.is_ascii_digit())
                );
                if !well_formed {
                    return Err(YamlError::lexical(
                        "expected a version of the form major.minor in %YAML directive",
                        self.stream.mark(),
                    ));
                }
                self.context = LexerContext::Start;
                Ok(Some(Token::new(TokenKind::VersionDirective, version, mark)))
            }
            "TAG" => {
                self.context = LexerContext::TagHandle;
                Ok(Some(Token::new(TokenKind::TagDirective, "", mark)))
            }
            _ => {
                self.directive_name = name;
                self.context = LexerContext::ReservedDirective;
                Ok(None)
            }
        }
    }

    fn scan_tag_handle(&mut self) -> Result<Token> {
        while matches!(self.stream.look()?, Some(' ') | Some('\t')) {
            self.stream.advance(1)?;
        }
        let mark = self.stream.mark();
        if self.stream.look()? != Some('!') {
            return Err(YamlError::lexical(
                "expected a tag handle in %TAG directive",
                mark,
            ));
        }
        let mut handle = String::from("!");
        self.stream.advance(1)?;
        while let Some(c) = self.stream.look()? {
            if c.is_alphanumeric() || c == '-' {
                handle.push(c);
                self.stream.advance(1)?;
            } else {
                break;
            }
        }
        if self.stream.look()? == Some('!') {
            handle.push('!');
            self.stream.advance(1)?;
        } else if handle.len() > 1 {
            // `!name` without the closing `!` is not a handle.
            return Err(YamlError::lexical(
                "expected '!' to close the tag handle in %TAG directive",
                self.stream.mark(),
            ));
        }
        if !is_blank_or_break(self.stream.look()?) {
            return Err(YamlError::lexical(
                "expected whitespace after tag handle in %TAG directive",
                self.stream.mark(),
            ));
        }
        self.context = LexerContext::TagPrefix;
        Ok(Token::new(TokenKind::TagHandle, handle, mark))
    }

    fn scan_tag_prefix(&mut self) -> Result<Token> {
        while matches!(self.stream.look()?, Some(' ') | Some('\t')) {
            self.stream.advance(1)?;
        }
        let mark = self.stream.mark();
        let mut prefix = String::new();
        while let Some(c) = self.stream.look()? {
            if is_blank_or_break(Some(c)) {
                break;
            }
            prefix.push(c);
            self.stream.advance(1)?;
        }
        if prefix.is_empty() {
            return Err(YamlError::lexical(
                "expected a tag prefix in %TAG directive",
                mark,
            ));
        }
        self.context = LexerContext::Start;
        Ok(Token::new(TokenKind::TagPrefix, prefix, mark))
    }

    fn scan_reserved_directive(&mut self) -> Result<Token> {
        let mark = self.stream.mark();
        let rest = self.take_line()?;
        let name = std::mem::take(&mut self.directive_name);
        self.context = LexerContext::Start;
        Ok(Token::new(
            TokenKind::ReservedDirective,
            format!("%{name}{rest}"),
            mark,
        ))
    }
}

/// Whitespace, a line break, or the end of input.
fn is_blank_or_break(c: Option<char>) -> bool {
    matches!(c, None | Some(' ') | Some('\t') | Some('\n') | Some('\r'))
}

fn is_flow_indicator(c: Option<char>) -> bool {
    matches!(c, Some(',') | Some('[') | Some(']') | Some('{') | Some('}'))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// All tokens with trivia (comments, blank lines, breaks) removed.
    fn tokens(input: &str) -> Vec<Token> {
        let mut tokenizer = Tokenizer::from_text(input);
        let mut out = Vec::new();
        loop {
            let token = tokenizer.next_token().unwrap();
            let done = token.kind == TokenKind::StreamEnd;
            if !matches!(
                token.kind,
                TokenKind::Comment | TokenKind::EmptyLine | TokenKind::LineBreak
            ) {
                out.push(token);
            }
            if done {
                return out;
            }
        }
    }

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokens(input).iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_mapping() {
        let toks = tokens("a: 1\nb: 2\n");
        assert_eq!(
            toks.iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![
                TokenKind::PlainScalar,
                TokenKind::Value,
                TokenKind::PlainScalar,
                TokenKind::PlainScalar,
                TokenKind::Value,
                TokenKind::PlainScalar,
                TokenKind::StreamEnd,
            ]
        );
        let a = &toks[0];
        assert_eq!(a.lexeme, "a");
        let report = a.indent.as_ref().unwrap();
        assert_eq!(report.change, Some(IndentChange::Increase));
        assert_eq!(report.opened, Some(IndentKind::Mapping));
        let b = &toks[3];
        assert_eq!(b.indent.as_ref().unwrap().change, Some(IndentChange::NoChange));
        let end = toks.last().unwrap();
        assert_eq!(
            end.indent.as_ref().unwrap().closed,
            vec![IndentKind::Mapping]
        );
    }

    #[test]
    fn test_sequence_under_mapping_same_column() {
        let toks = tokens("a:\n- 1\n- 2\n");
        let entry = toks
            .iter()
            .find(|t| t.kind == TokenKind::BlockEntry)
            .unwrap();
        let report = entry.indent.as_ref().unwrap();
        assert_eq!(report.change, Some(IndentChange::Increase));
        assert_eq!(report.opened, Some(IndentKind::Sequence));
        let end = toks.last().unwrap();
        assert_eq!(
            end.indent.as_ref().unwrap().closed,
            vec![IndentKind::Sequence, IndentKind::Mapping]
        );
    }

    #[test]
    fn test_mapping_under_sequence_entry() {
        let toks = tokens("- a: 1\n- b: 2\n");
        // The second entry closes the nested mapping opened by `a:`.
        let second = toks
            .iter()
            .filter(|t| t.kind == TokenKind::BlockEntry)
            .nth(1)
            .unwrap();
        let report = second.indent.as_ref().unwrap();
        assert_eq!(report.change, Some(IndentChange::Decrease));
        assert_eq!(report.closed, vec![IndentKind::Mapping]);
    }

    #[test]
    fn test_dedent_closes_nested_mapping() {
        let toks = tokens("a:\n  b: 1\nc: 2\n");
        let c = toks
            .iter()
            .filter(|t| t.kind == TokenKind::PlainScalar)
            .find(|t| t.lexeme == "c")
            .unwrap();
        let report = c.indent.as_ref().unwrap();
        assert_eq!(report.change, Some(IndentChange::Decrease));
        assert_eq!(report.closed, vec![IndentKind::Mapping]);
        assert_eq!(report.opened, None);
    }

    #[test]
    fn test_flow_tokens() {
        assert_eq!(
            kinds("[1, {a: 2}]"),
            vec![
                TokenKind::FlowSequenceStart,
                TokenKind::PlainScalar,
                TokenKind::FlowEntry,
                TokenKind::FlowMappingStart,
                TokenKind::PlainScalar,
                TokenKind::Value,
                TokenKind::PlainScalar,
                TokenKind::FlowMappingEnd,
                TokenKind::FlowSequenceEnd,
                TokenKind::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_double_quoted_escapes() {
        let toks = tokens(r#""a\tb\u00e9\n""#);
        assert_eq!(toks[0].kind, TokenKind::DoubleQuoted);
        assert_eq!(toks[0].lexeme, "a\tbé\n");
    }

    #[test]
    fn test_single_quoted_doubling() {
        let toks = tokens("'it''s'");
        assert_eq!(toks[0].lexeme, "it's");
    }

    #[test]
    fn test_quoted_folding() {
        let toks = tokens("\"a\n b\"");
        assert_eq!(toks[0].lexeme, "a b");
    }

    #[test]
    fn test_plain_multiline_folds() {
        let toks = tokens("a: b\n   c\n");
        assert_eq!(toks[2].lexeme, "b c");
    }

    #[test]
    fn test_plain_stops_at_block_entry_line() {
        let toks = tokens("x\n- y\n");
        assert_eq!(toks[0].lexeme, "x");
        assert_eq!(toks[1].kind, TokenKind::BlockEntry);
        assert_eq!(toks[2].lexeme, "y");
    }

    #[test]
    fn test_literal_chomping_variants() {
        let clip = tokens("a: |\n  x\n  y\n\n");
        assert_eq!(clip[2].kind, TokenKind::LiteralScalar);
        assert_eq!(clip[2].lexeme, "x\ny\n");
        let strip = tokens("a: |-\n  x\n  y\n\n");
        assert_eq!(strip[2].lexeme, "x\ny");
        let keep = tokens("a: |+\n  x\n  y\n\n");
        assert_eq!(keep[2].lexeme, "x\ny\n\n");
    }

    #[test]
    fn test_folded_scalar_folds_single_breaks() {
        let toks = tokens("a: >\n  x\n  y\n\n  z\n");
        assert_eq!(toks[2].kind, TokenKind::FoldedScalar);
        assert_eq!(toks[2].lexeme, "x y\nz\n");
    }

    #[test]
    fn test_value_after_value_is_an_error() {
        let mut tokenizer = Tokenizer::from_text("a: b: 1\n");
        let err = loop {
            match tokenizer.next_token() {
                Ok(t) if t.kind == TokenKind::StreamEnd => panic!("expected an error"),
                Ok(_) => continue,
                Err(e) => break e,
            }
        };
        assert!(matches!(err, YamlError::Lexical { .. }));
    }

    #[test]
    fn test_tab_indentation_rejected() {
        let mut tokenizer = Tokenizer::from_text("a:\n\tb: 1\n");
        let err = loop {
            match tokenizer.next_token() {
                Ok(t) if t.kind == TokenKind::StreamEnd => panic!("expected an error"),
                Ok(_) => continue,
                Err(e) => break e,
            }
        };
        assert!(matches!(err, YamlError::TabIndent { .. }));
    }

    #[test]
    fn test_document_markers() {
        assert_eq!(
            kinds("---\na\n...\n"),
            vec![
                TokenKind::DocumentStart,
                TokenKind::PlainScalar,
                TokenKind::DocumentEnd,
                TokenKind::StreamEnd,
            ]
        );
    }

    #[test]
    fn test_directives() {
        let toks = tokens("%YAML 1.2\n%TAG !e! tag:example.com,2026:\n---\na\n");
        assert_eq!(toks[0].kind, TokenKind::VersionDirective);
        assert_eq!(toks[0].lexeme, "1.2");
        assert_eq!(toks[1].kind, TokenKind::TagDirective);
        assert_eq!(toks[2].kind, TokenKind::TagHandle);
        assert_eq!(toks[2].lexeme, "!e!");
        assert_eq!(toks[3].kind, TokenKind::TagPrefix);
        assert_eq!(toks[3].lexeme, "tag:example.com,2026:");
        assert_eq!(toks[4].kind, TokenKind::DocumentStart);
    }

    #[test]
    fn test_anchor_and_alias() {
        let toks = tokens("a: &x 1\nb: *x\n");
        assert_eq!(toks[2].kind, TokenKind::Anchor);
        assert_eq!(toks[2].lexeme, "x");
        assert_eq!(toks[6].kind, TokenKind::Alias);
        assert_eq!(toks[6].lexeme, "x");
    }

    #[test]
    fn test_tags() {
        let toks = tokens("!!str 1");
        assert_eq!(toks[0].kind, TokenKind::Tag);
        assert_eq!(toks[0].lexeme, "!!str");
        let toks = tokens("!<tag:example.com,2026:thing> 1");
        assert_eq!(toks[0].lexeme, "!<tag:example.com,2026:thing>");
    }

    #[test]
    fn test_mapping_at_sequence_column_rejected() {
        let mut tokenizer = Tokenizer::from_text("- 1\na: 2\n");
        let err = loop {
            match tokenizer.next_token() {
                Ok(t) if t.kind == TokenKind::StreamEnd => panic!("expected an error"),
                Ok(_) => continue,
                Err(e) => break e,
            }
        };
        assert!(matches!(err, YamlError::Indentation { .. }));
    }

    #[test]
    fn test_comment_tokens_carry_text() {
        let mut tokenizer = Tokenizer::from_text("# hello\na: 1\n");
        let first = tokenizer.next_token().unwrap();
        assert_eq!(first.kind, TokenKind::Comment);
        assert_eq!(first.lexeme, " hello");
    }
}
