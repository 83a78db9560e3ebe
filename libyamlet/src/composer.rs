//! Composer: drives the document grammar over the token stream.
//!
//! The composer turns tokens into balanced [`ParseEvent`] sequences, one
//! per document:
//!
//! 1. Directives (`%YAML`, `%TAG`) are consumed and validated before the
//!    document body; tag handles resolve `!handle!suffix` tags.
//! 2. Block collection boundaries come from the indentation verdicts the
//!    tokenizer attached to tokens; flow boundaries come from delimiter
//!    tokens directly.
//! 3. Anchors record the balanced event slice of the node they name;
//!    aliases splice a clone of that slice back into the stream, so the
//!    output events never contain aliases.
//!
//! [`build_tree`] then folds one document's events into a [`Value`].

use std::collections::{HashMap, HashSet};

use crate::error::{Mark, Result, YamlError};
use crate::event::{CollectionKind, ParseEvent, ScalarStyle};
use crate::reader::{CharSource, CodepointStream, StrSource};
use crate::schema::{Schema, YAML_TAG_PREFIX};
use crate::token::{IndentChange, IndentKind, Indentation, Token, TokenKind};
use crate::tokenizer::Tokenizer;
use crate::value::Value;

/// Options governing composition.
#[derive(Debug, Clone)]
pub struct ComposeOptions {
    pub schema: Schema,
    /// Permit an anchor name to be bound more than once per document;
    /// later bindings win for subsequent aliases.
    pub allow_anchor_redefinition: bool,
    /// Permit duplicate mapping keys; the last entry wins.
    pub allow_map_entry_redefinition: bool,
    /// Lenient shape matching: absent fields read as null, null fields
    /// match optional shapes.
    pub allow_data_projection: bool,
    /// Require tuple elements to match their shapes positionally.
    pub strict_tuple_order: bool,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            schema: Schema::Core,
            allow_anchor_redefinition: false,
            allow_map_entry_redefinition: false,
            allow_data_projection: false,
            strict_tuple_order: true,
        }
    }
}

/// What the composer expects next in block context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    /// A node: the document root, a sequence entry or a mapping value.
    Value,
    /// A sequence entry's node, after `-`.
    Entry,
    /// An explicit key's node, after `?`.
    Key,
    /// The `:` following a mapping key.
    Separator,
    /// The current node is complete.
    Done,
}

/// Node properties waiting for the node they decorate.
#[derive(Debug, Default)]
struct Props {
    anchor: Option<String>,
    tag: Option<String>,
    /// Line and position of the first property, to decide whether the
    /// properties belong to a collection opened on a later line.
    line: Option<usize>,
    mark: Mark,
}

impl Props {
    fn is_empty(&self) -> bool {
        self.anchor.is_none() && self.tag.is_none()
    }

    fn take(&mut self) -> (Option<String>, Option<String>) {
        self.line = None;
        (self.anchor.take(), self.tag.take())
    }
}

/// Per-document event accumulation plus the anchor table.
#[derive(Debug, Default)]
struct DocumentState {
    events: Vec<ParseEvent>,
    /// Anchor name to the balanced, anchor-stripped event slice it names.
    anchors: HashMap<String, Vec<ParseEvent>>,
    /// Anchored collections whose subtree has not closed yet.
    open_anchors: Vec<OpenAnchor>,
    depth: usize,
}

#[derive(Debug)]
struct OpenAnchor {
    name: String,
    start: usize,
    depth: usize,
}

impl DocumentState {
    fn push(&mut self, event: ParseEvent, mark: Mark, allow_redefinition: bool) -> Result<()> {
        let index = self.events.len();
        let anchor_name = event.anchor().map(str::to_string);
        let starts = matches!(event, ParseEvent::StartCollection { .. });
        let ends = matches!(event, ParseEvent::EndCollection { .. });
        self.events.push(event);
        if starts {
            self.depth += 1;
            if let Some(name) = anchor_name {
                self.check_redefinition(&name, mark, allow_redefinition)?;
                self.open_anchors.push(OpenAnchor {
                    name,
                    start: index,
                    depth: self.depth,
                });
            }
        } else if ends {
            self.depth -= 1;
            while let Some(open) = self.open_anchors.last() {
                if open.depth != self.depth + 1 {
                    break;
                }
                let slice = strip_anchors(&self.events[open.start..]);
                let name = open.name.clone();
                self.open_anchors.pop();
                self.anchors.insert(name, slice);
            }
        } else if let Some(name) = anchor_name {
            self.check_redefinition(&name, mark, allow_redefinition)?;
            let slice = strip_anchors(&self.events[index..index + 1]);
            self.anchors.insert(name, slice);
        }
        Ok(())
    }

    fn check_redefinition(&self, name: &str, mark: Mark, allow: bool) -> Result<()> {
        if !allow
            && (self.anchors.contains_key(name)
                || self.open_anchors.iter().any(|open| open.name == name))
        {
            return Err(YamlError::AnchorRedefined {
                name: name.to_string(),
                mark,
            });
        }
        Ok(())
    }

    /// Re-emit the events an alias names.
    fn splice_alias(&mut self, name: &str, mark: Mark) -> Result<()> {
        match self.anchors.get(name) {
            Some(slice) => {
                let clone = slice.clone();
                self.events.extend(clone);
                Ok(())
            }
            None => Err(YamlError::UndefinedAnchor {
                name: name.to_string(),
                mark,
            }),
        }
    }
}

/// Clone a balanced slice with anchor properties removed, so splicing it
/// does not rebind the anchors it came from.
fn strip_anchors(events: &[ParseEvent]) -> Vec<ParseEvent> {
    events
        .iter()
        .map(|event| {
            let mut event = event.clone();
            match &mut event {
                ParseEvent::Scalar { anchor, .. }
                | ParseEvent::StartCollection { anchor, .. } => *anchor = None,
                _ => {}
            }
            event
        })
        .collect()
}

fn default_tag_handles() -> HashMap<String, String> {
    let mut handles = HashMap::new();
    handles.insert("!".to_string(), "!".to_string());
    handles.insert("!!".to_string(), YAML_TAG_PREFIX.to_string());
    handles
}

/// The composer proper. Call [`Composer::next_document`] until it
/// returns `None`.
pub struct Composer<S: CharSource> {
    tokenizer: Tokenizer<S>,
    options: ComposeOptions,
    peeked: Option<Token>,
    tag_handles: HashMap<String, String>,
}

impl<'a> Composer<StrSource<'a>> {
    /// Composer over an in-memory string.
    pub fn from_text(input: &'a str, options: &ComposeOptions) -> Self {
        Composer::new(CodepointStream::new(StrSource::new(input)), options)
    }
}

impl<S: CharSource> Composer<S> {
    pub fn new(stream: CodepointStream<S>, options: &ComposeOptions) -> Self {
        Self {
            tokenizer: Tokenizer::new(stream),
            options: options.clone(),
            peeked: None,
            tag_handles: default_tag_handles(),
        }
    }

    /// Next token, skipping comments and blank-line trivia.
    fn next_significant(&mut self) -> Result<Token> {
        loop {
            let token = self.tokenizer.next_token()?;
            if !matches!(
                token.kind,
                TokenKind::Comment | TokenKind::EmptyLine | TokenKind::LineBreak
            ) {
                return Ok(token);
            }
        }
    }

    fn take(&mut self) -> Result<Token> {
        match self.peeked.take() {
            Some(token) => Ok(token),
            None => self.next_significant(),
        }
    }

    fn peek(&mut self) -> Result<&Token> {
        if self.peeked.is_none() {
            let token = self.next_significant()?;
            self.peeked = Some(token);
        }
        match self.peeked.as_ref() {
            Some(token) => Ok(token),
            None => Err(YamlError::grammar("token stream exhausted", Mark::default())),
        }
    }

    /// Compose the next document into a balanced event sequence, or
    /// `None` at the end of the stream.
    pub fn next_document(&mut self) -> Result<Option<Vec<ParseEvent>>> {
        self.tag_handles = default_tag_handles();
        let mut declared_handles: HashSet<String> = HashSet::new();
        let mut version_seen = false;
        let mut had_directives = false;
        loop {
            match self.peek()?.kind {
                TokenKind::VersionDirective => {
                    let token = self.take()?;
                    if version_seen {
                        return Err(YamlError::DuplicateVersionDirective { mark: token.mark });
                    }
                    version_seen = true;
                    had_directives = true;
                    check_version(&token)?;
                }
                TokenKind::TagDirective => {
                    self.take()?;
                    had_directives = true;
                    let handle = self.expect(TokenKind::TagHandle)?;
                    let prefix = self.expect(TokenKind::TagPrefix)?;
                    if !declared_handles.insert(handle.lexeme.clone()) {
                        return Err(YamlError::DuplicateTagHandle {
                            handle: handle.lexeme,
                            mark: handle.mark,
                        });
                    }
                    if prefix.lexeme != YAML_TAG_PREFIX && prefix.lexeme != "!" {
                        return Err(YamlError::grammar(
                            format!(
                                "tag prefix {:?} is not supported; only the default global prefix may be bound",
                                prefix.lexeme
                            ),
                            prefix.mark,
                        ));
                    }
                    self.tag_handles.insert(handle.lexeme, prefix.lexeme);
                }
                TokenKind::ReservedDirective => {
                    // Collected and ignored.
                    self.take()?;
                    had_directives = true;
                }
                TokenKind::DocumentEnd => {
                    self.take()?;
                }
                TokenKind::DocumentStart => {
                    self.take()?;
                    break;
                }
                TokenKind::StreamEnd => {
                    if had_directives {
                        let mark = self.peek()?.mark;
                        return Err(YamlError::grammar(
                            "expected '---' after directives",
                            mark,
                        ));
                    }
                    return Ok(None);
                }
                _ => {
                    if had_directives {
                        let mark = self.peek()?.mark;
                        return Err(YamlError::grammar(
                            "expected '---' after directives",
                            mark,
                        ));
                    }
                    break;
                }
            }
        }
        self.compose_content().map(Some)
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        let token = self.take()?;
        if token.kind != kind {
            return Err(YamlError::grammar(
                format!("expected {kind:?}, found {:?}", token.kind),
                token.mark,
            ));
        }
        Ok(token)
    }

    /// The document body: a flat loop over block-context tokens, with
    /// recursion only for flow collections.
    fn compose_content(&mut self) -> Result<Vec<ParseEvent>> {
        let mut doc = DocumentState::default();
        let mut stack: Vec<(CollectionKind, Expect)> = Vec::new();
        let mut expect = Expect::Value;
        let mut props = Props::default();
        loop {
            let token = self.peek()?;
            match token.kind {
                TokenKind::DocumentStart | TokenKind::StreamEnd => {
                    let report = token.indent.clone().unwrap_or_default();
                    let mark = token.mark;
                    self.close_document(&mut doc, &mut stack, &mut expect, &mut props, report, mark)?;
                    // The boundary also starts the next document; leave it.
                    break;
                }
                TokenKind::DocumentEnd => {
                    let token = self.take()?;
                    let report = token.indent.clone().unwrap_or_default();
                    self.close_document(&mut doc, &mut stack, &mut expect, &mut props, report, token.mark)?;
                    break;
                }
                _ => {}
            }
            let token = self.take()?;
            match token.kind {
                TokenKind::Anchor => {
                    if props.anchor.is_some() {
                        return Err(YamlError::grammar(
                            "a node may carry at most one anchor",
                            token.mark,
                        ));
                    }
                    if props.line.is_none() {
                        props.line = Some(token.mark.line);
                        props.mark = token.mark;
                    }
                    props.anchor = Some(token.lexeme);
                }
                TokenKind::Tag => {
                    if props.tag.is_some() {
                        return Err(YamlError::grammar(
                            "a node may carry at most one tag",
                            token.mark,
                        ));
                    }
                    if props.line.is_none() {
                        props.line = Some(token.mark.line);
                        props.mark = token.mark;
                    }
                    props.tag = Some(self.resolve_tag(&token.lexeme, token.mark)?);
                }
                TokenKind::Alias => {
                    if !props.is_empty() {
                        return Err(YamlError::grammar(
                            "an alias node may not carry properties",
                            token.mark,
                        ));
                    }
                    match expect {
                        Expect::Value | Expect::Entry => {
                            doc.splice_alias(&token.lexeme, token.mark)?;
                            expect = Expect::Done;
                        }
                        Expect::Key => {
                            doc.splice_alias(&token.lexeme, token.mark)?;
                            expect = Expect::Separator;
                        }
                        _ => {
                            return Err(YamlError::grammar(
                                format!("unexpected alias *{}", token.lexeme),
                                token.mark,
                            ))
                        }
                    }
                }
                TokenKind::BlockEntry => {
                    let report = token.indent.clone().unwrap_or_default();
                    self.apply_report(&mut doc, &mut stack, &mut expect, &mut props, report, token.mark, false)?;
                    match stack.last() {
                        Some((CollectionKind::Sequence, _)) if expect == Expect::Done => {
                            expect = Expect::Entry;
                        }
                        _ => {
                            return Err(YamlError::grammar(
                                "misplaced block sequence entry",
                                token.mark,
                            ))
                        }
                    }
                }
                TokenKind::ExplicitKey => {
                    let report = token.indent.clone().unwrap_or_default();
                    self.apply_report(&mut doc, &mut stack, &mut expect, &mut props, report, token.mark, false)?;
                    match stack.last() {
                        Some((CollectionKind::Mapping, _)) if expect == Expect::Done => {
                            expect = Expect::Key;
                        }
                        _ => {
                            return Err(YamlError::grammar(
                                "misplaced explicit key indicator",
                                token.mark,
                            ))
                        }
                    }
                }
                TokenKind::Value => {
                    let report = token.indent.clone().unwrap_or_default();
                    self.apply_report(&mut doc, &mut stack, &mut expect, &mut props, report, token.mark, true)?;
                    if expect != Expect::Separator {
                        return Err(YamlError::grammar(
                            "mapping values are not allowed in this context",
                            token.mark,
                        ));
                    }
                    expect = Expect::Value;
                }
                kind if token.is_scalar() => {
                    let is_key = token.indent.is_some();
                    let report = token.indent.clone().unwrap_or_default();
                    self.apply_report(&mut doc, &mut stack, &mut expect, &mut props, report, token.mark, false)?;
                    if is_key {
                        match stack.last() {
                            Some((CollectionKind::Mapping, _)) if expect == Expect::Done => {
                                expect = Expect::Key;
                            }
                            _ => {
                                return Err(YamlError::grammar(
                                    "misplaced mapping key",
                                    token.mark,
                                ))
                            }
                        }
                    }
                    let style = match ScalarStyle::from_token(kind) {
                        Some(style) => style,
                        None => {
                            return Err(YamlError::grammar("expected a scalar", token.mark))
                        }
                    };
                    let (anchor, tag) = props.take();
                    let event = ParseEvent::Scalar {
                        value: token.lexeme,
                        style,
                        anchor,
                        tag,
                    };
                    match expect {
                        Expect::Value | Expect::Entry => {
                            doc.push(event, token.mark, self.options.allow_anchor_redefinition)?;
                            expect = Expect::Done;
                        }
                        Expect::Key => {
                            doc.push(event, token.mark, self.options.allow_anchor_redefinition)?;
                            expect = Expect::Separator;
                        }
                        Expect::Separator => {
                            return Err(YamlError::grammar(
                                "expected ':' after mapping key",
                                token.mark,
                            ))
                        }
                        Expect::Done => {
                            return Err(YamlError::grammar(
                                "unexpected content after the document root",
                                token.mark,
                            ))
                        }
                    }
                }
                TokenKind::FlowSequenceStart | TokenKind::FlowMappingStart => {
                    let resume = match expect {
                        Expect::Value | Expect::Entry => Expect::Done,
                        Expect::Key => Expect::Separator,
                        _ => {
                            return Err(YamlError::grammar(
                                "unexpected flow collection",
                                token.mark,
                            ))
                        }
                    };
                    let props = std::mem::take(&mut props);
                    self.compose_flow(&mut doc, token, props)?;
                    expect = resume;
                }
                other => {
                    return Err(YamlError::grammar(
                        format!("unexpected token {other:?}"),
                        token.mark,
                    ))
                }
            }
        }
        Ok(doc.events)
    }

    /// End the current document: fill in missing nodes, close every open
    /// block collection, and reject dangling properties.
    #[allow(clippy::too_many_arguments)]
    fn close_document(
        &mut self,
        doc: &mut DocumentState,
        stack: &mut Vec<(CollectionKind, Expect)>,
        expect: &mut Expect,
        props: &mut Props,
        report: Indentation,
        mark: Mark,
    ) -> Result<()> {
        let closed: Vec<IndentKind> = report.closed;
        self.flush_missing(doc, expect, props)?;
        for kind in closed {
            self.close_one(doc, stack, expect, kind, mark)?;
            self.flush_missing(doc, expect, props)?;
        }
        if !stack.is_empty() {
            return Err(YamlError::grammar("unbalanced block collections", mark));
        }
        if !props.is_empty() {
            return Err(YamlError::grammar(
                "node properties must precede a node",
                props.mark,
            ));
        }
        Ok(())
    }

    /// Apply a token's indentation verdict: complete half-open entries,
    /// emit End events for closed collections, and open a new one.
    #[allow(clippy::too_many_arguments)]
    fn apply_report(
        &mut self,
        doc: &mut DocumentState,
        stack: &mut Vec<(CollectionKind, Expect)>,
        expect: &mut Expect,
        props: &mut Props,
        report: Indentation,
        mark: Mark,
        for_separator: bool,
    ) -> Result<()> {
        if matches!(
            report.change,
            Some(IndentChange::NoChange) | Some(IndentChange::Decrease)
        ) && !(for_separator && *expect == Expect::Separator)
        {
            self.flush_missing(doc, expect, props)?;
        }
        for kind in report.closed {
            self.close_one(doc, stack, expect, kind, mark)?;
            if !(for_separator && *expect == Expect::Separator) {
                self.flush_missing(doc, expect, props)?;
            }
        }
        if let Some(kind) = report.opened {
            let kind = match kind {
                IndentKind::Sequence => CollectionKind::Sequence,
                IndentKind::Mapping => CollectionKind::Mapping,
            };
            let resume = match *expect {
                Expect::Value | Expect::Entry => Expect::Done,
                Expect::Key => Expect::Separator,
                Expect::Separator => {
                    return Err(YamlError::grammar(
                        "expected ':' after mapping key",
                        mark,
                    ))
                }
                Expect::Done => {
                    return Err(YamlError::grammar(
                        "unexpected content after the document root",
                        mark,
                    ))
                }
            };
            // Properties on an earlier line decorate the collection;
            // same-line properties stay with the upcoming node.
            let (anchor, tag) = if props.line.is_some_and(|line| line < mark.line) {
                props.take()
            } else {
                (None, None)
            };
            doc.push(
                ParseEvent::StartCollection {
                    kind,
                    flow: false,
                    anchor,
                    tag,
                },
                mark,
                self.options.allow_anchor_redefinition,
            )?;
            stack.push((kind, resume));
            *expect = Expect::Done;
        }
        Ok(())
    }

    fn close_one(
        &mut self,
        doc: &mut DocumentState,
        stack: &mut Vec<(CollectionKind, Expect)>,
        expect: &mut Expect,
        kind: IndentKind,
        mark: Mark,
    ) -> Result<()> {
        let expected = match kind {
            IndentKind::Sequence => CollectionKind::Sequence,
            IndentKind::Mapping => CollectionKind::Mapping,
        };
        match stack.pop() {
            Some((open, resume)) if open == expected => {
                doc.push(ParseEvent::end(open), mark, self.options.allow_anchor_redefinition)?;
                *expect = resume;
                Ok(())
            }
            _ => Err(YamlError::grammar("unbalanced block collections", mark)),
        }
    }

    /// Synthesize the null nodes a half-open entry implies: a missing
    /// value after `:`, a missing entry after `-`, or a missing key and
    /// value after `?`.
    fn flush_missing(
        &mut self,
        doc: &mut DocumentState,
        expect: &mut Expect,
        props: &mut Props,
    ) -> Result<()> {
        loop {
            let next = match *expect {
                Expect::Value | Expect::Entry => Expect::Done,
                Expect::Key => Expect::Separator,
                Expect::Separator => Expect::Value,
                Expect::Done => return Ok(()),
            };
            if next != Expect::Value {
                // This step produces a node.
                let (anchor, tag) = props.take();
                doc.push(
                    ParseEvent::Scalar {
                        value: String::new(),
                        style: ScalarStyle::Plain,
                        anchor,
                        tag,
                    },
                    props.mark,
                    self.options.allow_anchor_redefinition,
                )?;
            }
            *expect = next;
        }
    }

    // ====================================================================
    // Flow collections
    // ====================================================================

    fn compose_flow(&mut self, doc: &mut DocumentState, start: Token, props: Props) -> Result<()> {
        match start.kind {
            TokenKind::FlowSequenceStart => self.compose_flow_sequence(doc, start.mark, props),
            TokenKind::FlowMappingStart => self.compose_flow_mapping(doc, start.mark, props),
            _ => Err(YamlError::grammar("expected a flow collection", start.mark)),
        }
    }

    fn compose_flow_sequence(
        &mut self,
        doc: &mut DocumentState,
        mark: Mark,
        mut props: Props,
    ) -> Result<()> {
        let (anchor, tag) = props.take();
        doc.push(
            ParseEvent::StartCollection {
                kind: CollectionKind::Sequence,
                flow: true,
                anchor,
                tag,
            },
            mark,
            self.options.allow_anchor_redefinition,
        )?;
        loop {
            match self.peek()?.kind {
                TokenKind::FlowSequenceEnd => {
                    self.take()?;
                    doc.push(
                        ParseEvent::end(CollectionKind::Sequence),
                        mark,
                        self.options.allow_anchor_redefinition,
                    )?;
                    return Ok(());
                }
                TokenKind::FlowMappingEnd => {
                    let mark = self.peek()?.mark;
                    return Err(YamlError::grammar(
                        "flow sequence closed by '}'",
                        mark,
                    ));
                }
                TokenKind::StreamEnd | TokenKind::DocumentStart | TokenKind::DocumentEnd => {
                    return Err(YamlError::grammar("unterminated flow sequence", mark));
                }
                _ => {
                    self.compose_flow_sequence_entry(doc)?;
                    match self.peek()?.kind {
                        TokenKind::FlowEntry => {
                            self.take()?;
                        }
                        TokenKind::FlowSequenceEnd => {}
                        _ => {
                            let mark = self.peek()?.mark;
                            return Err(YamlError::grammar(
                                "expected ',' or ']' in flow sequence",
                                mark,
                            ));
                        }
                    }
                }
            }
        }
    }

    /// One flow sequence entry. `key: value` inside a flow sequence is a
    /// single-pair mapping.
    fn compose_flow_sequence_entry(&mut self, doc: &mut DocumentState) -> Result<()> {
        let explicit_key = self.peek()?.kind == TokenKind::ExplicitKey;
        if explicit_key {
            self.take()?;
        }
        let start_index = doc.events.len();
        if self.peek()?.kind == TokenKind::Value {
            // `? : v` or bare `: v`: the key is null.
            doc.push(ParseEvent::plain(""), Mark::default(), true)?;
        } else {
            self.compose_flow_node(doc)?;
        }
        if explicit_key || self.peek()?.kind == TokenKind::Value {
            if self.peek()?.kind == TokenKind::Value {
                self.take()?;
                doc.events
                    .insert(start_index, ParseEvent::start(CollectionKind::Mapping, true));
                match self.peek()?.kind {
                    TokenKind::FlowEntry | TokenKind::FlowSequenceEnd => {
                        doc.push(ParseEvent::plain(""), Mark::default(), true)?;
                    }
                    _ => self.compose_flow_node(doc)?,
                }
            } else {
                // Explicit key with no value.
                doc.events
                    .insert(start_index, ParseEvent::start(CollectionKind::Mapping, true));
                doc.push(ParseEvent::plain(""), Mark::default(), true)?;
            }
            doc.events.push(ParseEvent::end(CollectionKind::Mapping));
        }
        Ok(())
    }

    fn compose_flow_mapping(
        &mut self,
        doc: &mut DocumentState,
        mark: Mark,
        mut props: Props,
    ) -> Result<()> {
        let (anchor, tag) = props.take();
        doc.push(
            ParseEvent::StartCollection {
                kind: CollectionKind::Mapping,
                flow: true,
                anchor,
                tag,
            },
            mark,
            self.options.allow_anchor_redefinition,
        )?;
        loop {
            match self.peek()?.kind {
                TokenKind::FlowMappingEnd => {
                    self.take()?;
                    doc.push(
                        ParseEvent::end(CollectionKind::Mapping),
                        mark,
                        self.options.allow_anchor_redefinition,
                    )?;
                    return Ok(());
                }
                TokenKind::FlowSequenceEnd => {
                    let mark = self.peek()?.mark;
                    return Err(YamlError::grammar(
                        "flow mapping closed by ']'",
                        mark,
                    ));
                }
                TokenKind::StreamEnd | TokenKind::DocumentStart | TokenKind::DocumentEnd => {
                    return Err(YamlError::grammar("unterminated flow mapping", mark));
                }
                _ => {
                    if self.peek()?.kind == TokenKind::ExplicitKey {
                        self.take()?;
                    }
                    if self.peek()?.kind == TokenKind::Value {
                        doc.push(ParseEvent::plain(""), Mark::default(), true)?;
                    } else {
                        self.compose_flow_node(doc)?;
                    }
                    if self.peek()?.kind == TokenKind::Value {
                        self.take()?;
                        match self.peek()?.kind {
                            TokenKind::FlowEntry | TokenKind::FlowMappingEnd => {
                                doc.push(ParseEvent::plain(""), Mark::default(), true)?;
                            }
                            _ => self.compose_flow_node(doc)?,
                        }
                    } else {
                        doc.push(ParseEvent::plain(""), Mark::default(), true)?;
                    }
                    match self.peek()?.kind {
                        TokenKind::FlowEntry => {
                            self.take()?;
                        }
                        TokenKind::FlowMappingEnd => {}
                        _ => {
                            let mark = self.peek()?.mark;
                            return Err(YamlError::grammar(
                                "expected ',' or '}' in flow mapping",
                                mark,
                            ));
                        }
                    }
                }
            }
        }
    }

    /// One node in flow context: properties, then a scalar, alias or
    /// nested flow collection.
    fn compose_flow_node(&mut self, doc: &mut DocumentState) -> Result<()> {
        let mut props = Props::default();
        loop {
            let token = self.take()?;
            match token.kind {
                TokenKind::Anchor => {
                    if props.anchor.is_some() {
                        return Err(YamlError::grammar(
                            "a node may carry at most one anchor",
                            token.mark,
                        ));
                    }
                    props.anchor = Some(token.lexeme);
                    props.mark = token.mark;
                }
                TokenKind::Tag => {
                    if props.tag.is_some() {
                        return Err(YamlError::grammar(
                            "a node may carry at most one tag",
                            token.mark,
                        ));
                    }
                    props.tag = Some(self.resolve_tag(&token.lexeme, token.mark)?);
                }
                TokenKind::Alias => {
                    if !props.is_empty() {
                        return Err(YamlError::grammar(
                            "an alias node may not carry properties",
                            token.mark,
                        ));
                    }
                    return doc.splice_alias(&token.lexeme, token.mark);
                }
                TokenKind::FlowSequenceStart => {
                    return self.compose_flow_sequence(doc, token.mark, props);
                }
                TokenKind::FlowMappingStart => {
                    return self.compose_flow_mapping(doc, token.mark, props);
                }
                kind if token.is_scalar() => {
                    let style = match ScalarStyle::from_token(kind) {
                        Some(style) => style,
                        None => {
                            return Err(YamlError::grammar("expected a scalar", token.mark))
                        }
                    };
                    let (anchor, tag) = props.take();
                    return doc.push(
                        ParseEvent::Scalar {
                            value: token.lexeme,
                            style,
                            anchor,
                            tag,
                        },
                        token.mark,
                        self.options.allow_anchor_redefinition,
                    );
                }
                other => {
                    return Err(YamlError::grammar(
                        format!("expected a node in flow collection, found {other:?}"),
                        token.mark,
                    ))
                }
            }
        }
    }

    // ====================================================================
    // Tags and directives
    // ====================================================================

    /// Expand a raw tag token against the handles in force.
    fn resolve_tag(&self, lexeme: &str, mark: Mark) -> Result<String> {
        if lexeme == "!" {
            return Ok("!".to_string());
        }
        if let Some(verbatim) = lexeme.strip_prefix("!<") {
            return Ok(verbatim.trim_end_matches('>').to_string());
        }
        if let Some(suffix) = lexeme.strip_prefix("!!") {
            let prefix = match self.tag_handles.get("!!") {
                Some(prefix) => prefix,
                None => YAML_TAG_PREFIX,
            };
            return Ok(format!("{prefix}{suffix}"));
        }
        let rest = &lexeme[1..];
        if let Some(split) = rest.find('!') {
            let handle = format!("!{}!", &rest[..split]);
            let suffix = &rest[split + 1..];
            match self.tag_handles.get(&handle) {
                Some(prefix) => Ok(format!("{prefix}{suffix}")),
                None => Err(YamlError::grammar(
                    format!("undeclared tag handle {handle}"),
                    mark,
                )),
            }
        } else {
            // A local tag; carried as-is.
            Ok(lexeme.to_string())
        }
    }
}

/// Validate a `%YAML` version: 1.2 is fully supported, other 1.x accepted
/// best-effort, anything else fatal.
fn check_version(token: &Token) -> Result<()> {
    let unsupported = || YamlError::UnsupportedVersion {
        version: token.lexeme.clone(),
        mark: token.mark,
    };
    let mut parts = token.lexeme.splitn(2, '.');
    let major: u32 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(unsupported)?;
    let _minor: u32 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(unsupported)?;
    if major != 1 {
        return Err(unsupported());
    }
    Ok(())
}

// ========================================================================
// Tree building
// ========================================================================

/// Fold one document's events into a value tree.
pub fn build_tree(events: &[ParseEvent], options: &ComposeOptions) -> Result<Value> {
    let (value, next) = build_node(events, 0, options)?;
    if next != events.len() {
        return Err(YamlError::grammar(
            "trailing events after the document root",
            Mark::default(),
        ));
    }
    Ok(value)
}

fn build_node(events: &[ParseEvent], index: usize, options: &ComposeOptions) -> Result<(Value, usize)> {
    match events.get(index) {
        Some(ParseEvent::Scalar {
            value, style, tag, ..
        }) => {
            let value = construct_scalar(value, *style, tag.as_deref(), options.schema)?;
            Ok((value, index + 1))
        }
        Some(ParseEvent::StartCollection {
            kind: CollectionKind::Sequence,
            tag,
            ..
        }) => {
            check_collection_tag(tag.as_deref(), "seq")?;
            let mut items = Vec::new();
            let mut i = index + 1;
            loop {
                match events.get(i) {
                    Some(ParseEvent::EndCollection {
                        kind: CollectionKind::Sequence,
                    }) => return Ok((Value::Sequence(items), i + 1)),
                    Some(_) => {
                        let (item, next) = build_node(events, i, options)?;
                        items.push(item);
                        i = next;
                    }
                    None => {
                        return Err(YamlError::grammar(
                            "unbalanced sequence events",
                            Mark::default(),
                        ))
                    }
                }
            }
        }
        Some(ParseEvent::StartCollection {
            kind: CollectionKind::Mapping,
            tag,
            ..
        }) => {
            check_collection_tag(tag.as_deref(), "map")?;
            let mut entries: Vec<(String, Value)> = Vec::new();
            let mut i = index + 1;
            loop {
                match events.get(i) {
                    Some(ParseEvent::EndCollection {
                        kind: CollectionKind::Mapping,
                    }) => return Ok((Value::Mapping(entries), i + 1)),
                    Some(ParseEvent::Scalar { value: key, .. }) => {
                        let key = key.clone();
                        let (value, next) = build_node(events, i + 1, options)?;
                        i = next;
                        if let Some(existing) =
                            entries.iter_mut().find(|(name, _)| *name == key)
                        {
                            if !options.allow_map_entry_redefinition {
                                return Err(YamlError::DuplicateKey { key });
                            }
                            existing.1 = value;
                        } else {
                            entries.push((key, value));
                        }
                    }
                    Some(_) => {
                        return Err(YamlError::grammar(
                            "mapping keys must be scalars",
                            Mark::default(),
                        ))
                    }
                    None => {
                        return Err(YamlError::grammar(
                            "unbalanced mapping events",
                            Mark::default(),
                        ))
                    }
                }
            }
        }
        Some(ParseEvent::Alias { name }) => Err(YamlError::UndefinedAnchor {
            name: name.clone(),
            mark: Mark::default(),
        }),
        _ => Err(YamlError::grammar(
            "malformed event stream",
            Mark::default(),
        )),
    }
}

fn construct_scalar(
    text: &str,
    style: ScalarStyle,
    tag: Option<&str>,
    schema: Schema,
) -> Result<Value> {
    match tag {
        // `!` pins a scalar to its string form.
        Some("!") => Ok(Value::Str(text.to_string())),
        // Local and application tags keep the raw text.
        Some(tag) if tag.starts_with('!') => Ok(Value::Str(text.to_string())),
        Some(tag) => schema.construct_tagged(tag, text),
        None => {
            if style == ScalarStyle::Plain {
                Ok(schema.resolve(text))
            } else {
                Ok(Value::Str(text.to_string()))
            }
        }
    }
}

fn check_collection_tag(tag: Option<&str>, expected: &str) -> Result<()> {
    if let Some(tag) = tag {
        if let Some(suffix) = tag.strip_prefix(YAML_TAG_PREFIX) {
            if suffix != expected {
                return Err(YamlError::grammar(
                    format!("cannot construct !!{suffix} from a collection"),
                    Mark::default(),
                ));
            }
        }
    }
    Ok(())
}
