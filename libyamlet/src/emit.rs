//! Emitter: writes a balanced event sequence back out as lines of text.
//!
//! The emitter consumes its event queue front to back. The queue is an
//! internal handoff from the composer or the serializer, so an
//! unbalanced or truncated queue is a programming error and panics
//! rather than surfacing as a user-facing error.
//!
//! Block collections indent by [`EmitOptions::indentation_policy`]
//! spaces per level starting at [`EmitOptions::block_level`]. Sequence
//! entries render compactly, merging the `- ` marker with the first
//! line of a block child. Flow collections render on a single line.
//! Multi-document streams separate documents with a bare `---` line,
//! leaving the first document unmarked.

use std::collections::VecDeque;

use crate::event::{CollectionKind, ParseEvent, ScalarStyle};
use crate::schema::YAML_TAG_PREFIX;
use crate::serialize::EmitOptions;
use crate::value::Value;

/// Write an event sequence as lines of text, without trailing newlines.
pub fn emit(events: Vec<ParseEvent>, options: &EmitOptions) -> Vec<String> {
    if events.is_empty() {
        return Vec::new();
    }
    let mut emitter = Emitter {
        options,
        events: events.into(),
        lines: Vec::new(),
    };
    emitter.run();
    emitter.lines
}

struct Emitter<'a> {
    options: &'a EmitOptions,
    events: VecDeque<ParseEvent>,
    lines: Vec<String>,
}

impl Emitter<'_> {
    fn run(&mut self) {
        loop {
            self.emit_document();
            match self.events.pop_front() {
                None => break,
                Some(ParseEvent::DocumentBoundary) => self.lines.push("---".to_string()),
                Some(event) => panic!("emitter: unbalanced event queue at {event:?}"),
            }
        }
    }

    fn next(&mut self) -> ParseEvent {
        match self.events.pop_front() {
            Some(event) => event,
            None => panic!("emitter: event queue ended inside a document"),
        }
    }

    fn peek(&self) -> Option<&ParseEvent> {
        self.events.front()
    }

    /// Is the collection whose start event is at the front empty?
    fn next_collection_is_empty(&self) -> bool {
        matches!(self.events.get(1), Some(ParseEvent::EndCollection { .. }))
    }

    fn push_line(&mut self, col: usize, text: String) {
        self.lines.push(format!("{}{}", " ".repeat(col), text));
    }

    fn emit_document(&mut self) {
        let col = self.options.block_level * self.options.indentation_policy;
        match self.peek() {
            Some(ParseEvent::StartCollection {
                flow: false, kind, ..
            }) if !self.next_collection_is_empty() => {
                let kind = *kind;
                self.next();
                match kind {
                    CollectionKind::Sequence => self.emit_block_sequence(col),
                    CollectionKind::Mapping => self.emit_block_mapping(col),
                }
            }
            _ => {
                let text = self.render_flow_node();
                self.push_line(col, text);
            }
        }
    }

    /// Emit the entries of a block sequence whose start event has
    /// already been consumed.
    fn emit_block_sequence(&mut self, col: usize) {
        loop {
            match self.peek() {
                Some(ParseEvent::EndCollection { .. }) => {
                    self.next();
                    return;
                }
                Some(ParseEvent::StartCollection {
                    flow: false, kind, ..
                }) if !self.next_collection_is_empty() => {
                    let kind = *kind;
                    self.next();
                    // Compact entry: the child starts two columns in,
                    // then its first line absorbs the dash.
                    let mark = self.lines.len();
                    match kind {
                        CollectionKind::Sequence => self.emit_block_sequence(col + 2),
                        CollectionKind::Mapping => self.emit_block_mapping(col + 2),
                    }
                    let merged =
                        format!("{}- {}", " ".repeat(col), &self.lines[mark][col + 2..]);
                    self.lines[mark] = merged;
                }
                _ => {
                    let text = self.render_flow_node();
                    self.push_line(col, format!("- {text}"));
                }
            }
        }
    }

    /// Emit the entries of a block mapping whose start event has
    /// already been consumed.
    fn emit_block_mapping(&mut self, col: usize) {
        loop {
            if matches!(self.peek(), Some(ParseEvent::EndCollection { .. })) {
                self.next();
                return;
            }
            let key = match self.next() {
                ParseEvent::Scalar {
                    value, style, tag, ..
                } => self.render_scalar(&value, style, tag.as_deref()),
                event => panic!("emitter: mapping key must be a scalar, got {event:?}"),
            };
            match self.peek() {
                Some(ParseEvent::StartCollection {
                    flow: false, kind, ..
                }) if !self.next_collection_is_empty() => {
                    let kind = *kind;
                    self.next();
                    self.push_line(col, format!("{key}:"));
                    let child = col + self.options.indentation_policy;
                    match kind {
                        CollectionKind::Sequence => self.emit_block_sequence(child),
                        CollectionKind::Mapping => self.emit_block_mapping(child),
                    }
                }
                _ => {
                    let text = self.render_flow_node();
                    self.push_line(col, format!("{key}: {text}"));
                }
            }
        }
    }

    /// Render a node on a single line. Empty block collections land
    /// here too and render as `[]` or `{}`.
    fn render_flow_node(&mut self) -> String {
        match self.next() {
            ParseEvent::Scalar {
                value, style, tag, ..
            } => self.render_scalar(&value, style, tag.as_deref()),
            ParseEvent::StartCollection {
                kind: CollectionKind::Sequence,
                ..
            } => {
                let mut items = Vec::new();
                while !matches!(self.peek(), Some(ParseEvent::EndCollection { .. })) {
                    items.push(self.render_flow_node());
                }
                self.next();
                format!("[{}]", items.join(", "))
            }
            ParseEvent::StartCollection {
                kind: CollectionKind::Mapping,
                ..
            } => {
                let mut items = Vec::new();
                while !matches!(self.peek(), Some(ParseEvent::EndCollection { .. })) {
                    let key = self.render_flow_node();
                    let value = self.render_flow_node();
                    items.push(format!("{key}: {value}"));
                }
                self.next();
                format!("{{{}}}", items.join(", "))
            }
            event => panic!("emitter: unexpected event {event:?}"),
        }
    }

    fn render_scalar(&self, text: &str, style: ScalarStyle, tag: Option<&str>) -> String {
        let suffix = match tag {
            Some(tag) => tag.strip_prefix(YAML_TAG_PREFIX).unwrap_or("str"),
            // Non-plain styles always denote strings.
            None if style != ScalarStyle::Plain => "str",
            None => match self.options.schema.resolve(text) {
                Value::Null => "null",
                Value::Bool(_) => "bool",
                Value::Int(_) => "int",
                Value::Float(_) => "float",
                _ => "str",
            },
        };
        let body = if suffix == "str" {
            self.render_string(text)
        } else {
            text.to_string()
        };
        if self.options.canonical {
            format!("!!{suffix} {body}")
        } else {
            body
        }
    }

    /// Render a string scalar, quoting whenever a plain rendering
    /// would read back as something other than this string.
    fn render_string(&self, text: &str) -> String {
        if self.options.canonical {
            return double_quote(text);
        }
        if !self.options.force_quotes
            && plain_safe(text)
            && self.options.schema.plain_is_string(text)
        {
            return text.to_string();
        }
        if self.options.use_single_quotes && single_quotable(text) {
            format!("'{}'", text.replace('\'', "''"))
        } else {
            double_quote(text)
        }
    }
}

/// Can this text be emitted as a plain scalar in any context?
///
/// Deliberately conservative: anything that could collide with an
/// indicator, a document marker, or flow punctuation gets quoted.
fn plain_safe(text: &str) -> bool {
    let first = match text.chars().next() {
        Some(c) => c,
        None => return false,
    };
    if "-?:,[]{}#&*!|>'\"%@` \t".contains(first) {
        return false;
    }
    if text.ends_with(' ') || text.ends_with('\t') || text == "..." {
        return false;
    }
    for c in text.chars() {
        if (c as u32) < 0x20 || c == '\u{7f}' || ",[]{}#".contains(c) {
            return false;
        }
    }
    // A colon before a space or at the end would read as a key.
    for (i, _) in text.match_indices(':') {
        match text[i + 1..].chars().next() {
            None | Some(' ') | Some('\t') => return false,
            _ => {}
        }
    }
    true
}

fn single_quotable(text: &str) -> bool {
    text.chars().all(|c| c >= ' ' && c != '\u{7f}')
}

fn double_quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            c if (c as u32) < 0x20 || c == '\u{7f}' => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialize::serialize;
    use crate::value::Value;

    fn lines(value: &Value, options: &EmitOptions) -> Vec<String> {
        emit(serialize(value, options), options)
    }

    fn mapping(entries: Vec<(&str, Value)>) -> Value {
        Value::Mapping(
            entries
                .into_iter()
                .map(|(key, value)| (key.to_string(), value))
                .collect(),
        )
    }

    #[test]
    fn test_scalar_document() {
        let options = EmitOptions::default();
        assert_eq!(lines(&Value::from("hello"), &options), vec!["hello"]);
        assert_eq!(lines(&Value::from(42i64), &options), vec!["42"]);
        assert_eq!(lines(&Value::Null, &options), vec!["null"]);
        assert_eq!(lines(&Value::Float(1.0), &options), vec!["1.0"]);
    }

    #[test]
    fn test_block_mapping_with_nested_sequence() {
        let options = EmitOptions::default();
        let value = mapping(vec![(
            "a",
            Value::Sequence(vec![Value::from(1i64), Value::from(2i64)]),
        )]);
        assert_eq!(lines(&value, &options), vec!["a:", "  - 1", "  - 2"]);
    }

    #[test]
    fn test_flow_style() {
        let options = EmitOptions {
            flow_style: true,
            ..EmitOptions::default()
        };
        let value = mapping(vec![(
            "a",
            Value::Sequence(vec![Value::from(1i64), Value::from(2i64)]),
        )]);
        assert_eq!(lines(&value, &options), vec!["a: [1, 2]"]);
    }

    #[test]
    fn test_compact_sequence_of_mappings() {
        let options = EmitOptions::default();
        let value = Value::Sequence(vec![mapping(vec![
            ("a", Value::from(1i64)),
            ("b", Value::from(2i64)),
        ])]);
        assert_eq!(lines(&value, &options), vec!["- a: 1", "  b: 2"]);
    }

    #[test]
    fn test_empty_collections_inline() {
        let options = EmitOptions::default();
        let value = mapping(vec![
            ("a", Value::Sequence(vec![])),
            ("b", Value::Mapping(vec![])),
        ]);
        assert_eq!(lines(&value, &options), vec!["a: []", "b: {}"]);
    }

    #[test]
    fn test_strings_that_would_misread_are_quoted() {
        let options = EmitOptions::default();
        assert_eq!(lines(&Value::from("123"), &options), vec!["\"123\""]);
        assert_eq!(lines(&Value::from("true"), &options), vec!["\"true\""]);
        assert_eq!(lines(&Value::from("a: b"), &options), vec!["\"a: b\""]);
        assert_eq!(lines(&Value::from("plain"), &options), vec!["plain"]);
    }

    #[test]
    fn test_single_quote_preference() {
        let options = EmitOptions {
            use_single_quotes: true,
            ..EmitOptions::default()
        };
        assert_eq!(lines(&Value::from("123"), &options), vec!["'123'"]);
        assert_eq!(lines(&Value::from("it's: x"), &options), vec!["'it''s: x'"]);
    }

    #[test]
    fn test_force_quotes() {
        let options = EmitOptions {
            force_quotes: true,
            ..EmitOptions::default()
        };
        assert_eq!(lines(&Value::from("plain"), &options), vec!["\"plain\""]);
    }

    #[test]
    fn test_string_with_newline_is_escaped() {
        let options = EmitOptions::default();
        assert_eq!(lines(&Value::from("x\ny"), &options), vec!["\"x\\ny\""]);
    }

    #[test]
    fn test_canonical_tags_everything() {
        let options = EmitOptions {
            canonical: true,
            ..EmitOptions::default()
        };
        let value = mapping(vec![("a", Value::from(1i64))]);
        assert_eq!(lines(&value, &options), vec!["!!str \"a\": !!int 1"]);
    }

    #[test]
    fn test_stream_emits_separate_documents() {
        let options = EmitOptions {
            is_stream: true,
            ..EmitOptions::default()
        };
        let value = Value::Sequence(vec![Value::from(1i64), Value::from(2i64)]);
        assert_eq!(lines(&value, &options), vec!["1", "---", "2"]);
    }

    #[test]
    fn test_block_level_offset() {
        let options = EmitOptions {
            block_level: 1,
            ..EmitOptions::default()
        };
        let value = mapping(vec![("a", Value::from(1i64))]);
        assert_eq!(lines(&value, &options), vec!["  a: 1"]);
    }
}
