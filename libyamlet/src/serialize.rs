//! Serializer: a depth-first walk of a value tree producing the same
//! event language the composer emits, ready for the emitter.

use crate::event::{CollectionKind, ParseEvent, ScalarStyle};
use crate::schema::{Schema, YAML_TAG_PREFIX};
use crate::value::Value;

/// Options governing serialization and emission.
#[derive(Debug, Clone)]
pub struct EmitOptions {
    /// Spaces per block nesting level.
    pub indentation_policy: usize,
    /// Indent level the document root starts at.
    pub block_level: usize,
    /// Annotate every scalar with its canonical `!!type` tag and quote
    /// every string.
    pub canonical: bool,
    /// Prefer single quotes when a string must be quoted.
    pub use_single_quotes: bool,
    /// Quote every string scalar, safe or not.
    pub force_quotes: bool,
    /// Schema used to decide which plain spellings would not read back
    /// as strings.
    pub schema: Schema,
    /// Emit the elements of a root sequence as separate documents.
    pub is_stream: bool,
    /// Render nested collections in flow style. The document root is
    /// always rendered in block style.
    pub flow_style: bool,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            indentation_policy: 2,
            block_level: 0,
            canonical: false,
            use_single_quotes: false,
            force_quotes: false,
            schema: Schema::Core,
            is_stream: false,
            flow_style: false,
        }
    }
}

/// Render a float so it reads back as a float.
pub(crate) fn format_float(x: f64) -> String {
    if x.is_nan() {
        ".nan".to_string()
    } else if x == f64::INFINITY {
        ".inf".to_string()
    } else if x == f64::NEG_INFINITY {
        "-.inf".to_string()
    } else {
        // Debug formatting keeps a `.0` on integral floats.
        format!("{x:?}")
    }
}

fn tagged(suffix: &str) -> Option<String> {
    Some(format!("{YAML_TAG_PREFIX}{suffix}"))
}

/// Serialize a value tree into a flat event sequence.
///
/// In stream mode a root sequence becomes one document per element,
/// separated by [`ParseEvent::DocumentBoundary`].
pub fn serialize(value: &Value, options: &EmitOptions) -> Vec<ParseEvent> {
    let mut events = Vec::new();
    if options.is_stream {
        if let Value::Sequence(items) = value {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    events.push(ParseEvent::DocumentBoundary);
                }
                serialize_node(item, options, true, &mut events);
            }
            return events;
        }
    }
    serialize_node(value, options, true, &mut events);
    events
}

fn serialize_node(value: &Value, options: &EmitOptions, root: bool, out: &mut Vec<ParseEvent>) {
    let flow = options.flow_style && !root;
    match value {
        Value::Null => out.push(ParseEvent::Scalar {
            value: "null".to_string(),
            style: ScalarStyle::Plain,
            anchor: None,
            tag: tagged("null"),
        }),
        Value::Bool(b) => out.push(ParseEvent::Scalar {
            value: b.to_string(),
            style: ScalarStyle::Plain,
            anchor: None,
            tag: tagged("bool"),
        }),
        Value::Int(n) => out.push(ParseEvent::Scalar {
            value: n.to_string(),
            style: ScalarStyle::Plain,
            anchor: None,
            tag: tagged("int"),
        }),
        Value::Float(x) => out.push(ParseEvent::Scalar {
            value: format_float(*x),
            style: ScalarStyle::Plain,
            anchor: None,
            tag: tagged("float"),
        }),
        Value::Str(s) => out.push(ParseEvent::Scalar {
            value: s.clone(),
            style: ScalarStyle::Plain,
            anchor: None,
            tag: tagged("str"),
        }),
        Value::Sequence(items) => {
            out.push(ParseEvent::StartCollection {
                kind: CollectionKind::Sequence,
                flow,
                anchor: None,
                tag: tagged("seq"),
            });
            for item in items {
                serialize_node(item, options, false, out);
            }
            out.push(ParseEvent::end(CollectionKind::Sequence));
        }
        Value::Mapping(entries) => {
            out.push(ParseEvent::StartCollection {
                kind: CollectionKind::Mapping,
                flow,
                anchor: None,
                tag: tagged("map"),
            });
            for (key, entry) in entries {
                out.push(ParseEvent::Scalar {
                    value: key.clone(),
                    style: ScalarStyle::Plain,
                    anchor: None,
                    tag: tagged("str"),
                });
                serialize_node(entry, options, false, out);
            }
            out.push(ParseEvent::end(CollectionKind::Mapping));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_spellings() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(2.5), "2.5");
        assert_eq!(format_float(f64::INFINITY), ".inf");
        assert_eq!(format_float(f64::NEG_INFINITY), "-.inf");
        assert_eq!(format_float(f64::NAN), ".nan");
    }

    #[test]
    fn test_stream_splits_root_sequence() {
        let options = EmitOptions {
            is_stream: true,
            ..EmitOptions::default()
        };
        let value = Value::Sequence(vec![Value::from(1i64), Value::from(2i64)]);
        let events = serialize(&value, &options);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, ParseEvent::DocumentBoundary))
                .count(),
            1
        );
        assert!(!events
            .iter()
            .any(|e| matches!(e, ParseEvent::StartCollection { .. })));
    }

    #[test]
    fn test_root_is_block_even_in_flow_style() {
        let options = EmitOptions {
            flow_style: true,
            ..EmitOptions::default()
        };
        let value = Value::Sequence(vec![Value::Sequence(vec![])]);
        let events = serialize(&value, &options);
        match &events[0] {
            ParseEvent::StartCollection { flow, .. } => assert!(!flow),
            other => panic!("expected a start event, got {other:?}"),
        }
        match &events[1] {
            ParseEvent::StartCollection { flow, .. } => assert!(flow),
            other => panic!("expected a start event, got {other:?}"),
        }
    }
}
