//! End-to-end tests for the reading and writing pipelines through the
//! public entry points.

use libyamlet::{
    compose, compose_all, parse, to_yaml_lines, to_yaml_string, ComposeOptions, EmitOptions,
    Schema, Shape, Value, YamlError,
};
use num_bigint::BigInt;

fn default_options() -> ComposeOptions {
    ComposeOptions::default()
}

#[test]
fn test_basic_mapping() {
    let value = parse("a: 1\nb: two\n").unwrap();
    assert_eq!(value.get("a"), Some(&Value::from(1i64)));
    assert_eq!(value.get("b"), Some(&Value::from("two")));
}

#[test]
fn test_nested_block_collections() {
    let value = parse(concat!(
        "server:\n",
        "  host: localhost\n",
        "  ports:\n",
        "    - 80\n",
        "    - 443\n",
    ))
    .unwrap();
    let server = value.get("server").unwrap();
    assert_eq!(server.get("host"), Some(&Value::from("localhost")));
    assert_eq!(
        server.get("ports"),
        Some(&Value::from(vec![80i64, 443i64]))
    );
}

#[test]
fn test_sequence_of_mappings() {
    let value = parse("- a: 1\n- b: 2\n").unwrap();
    let items = value.as_sequence().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].get("a"), Some(&Value::from(1i64)));
    assert_eq!(items[1].get("b"), Some(&Value::from(2i64)));
}

#[test]
fn test_flow_collections() {
    let value = parse("{a: [1, 2.5, true, null, x]}").unwrap();
    let items = value.get("a").unwrap().as_sequence().unwrap();
    assert_eq!(items[0], Value::from(1i64));
    assert_eq!(items[1], Value::Float(2.5));
    assert_eq!(items[2], Value::Bool(true));
    assert_eq!(items[3], Value::Null);
    assert_eq!(items[4], Value::from("x"));
}

#[test]
fn test_core_resolution() {
    let value = parse(concat!(
        "hex: 0x1f\n",
        "octal: 0o17\n",
        "negative: -12\n",
        "tilde: ~\n",
        "off_is_string: yes\n",
    ))
    .unwrap();
    assert_eq!(value.get("hex"), Some(&Value::from(31i64)));
    assert_eq!(value.get("octal"), Some(&Value::from(15i64)));
    assert_eq!(value.get("negative"), Some(&Value::from(-12i64)));
    assert_eq!(value.get("tilde"), Some(&Value::Null));
    assert_eq!(value.get("off_is_string"), Some(&Value::from("yes")));
}

#[test]
fn test_not_a_number_stays_nan() {
    let value = parse("x: .nan\n").unwrap();
    assert!(value.get("x").unwrap().as_float().unwrap().is_nan());
}

#[test]
fn test_quoted_scalars_are_strings() {
    let value = parse("a: '123'\nb: \"true\"\n").unwrap();
    assert_eq!(value.get("a"), Some(&Value::from("123")));
    assert_eq!(value.get("b"), Some(&Value::from("true")));
}

#[test]
fn test_json_schema_is_strict() {
    let options = ComposeOptions {
        schema: Schema::Json,
        ..default_options()
    };
    let value = compose("[null, ~, True, 0x1f]", &options, &Shape::Any).unwrap();
    let items = value.as_sequence().unwrap();
    assert_eq!(items[0], Value::Null);
    assert_eq!(items[1], Value::from("~"));
    assert_eq!(items[2], Value::from("True"));
    assert_eq!(items[3], Value::from("0x1f"));
}

#[test]
fn test_big_integer() {
    let text = "9999999999999999999999999";
    let value = parse(text).unwrap();
    assert_eq!(value.as_int().unwrap().to_string(), text);
}

#[test]
fn test_empty_input_reads_as_null() {
    assert_eq!(parse("").unwrap(), Value::Null);
    assert_eq!(parse("# only a comment\n").unwrap(), Value::Null);
}

#[test]
fn test_null_values_synthesized() {
    let value = parse("a:\nb: 1\n").unwrap();
    assert_eq!(value.get("a"), Some(&Value::Null));
    assert_eq!(value.get("b"), Some(&Value::from(1i64)));
}

#[test]
fn test_explicit_keys() {
    let value = parse("? a\n: 1\n").unwrap();
    assert_eq!(value.get("a"), Some(&Value::from(1i64)));

    let value = parse("? a\n? b\n").unwrap();
    assert_eq!(value.get("a"), Some(&Value::Null));
    assert_eq!(value.get("b"), Some(&Value::Null));
}

#[test]
fn test_multi_document_stream() {
    let options = default_options();
    let documents = compose_all("a: 1\n---\nb: 2\n", &options, &Shape::Any).unwrap();
    assert_eq!(documents.len(), 2);
    assert_eq!(documents[0].get("a"), Some(&Value::from(1i64)));
    assert_eq!(documents[1].get("b"), Some(&Value::from(2i64)));

    match compose("a: 1\n---\nb: 2\n", &options, &Shape::Any) {
        Err(YamlError::Grammar { .. }) => {}
        other => panic!("expected a grammar error, got {other:?}"),
    }
}

#[test]
fn test_anchor_and_alias_scalar() {
    let value = parse("a: &x 1\nb: *x\n").unwrap();
    assert_eq!(value.get("b"), Some(&Value::from(1i64)));
}

#[test]
fn test_anchor_and_alias_collection() {
    let value = parse("a: &x\n  m: 1\nb: *x\n").unwrap();
    assert_eq!(value.get("a"), value.get("b"));
    assert_eq!(
        value.get("b").unwrap().get("m"),
        Some(&Value::from(1i64))
    );
}

#[test]
fn test_anchor_redefinition_policy() {
    let text = "a: &x 1\nb: &x 2\nc: *x\n";
    match parse(text) {
        Err(YamlError::AnchorRedefined { .. }) => {}
        other => panic!("expected an anchor error, got {other:?}"),
    }
    let options = ComposeOptions {
        allow_anchor_redefinition: true,
        ..default_options()
    };
    let value = compose(text, &options, &Shape::Any).unwrap();
    assert_eq!(value.get("c"), Some(&Value::from(2i64)));
}

#[test]
fn test_undefined_alias() {
    match parse("a: *nope\n") {
        Err(YamlError::UndefinedAnchor { .. }) => {}
        other => panic!("expected an undefined anchor error, got {other:?}"),
    }
}

#[test]
fn test_duplicate_key_policy() {
    let text = "a: 1\na: 2\n";
    match parse(text) {
        Err(YamlError::DuplicateKey { .. }) => {}
        other => panic!("expected a duplicate key error, got {other:?}"),
    }
    let options = ComposeOptions {
        allow_map_entry_redefinition: true,
        ..default_options()
    };
    let value = compose(text, &options, &Shape::Any).unwrap();
    assert_eq!(value.as_mapping().unwrap().len(), 1);
    assert_eq!(value.get("a"), Some(&Value::from(2i64)));
}

#[test]
fn test_block_scalars() {
    let value = parse(concat!(
        "literal: |\n",
        "  x\n",
        "  y\n",
        "folded: >\n",
        "  x\n",
        "  y\n",
        "stripped: |-\n",
        "  x\n",
    ))
    .unwrap();
    assert_eq!(value.get("literal"), Some(&Value::from("x\ny\n")));
    assert_eq!(value.get("folded"), Some(&Value::from("x y\n")));
    assert_eq!(value.get("stripped"), Some(&Value::from("x")));
}

#[test]
fn test_explicit_tags() {
    let value = parse("a: !!str 123\nb: !!float 1\n").unwrap();
    assert_eq!(value.get("a"), Some(&Value::from("123")));
    assert_eq!(value.get("b"), Some(&Value::Float(1.0)));
}

#[test]
fn test_comments_are_ignored() {
    let value = parse("a: 1 # trailing\n# full line\nb: 2\n").unwrap();
    assert_eq!(value.get("a"), Some(&Value::from(1i64)));
    assert_eq!(value.get("b"), Some(&Value::from(2i64)));
}

#[test]
fn test_version_directive() {
    assert!(parse("%YAML 1.2\n---\na: 1\n").is_ok());
    match parse("%YAML 2.0\n---\na: 1\n") {
        Err(YamlError::UnsupportedVersion { .. }) => {}
        other => panic!("expected a version error, got {other:?}"),
    }
}

#[test]
fn test_duplicate_version_directive() {
    match parse("%YAML 1.2\n%YAML 1.2\n---\na: 1\n") {
        Err(YamlError::DuplicateVersionDirective { .. }) => {}
        other => panic!("expected a duplicate directive error, got {other:?}"),
    }
}

#[test]
fn test_duplicate_tag_handle() {
    let input = "%TAG !e! tag:yaml.org,2002:\n%TAG !e! tag:yaml.org,2002:\n---\na: 1\n";
    match parse(input) {
        Err(YamlError::DuplicateTagHandle { ref handle, .. }) if handle == "!e!" => {}
        other => panic!("expected a duplicate handle error, got {other:?}"),
    }
}

#[test]
fn test_block_entry_does_not_continue_plain_scalar() {
    // A dedented-looking `- ` line starts a sequence entry, which cannot
    // follow a completed root scalar.
    assert!(parse("x\n- y\n").is_err());
    let value = parse("- x\n- y\n").unwrap();
    assert_eq!(
        value,
        Value::Sequence(vec![Value::from("x"), Value::from("y")])
    );
}

#[test]
fn test_tab_indentation_rejected() {
    match parse("a:\n\tb: 1\n") {
        Err(YamlError::TabIndent { .. }) => {}
        other => panic!("expected a tab error, got {other:?}"),
    }
}

#[test]
fn test_value_in_value_is_rejected() {
    let err = parse("a: b: 1\n").unwrap_err();
    assert!(err.to_string().contains("not allowed"));
}

#[test]
fn test_round_trip_through_text() {
    let sources = [
        concat!(
            "name: example\n",
            "items:\n",
            "  - 1\n",
            "  - two\n",
            "  - null\n",
            "nested:\n",
            "  flag: true\n",
            "ratio: 2.5\n",
        ),
        "plain scalar\n",
        "{a: 1, b: [x, y]}\n",
    ];
    let emit_options = EmitOptions::default();
    for source in sources {
        let first = parse(source).unwrap();
        let text = to_yaml_string(&first, &emit_options);
        let second = parse(&text).unwrap();
        assert_eq!(first, second, "round trip changed {source:?}");
    }
}

#[test]
fn test_round_trip_from_values() {
    let values = [
        Value::Null,
        Value::from(true),
        Value::from("123"),
        Value::from("a: looks like a key"),
        Value::Int(BigInt::parse_bytes(b"99999999999999999999", 10).unwrap()),
        Value::Mapping(vec![
            ("empty".to_string(), Value::Sequence(vec![])),
            ("deep".to_string(), Value::from(vec![1i64, 2, 3])),
        ]),
    ];
    let emit_options = EmitOptions::default();
    for value in values {
        let text = to_yaml_string(&value, &emit_options);
        let back = parse(&text).unwrap();
        assert_eq!(value, back, "round trip changed {value}");
    }
}

#[test]
fn test_canonical_output_reads_back() {
    let options = EmitOptions {
        canonical: true,
        ..EmitOptions::default()
    };
    let value = parse("a: 123\nb: text\n").unwrap();
    let text = to_yaml_string(&value, &options);
    assert!(text.contains("!!int 123"));
    assert!(text.contains("!!str"));
    assert_eq!(parse(&text).unwrap(), value);
}

#[test]
fn test_emit_flow_versus_block() {
    let value = parse("a: [1, 2]").unwrap();
    let block = EmitOptions::default();
    assert_eq!(to_yaml_lines(&value, &block), vec!["a:", "  - 1", "  - 2"]);
    let flow = EmitOptions {
        flow_style: true,
        ..EmitOptions::default()
    };
    assert_eq!(to_yaml_lines(&value, &flow), vec!["a: [1, 2]"]);
}

#[test]
fn test_shape_projection_end_to_end() {
    let shape = Shape::mapping(vec![("name", Shape::Str), ("port", Shape::Int)]);
    let options = default_options();
    let value = compose("name: web\nport: 80\n", &options, &shape).unwrap();
    assert_eq!(value.get("port"), Some(&Value::from(80i64)));

    match compose("name: web\nport: yes\n", &options, &shape) {
        Err(YamlError::Projection { path, .. }) => assert_eq!(path, "$.port"),
        other => panic!("expected a projection error, got {other:?}"),
    }
}

#[test]
fn test_quoted_keys() {
    let value = parse("\"a b\": 1\n'c: d': 2\n").unwrap();
    assert_eq!(value.get("a b"), Some(&Value::from(1i64)));
    assert_eq!(value.get("c: d"), Some(&Value::from(2i64)));
}
