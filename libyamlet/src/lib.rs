//! A YAML 1.2 engine built from scratch, from codepoints to values and
//! back.
//!
//! Reading runs in four phases:
//!
//! 1. [`reader`] decodes the input into a peekable codepoint stream with
//!    line and column tracking, rejecting non-printable characters.
//! 2. [`tokenizer`] scans tokens and, crucially, owns the indentation
//!    stack: every token that can open or close a block collection
//!    carries an indentation verdict.
//! 3. [`composer`] drives the document grammar over the tokens,
//!    producing one balanced [`ParseEvent`] sequence per document with
//!    aliases already spliced in.
//! 4. [`build_tree`](composer::build_tree) folds events into a
//!    [`Value`], resolving plain scalars through the active [`Schema`].
//!
//! Writing runs the pipeline in reverse: [`serialize`](serialize::serialize)
//! walks a [`Value`] back into events and [`emit`](emit::emit) renders
//! them as lines of text. [`Shape`] projection sits on top of reading
//! and checks a composed tree against a caller-declared structure.

pub mod composer;
pub mod emit;
pub mod error;
pub mod event;
pub mod reader;
pub mod schema;
pub mod serialize;
pub mod shape;
pub mod token;
pub mod tokenizer;
pub mod value;

pub use composer::{build_tree, ComposeOptions, Composer};
pub use error::{Mark, Result, YamlError};
pub use event::{CollectionKind, ParseEvent, ScalarStyle};
pub use reader::{CharSource, CodepointStream, StrSource, Utf8Source};
pub use schema::Schema;
pub use serialize::EmitOptions;
pub use shape::{project, Shape};
pub use value::Value;

/// Read a single document with default options and no expected shape.
pub fn parse(input: &str) -> Result<Value> {
    compose(input, &ComposeOptions::default(), &Shape::Any)
}

/// Read a single document, resolving with `options` and checking the
/// result against `shape`.
///
/// An empty stream reads as null. A stream with more than one document
/// is an error; use [`compose_all`] for multi-document input.
pub fn compose(input: &str, options: &ComposeOptions, shape: &Shape) -> Result<Value> {
    let mut documents = compose_all(input, options, shape)?;
    match documents.len() {
        0 => Ok(Value::Null),
        1 => Ok(documents.remove(0)),
        n => Err(YamlError::grammar(
            format!("expected a single document, found {n}"),
            Mark::default(),
        )),
    }
}

/// Read every document in the stream.
pub fn compose_all(input: &str, options: &ComposeOptions, shape: &Shape) -> Result<Vec<Value>> {
    let mut composer = Composer::from_text(input, options);
    let mut documents = Vec::new();
    while let Some(events) = composer.next_document()? {
        let value = build_tree(&events, options)?;
        documents.push(shape::project(&value, shape, options)?);
    }
    Ok(documents)
}

/// Like [`compose`], attaching `filename` to any error.
pub fn compose_with_filename(
    input: &str,
    filename: &str,
    options: &ComposeOptions,
    shape: &Shape,
) -> Result<Value> {
    compose(input, options, shape).map_err(|error| error.in_file(filename))
}

/// Render a value as lines of text, without trailing newlines.
pub fn to_yaml_lines(value: &Value, options: &EmitOptions) -> Vec<String> {
    emit::emit(serialize::serialize(value, options), options)
}

/// Render a value as a string with a trailing newline.
pub fn to_yaml_string(value: &Value, options: &EmitOptions) -> String {
    let mut out = to_yaml_lines(value, options).join("\n");
    out.push('\n');
    out
}
