//! Expected-shape projection: type-directed validation of a composed
//! value tree.
//!
//! A [`Shape`] describes what the caller expects; [`project`] walks the
//! value and the shape together and either returns the (possibly
//! numerically converted) value or fails with the dotted path of the
//! offending node.

use num_bigint::BigInt;
use num_traits::{FromPrimitive, ToPrimitive};

use crate::composer::ComposeOptions;
use crate::error::{Result, YamlError};
use crate::value::Value;

/// The expected shape of a value.
#[derive(Debug, Clone, Default)]
pub enum Shape {
    /// Anything goes.
    #[default]
    Any,
    Null,
    Bool,
    Int,
    Float,
    Str,
    /// The shape, or null.
    Optional(Box<Shape>),
    /// A sequence of uniformly shaped elements.
    Sequence(Box<Shape>),
    /// A sequence of exactly these shapes.
    Tuple(Vec<Shape>),
    /// A mapping with named fields. `open` permits fields beyond the
    /// named ones.
    Mapping {
        fields: Vec<(String, Shape)>,
        open: bool,
    },
}

impl Shape {
    pub fn optional(inner: Shape) -> Shape {
        Shape::Optional(Box::new(inner))
    }

    pub fn sequence(element: Shape) -> Shape {
        Shape::Sequence(Box::new(element))
    }

    pub fn mapping(fields: Vec<(&str, Shape)>) -> Shape {
        Shape::Mapping {
            fields: fields
                .into_iter()
                .map(|(name, shape)| (name.to_string(), shape))
                .collect(),
            open: false,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Shape::Any => "any",
            Shape::Null => "null",
            Shape::Bool => "bool",
            Shape::Int => "int",
            Shape::Float => "float",
            Shape::Str => "string",
            Shape::Optional(_) => "optional",
            Shape::Sequence(_) => "sequence",
            Shape::Tuple(_) => "tuple",
            Shape::Mapping { .. } => "mapping",
        }
    }

    /// Does this shape accept an absent value under lenient projection?
    fn nilable(&self) -> bool {
        matches!(self, Shape::Any | Shape::Null | Shape::Optional(_))
    }
}

/// Check `value` against `shape`, returning the projected value.
pub fn project(value: &Value, shape: &Shape, options: &ComposeOptions) -> Result<Value> {
    project_at(value, shape, options, "$")
}

fn mismatch(shape: &Shape, value: &Value, path: &str) -> YamlError {
    YamlError::projection(
        format!("expected {}, found {}", shape.name(), value.kind_name()),
        path,
    )
}

fn project_at(value: &Value, shape: &Shape, options: &ComposeOptions, path: &str) -> Result<Value> {
    match shape {
        Shape::Any => Ok(value.clone()),
        Shape::Null => match value {
            Value::Null => Ok(Value::Null),
            _ => Err(mismatch(shape, value, path)),
        },
        Shape::Bool => match value {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            _ => Err(mismatch(shape, value, path)),
        },
        Shape::Int => match value {
            Value::Int(n) => Ok(Value::Int(n.clone())),
            // A float with an integral value narrows losslessly.
            Value::Float(x) if x.fract() == 0.0 && x.is_finite() => BigInt::from_f64(*x)
                .map(Value::Int)
                .ok_or_else(|| mismatch(shape, value, path)),
            _ => Err(mismatch(shape, value, path)),
        },
        Shape::Float => match value {
            Value::Float(x) => Ok(Value::Float(*x)),
            Value::Int(n) => match n.to_f64() {
                Some(x) => Ok(Value::Float(x)),
                None => Err(YamlError::projection(
                    format!("integer {n} does not fit in a float"),
                    path,
                )),
            },
            _ => Err(mismatch(shape, value, path)),
        },
        Shape::Str => match value {
            Value::Str(s) => Ok(Value::Str(s.clone())),
            _ => Err(mismatch(shape, value, path)),
        },
        Shape::Optional(inner) => match value {
            Value::Null => Ok(Value::Null),
            _ => project_at(value, inner, options, path),
        },
        Shape::Sequence(element) => match value {
            Value::Sequence(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    out.push(project_at(item, element, options, &format!("{path}.{i}"))?);
                }
                Ok(Value::Sequence(out))
            }
            _ => Err(mismatch(shape, value, path)),
        },
        Shape::Tuple(shapes) => match value {
            Value::Sequence(items) => {
                if items.len() != shapes.len() {
                    return Err(YamlError::projection(
                        format!(
                            "expected a tuple of {} elements, found {}",
                            shapes.len(),
                            items.len()
                        ),
                        path,
                    ));
                }
                if options.strict_tuple_order {
                    let mut out = Vec::with_capacity(items.len());
                    for (i, (item, element)) in items.iter().zip(shapes).enumerate() {
                        out.push(project_at(item, element, options, &format!("{path}.{i}"))?);
                    }
                    Ok(Value::Sequence(out))
                } else {
                    // Each element may satisfy any not-yet-used shape.
                    let mut used = vec![false; shapes.len()];
                    let mut out = Vec::with_capacity(items.len());
                    'items: for (i, item) in items.iter().enumerate() {
                        for (j, element) in shapes.iter().enumerate() {
                            if used[j] {
                                continue;
                            }
                            if let Ok(projected) =
                                project_at(item, element, options, &format!("{path}.{i}"))
                            {
                                used[j] = true;
                                out.push(projected);
                                continue 'items;
                            }
                        }
                        return Err(YamlError::projection(
                            "element matches no remaining tuple shape",
                            format!("{path}.{i}"),
                        ));
                    }
                    Ok(Value::Sequence(out))
                }
            }
            _ => Err(mismatch(shape, value, path)),
        },
        Shape::Mapping { fields, open } => match value {
            Value::Mapping(entries) => {
                let mut out = Vec::with_capacity(entries.len());
                for (key, entry) in entries {
                    let field_path = format!("{path}.{key}");
                    match fields.iter().find(|(name, _)| name == key) {
                        Some((_, field_shape)) => {
                            out.push((
                                key.clone(),
                                project_at(entry, field_shape, options, &field_path)?,
                            ));
                        }
                        None if *open => out.push((key.clone(), entry.clone())),
                        None => {
                            return Err(YamlError::projection(
                                format!("unknown field {key:?}"),
                                field_path,
                            ))
                        }
                    }
                }
                for (name, field_shape) in fields {
                    if entries.iter().any(|(key, _)| key == name) {
                        continue;
                    }
                    // Absent fields read as null only under lenient
                    // projection and a null-accepting shape.
                    if options.allow_data_projection && field_shape.nilable() {
                        out.push((name.clone(), Value::Null));
                    } else {
                        return Err(YamlError::projection(
                            format!("missing required field {name:?}"),
                            path,
                        ));
                    }
                }
                Ok(Value::Mapping(out))
            }
            _ => Err(mismatch(shape, value, path)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ComposeOptions {
        ComposeOptions::default()
    }

    #[test]
    fn test_scalar_shapes() {
        let opts = options();
        assert_eq!(
            project(&Value::from(3i64), &Shape::Int, &opts).unwrap(),
            Value::from(3i64)
        );
        assert_eq!(
            project(&Value::from(3i64), &Shape::Float, &opts).unwrap(),
            Value::Float(3.0)
        );
        assert_eq!(
            project(&Value::Float(2.0), &Shape::Int, &opts).unwrap(),
            Value::from(2i64)
        );
        assert!(project(&Value::Float(2.5), &Shape::Int, &opts).is_err());
        assert!(project(&Value::from("x"), &Shape::Int, &opts).is_err());
    }

    #[test]
    fn test_optional() {
        let opts = options();
        let shape = Shape::optional(Shape::Int);
        assert_eq!(project(&Value::Null, &shape, &opts).unwrap(), Value::Null);
        assert_eq!(
            project(&Value::from(1i64), &shape, &opts).unwrap(),
            Value::from(1i64)
        );
        assert!(project(&Value::from("x"), &shape, &opts).is_err());
    }

    #[test]
    fn test_mapping_fields_and_paths() {
        let opts = options();
        let shape = Shape::mapping(vec![("name", Shape::Str), ("port", Shape::Int)]);
        let good = Value::Mapping(vec![
            ("name".to_string(), Value::from("web")),
            ("port".to_string(), Value::from(80i64)),
        ]);
        assert!(project(&good, &shape, &opts).is_ok());

        let bad = Value::Mapping(vec![
            ("name".to_string(), Value::from("web")),
            ("port".to_string(), Value::from("eighty")),
        ]);
        match project(&bad, &shape, &opts) {
            Err(YamlError::Projection { path, .. }) => assert_eq!(path, "$.port"),
            other => panic!("expected a projection error, got {other:?}"),
        }

        let unknown = Value::Mapping(vec![("extra".to_string(), Value::Null)]);
        assert!(project(&unknown, &shape, &opts).is_err());
    }

    #[test]
    fn test_open_mapping_keeps_extras() {
        let opts = options();
        let shape = Shape::Mapping {
            fields: vec![("a".to_string(), Shape::Int)],
            open: true,
        };
        let value = Value::Mapping(vec![
            ("a".to_string(), Value::from(1i64)),
            ("b".to_string(), Value::from("kept")),
        ]);
        let projected = project(&value, &shape, &opts).unwrap();
        assert_eq!(projected.get("b"), Some(&Value::from("kept")));
    }

    #[test]
    fn test_missing_field_lenient() {
        let mut opts = options();
        let shape = Shape::mapping(vec![("a", Shape::optional(Shape::Int))]);
        let empty = Value::Mapping(vec![]);
        assert!(project(&empty, &shape, &opts).is_err());
        opts.allow_data_projection = true;
        let projected = project(&empty, &shape, &opts).unwrap();
        assert_eq!(projected.get("a"), Some(&Value::Null));
    }

    #[test]
    fn test_nested_path() {
        let opts = options();
        let shape = Shape::mapping(vec![("items", Shape::sequence(Shape::Int))]);
        let value = Value::Mapping(vec![(
            "items".to_string(),
            Value::Sequence(vec![Value::from(1i64), Value::from("no")]),
        )]);
        match project(&value, &shape, &opts) {
            Err(YamlError::Projection { path, .. }) => assert_eq!(path, "$.items.1"),
            other => panic!("expected a projection error, got {other:?}"),
        }
    }

    #[test]
    fn test_tuple_arity_and_order() {
        let mut opts = options();
        let shape = Shape::Tuple(vec![Shape::Int, Shape::Str]);
        let good = Value::Sequence(vec![Value::from(1i64), Value::from("x")]);
        assert!(project(&good, &shape, &opts).is_ok());
        let short = Value::Sequence(vec![Value::from(1i64)]);
        assert!(project(&short, &shape, &opts).is_err());
        let swapped = Value::Sequence(vec![Value::from("x"), Value::from(1i64)]);
        assert!(project(&swapped, &shape, &opts).is_err());
        opts.strict_tuple_order = false;
        assert!(project(&swapped, &shape, &opts).is_ok());
    }
}
