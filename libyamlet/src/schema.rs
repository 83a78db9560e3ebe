//! Tag resolution schemas.
//!
//! A schema decides what untagged plain scalars mean. Resolution is
//! tried in a fixed priority order: integer, then float, then null, then
//! boolean, and finally string. Quoted and block scalars never resolve;
//! they are always strings.

use num_bigint::BigInt;

use crate::error::{Result, YamlError};
use crate::value::Value;

/// The YAML tag namespace all canonical tags live in.
pub const YAML_TAG_PREFIX: &str = "tag:yaml.org,2002:";

/// The three standard YAML 1.2 schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Schema {
    /// Untagged scalars stay strings.
    Failsafe,
    /// Only JSON's exact spellings resolve (`null`, `true`, `-12`, `3.5`).
    Json,
    /// JSON plus YAML's conveniences: `~`, `Null`, `TRUE`, octal and hex
    /// integers, `.inf` and `.nan`.
    #[default]
    Core,
}

impl Schema {
    /// Parse a schema name as given on the command line.
    pub fn from_name(name: &str) -> Option<Schema> {
        match name {
            "failsafe" => Some(Schema::Failsafe),
            "json" => Some(Schema::Json),
            "core" => Some(Schema::Core),
            _ => None,
        }
    }

    /// Resolve an untagged plain scalar to a typed value.
    pub fn resolve(&self, text: &str) -> Value {
        match self {
            Schema::Failsafe => Value::Str(text.to_string()),
            Schema::Json => {
                if let Some(n) = parse_json_int(text) {
                    Value::Int(n)
                } else if let Some(x) = parse_json_float(text) {
                    Value::Float(x)
                } else if text == "null" {
                    Value::Null
                } else if text == "true" {
                    Value::Bool(true)
                } else if text == "false" {
                    Value::Bool(false)
                } else {
                    Value::Str(text.to_string())
                }
            }
            Schema::Core => {
                if let Some(n) = parse_core_int(text) {
                    Value::Int(n)
                } else if let Some(x) = parse_core_float(text) {
                    Value::Float(x)
                } else if matches!(text, "" | "~" | "null" | "Null" | "NULL") {
                    Value::Null
                } else if matches!(text, "true" | "True" | "TRUE") {
                    Value::Bool(true)
                } else if matches!(text, "false" | "False" | "FALSE") {
                    Value::Bool(false)
                } else {
                    Value::Str(text.to_string())
                }
            }
        }
    }

    /// Would `text`, emitted as a plain scalar, read back as a string?
    /// The emitter quotes strings for which this is false.
    pub fn plain_is_string(&self, text: &str) -> bool {
        matches!(self.resolve(text), Value::Str(_))
    }

    /// Construct a value from a scalar carrying an explicit global tag.
    /// Tags outside the `tag:yaml.org,2002:` namespace keep the raw text.
    pub fn construct_tagged(&self, tag: &str, text: &str) -> Result<Value> {
        let suffix = match tag.strip_prefix(YAML_TAG_PREFIX) {
            Some(suffix) => suffix,
            None => return Ok(Value::Str(text.to_string())),
        };
        let mismatch = || {
            YamlError::grammar(
                format!("cannot construct !!{suffix} from scalar {text:?}"),
                crate::error::Mark::default(),
            )
        };
        match suffix {
            "str" => Ok(Value::Str(text.to_string())),
            "null" => match text {
                "" | "~" | "null" | "Null" | "NULL" => Ok(Value::Null),
                _ => Err(mismatch()),
            },
            "bool" => match text {
                "true" | "True" | "TRUE" => Ok(Value::Bool(true)),
                "false" | "False" | "FALSE" => Ok(Value::Bool(false)),
                _ => Err(mismatch()),
            },
            "int" => parse_core_int(text).map(Value::Int).ok_or_else(mismatch),
            "float" => match parse_core_float(text) {
                Some(x) => Ok(Value::Float(x)),
                // An integer literal is an acceptable float spelling.
                None => parse_core_int(text)
                    .and_then(|n| {
                        use num_traits::ToPrimitive;
                        n.to_f64()
                    })
                    .map(Value::Float)
                    .ok_or_else(mismatch),
            },
            "seq" | "map" => Err(mismatch()),
            _ => Ok(Value::Str(text.to_string())),
        }
    }
}

/// `-?(0|[1-9][0-9]*)`
fn parse_json_int(text: &str) -> Option<BigInt> {
    let digits = text.strip_prefix('-').unwrap_or(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return None;
    }
    BigInt::parse_bytes(text.as_bytes(), 10)
}

/// `-?(0|[1-9][0-9]*)(\.[0-9]+)?([eE][-+]?[0-9]+)?`, with at least one of
/// the fraction or exponent present.
fn parse_json_float(text: &str) -> Option<f64> {
    let body = text.strip_prefix('-').unwrap_or(text);
    let mut rest = body;
    let digits = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 || (digits > 1 && rest.starts_with('0')) {
        return None;
    }
    rest = &rest[digits..];
    let mut saw_part = false;
    if let Some(fraction) = rest.strip_prefix('.') {
        let frac_digits = fraction.bytes().take_while(|b| b.is_ascii_digit()).count();
        if frac_digits == 0 {
            return None;
        }
        rest = &fraction[frac_digits..];
        saw_part = true;
    }
    if let Some(exponent) = rest.strip_prefix(['e', 'E']) {
        let exponent = exponent.strip_prefix(['+', '-']).unwrap_or(exponent);
        let exp_digits = exponent.bytes().take_while(|b| b.is_ascii_digit()).count();
        if exp_digits == 0 {
            return None;
        }
        rest = &exponent[exp_digits..];
        saw_part = true;
    }
    if !rest.is_empty() || !saw_part {
        return None;
    }
    text.parse().ok()
}

/// Decimal with optional sign, `0o` octal, or `0x` hexadecimal.
fn parse_core_int(text: &str) -> Option<BigInt> {
    if let Some(octal) = text.strip_prefix("0o") {
        if !octal.is_empty() && octal.bytes().all(|b| (b'0'..=b'7').contains(&b)) {
            return BigInt::parse_bytes(octal.as_bytes(), 8);
        }
        return None;
    }
    if let Some(hex) = text.strip_prefix("0x") {
        if !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return BigInt::parse_bytes(hex.as_bytes(), 16);
        }
        return None;
    }
    let digits = text.strip_prefix(['+', '-']).unwrap_or(text);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    BigInt::parse_bytes(text.trim_start_matches('+').as_bytes(), 10)
}

/// Core floats: optional sign, digits around an optional point, optional
/// exponent, plus the `.inf` and `.nan` spellings.
fn parse_core_float(text: &str) -> Option<f64> {
    let (sign, body) = match text.strip_prefix('-') {
        Some(body) => (-1.0, body),
        None => (1.0, text.strip_prefix('+').unwrap_or(text)),
    };
    if matches!(body, ".inf" | ".Inf" | ".INF") {
        return Some(sign * f64::INFINITY);
    }
    if matches!(body, ".nan" | ".NaN" | ".NAN") {
        return Some(f64::NAN);
    }
    let int_digits = body.bytes().take_while(|b| b.is_ascii_digit()).count();
    let mut rest = &body[int_digits..];
    let mut frac_digits = 0;
    if let Some(fraction) = rest.strip_prefix('.') {
        frac_digits = fraction.bytes().take_while(|b| b.is_ascii_digit()).count();
        rest = &fraction[frac_digits..];
    } else if int_digits == body.len() {
        // A bare integer resolves as an integer, not a float.
        return None;
    }
    if int_digits == 0 && frac_digits == 0 {
        return None;
    }
    if let Some(exponent) = rest.strip_prefix(['e', 'E']) {
        let exponent = exponent.strip_prefix(['+', '-']).unwrap_or(exponent);
        let exp_digits = exponent.bytes().take_while(|b| b.is_ascii_digit()).count();
        if exp_digits == 0 {
            return None;
        }
        rest = &exponent[exp_digits..];
    }
    if !rest.is_empty() {
        return None;
    }
    // Normalize a trailing or leading point for the standard parser.
    let mut normalized = String::with_capacity(text.len() + 2);
    if sign < 0.0 {
        normalized.push('-');
    }
    if body.starts_with('.') {
        normalized.push('0');
    }
    normalized.push_str(body);
    if body.ends_with('.') {
        normalized.push('0');
    }
    normalized.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_resolution_priority() {
        assert_eq!(Schema::Core.resolve("123"), Value::Int(BigInt::from(123)));
        assert_eq!(Schema::Core.resolve("-7"), Value::Int(BigInt::from(-7)));
        assert_eq!(Schema::Core.resolve("0x1F"), Value::Int(BigInt::from(31)));
        assert_eq!(Schema::Core.resolve("0o17"), Value::Int(BigInt::from(15)));
        assert_eq!(Schema::Core.resolve("1.5"), Value::Float(1.5));
        assert_eq!(Schema::Core.resolve("1e3"), Value::Float(1000.0));
        assert_eq!(Schema::Core.resolve(".5"), Value::Float(0.5));
        assert_eq!(Schema::Core.resolve("~"), Value::Null);
        assert_eq!(Schema::Core.resolve("Null"), Value::Null);
        assert_eq!(Schema::Core.resolve(""), Value::Null);
        assert_eq!(Schema::Core.resolve("True"), Value::Bool(true));
        assert_eq!(
            Schema::Core.resolve("hello"),
            Value::Str("hello".to_string())
        );
    }

    #[test]
    fn test_core_infinities() {
        assert_eq!(Schema::Core.resolve(".inf"), Value::Float(f64::INFINITY));
        assert_eq!(
            Schema::Core.resolve("-.INF"),
            Value::Float(f64::NEG_INFINITY)
        );
        match Schema::Core.resolve(".nan") {
            Value::Float(x) => assert!(x.is_nan()),
            other => panic!("expected a float, got {other}"),
        }
    }

    #[test]
    fn test_json_is_strict() {
        assert_eq!(Schema::Json.resolve("123"), Value::Int(BigInt::from(123)));
        assert_eq!(Schema::Json.resolve("null"), Value::Null);
        assert_eq!(Schema::Json.resolve("~"), Value::Str("~".to_string()));
        assert_eq!(Schema::Json.resolve("Null"), Value::Str("Null".to_string()));
        assert_eq!(Schema::Json.resolve("TRUE"), Value::Str("TRUE".to_string()));
        assert_eq!(Schema::Json.resolve("0x1F"), Value::Str("0x1F".to_string()));
        assert_eq!(Schema::Json.resolve("+1"), Value::Str("+1".to_string()));
        assert_eq!(Schema::Json.resolve("01"), Value::Str("01".to_string()));
    }

    #[test]
    fn test_failsafe_keeps_strings() {
        assert_eq!(Schema::Failsafe.resolve("123"), Value::Str("123".to_string()));
        assert_eq!(Schema::Failsafe.resolve("null"), Value::Str("null".to_string()));
    }

    #[test]
    fn test_big_integers_do_not_overflow() {
        let text = "123456789012345678901234567890";
        match Schema::Core.resolve(text) {
            Value::Int(n) => assert_eq!(n.to_string(), text),
            other => panic!("expected an int, got {other}"),
        }
    }

    #[test]
    fn test_construct_tagged() {
        let schema = Schema::Core;
        assert_eq!(
            schema.construct_tagged("tag:yaml.org,2002:str", "123").unwrap(),
            Value::Str("123".to_string())
        );
        assert_eq!(
            schema.construct_tagged("tag:yaml.org,2002:int", "42").unwrap(),
            Value::Int(BigInt::from(42))
        );
        assert_eq!(
            schema.construct_tagged("tag:yaml.org,2002:float", "2").unwrap(),
            Value::Float(2.0)
        );
        assert!(schema
            .construct_tagged("tag:yaml.org,2002:int", "abc")
            .is_err());
        assert_eq!(
            schema
                .construct_tagged("tag:example.com,2026:thing", "raw")
                .unwrap(),
            Value::Str("raw".to_string())
        );
    }

    #[test]
    fn test_not_numbers() {
        assert_eq!(Schema::Core.resolve("1.2.3"), Value::Str("1.2.3".to_string()));
        assert_eq!(Schema::Core.resolve("0x"), Value::Str("0x".to_string()));
        assert_eq!(Schema::Core.resolve("-"), Value::Str("-".to_string()));
        assert_eq!(Schema::Core.resolve("e3"), Value::Str("e3".to_string()));
    }
}
