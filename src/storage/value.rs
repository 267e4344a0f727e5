//! Typed Values
//!
//! Every stored entry carries one of six value kinds. [`Value`] is the owned
//! form used at the public API surface and on the wire; [`ValueRef`] is the
//! borrowed view handed out by the hash table, valid only until the next
//! mutating table call.

use bytes::Bytes;
use std::fmt;

/// Maximum byte length for keys, string payloads, and binary payloads (1 MiB).
pub const MAX_STRING_SIZE: usize = 1024 * 1024;

/// Discriminant for the six value kinds. The numeric values are part of the
/// snapshot file format and must not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TypeTag {
    Null = 0,
    String = 1,
    Int64 = 2,
    Double = 3,
    Bool = 4,
    Binary = 5,
}

impl TypeTag {
    /// Decodes a tag byte from a snapshot file.
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(TypeTag::Null),
            1 => Some(TypeTag::String),
            2 => Some(TypeTag::Int64),
            3 => Some(TypeTag::Double),
            4 => Some(TypeTag::Bool),
            5 => Some(TypeTag::Binary),
            _ => None,
        }
    }

    /// Human-readable tag name, as reported by TYPE-style introspection.
    pub fn name(&self) -> &'static str {
        match self {
            TypeTag::Null => "null",
            TypeTag::String => "string",
            TypeTag::Int64 => "int64",
            TypeTag::Double => "double",
            TypeTag::Bool => "bool",
            TypeTag::Binary => "binary",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An owned typed value.
///
/// String payloads are conventionally UTF-8 but never validated; Binary is
/// arbitrary bytes. Both are capped at [`MAX_STRING_SIZE`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    String(Bytes),
    Int64(i64),
    Double(f64),
    Bool(bool),
    Binary(Bytes),
}

impl Value {
    /// Returns the tag for this value.
    pub fn tag(&self) -> TypeTag {
        match self {
            Value::Null => TypeTag::Null,
            Value::String(_) => TypeTag::String,
            Value::Int64(_) => TypeTag::Int64,
            Value::Double(_) => TypeTag::Double,
            Value::Bool(_) => TypeTag::Bool,
            Value::Binary(_) => TypeTag::Binary,
        }
    }

    /// Convenience constructor for a string value from anything byte-like.
    pub fn string(data: impl Into<Bytes>) -> Self {
        Value::String(data.into())
    }

    /// Convenience constructor for a binary value.
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Value::Binary(data.into())
    }

    /// Renders the canonical text form used for wire replies: decimal for
    /// Int64, `%g`-style for Double, `true`/`false` for Bool, raw bytes for
    /// String and Binary. Null renders as no bytes; the protocol layer maps
    /// it to a null bulk instead.
    pub fn render(&self) -> Bytes {
        match self {
            Value::Null => Bytes::new(),
            Value::String(s) => s.clone(),
            Value::Int64(n) => Bytes::from(n.to_string()),
            Value::Double(d) => Bytes::from(format_double(*d)),
            Value::Bool(b) => {
                let text: &'static [u8] = if *b { b"true" } else { b"false" };
                Bytes::from_static(text)
            }
            Value::Binary(b) => b.clone(),
        }
    }
}

/// Borrowed view of a stored value.
///
/// Payload slices point into the store's arena and are invalidated by any
/// mutating table operation; callers that outlive the borrow call
/// [`to_owned`](Self::to_owned) first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueRef<'a> {
    Null,
    String(&'a [u8]),
    Int64(i64),
    Double(f64),
    Bool(bool),
    Binary(&'a [u8]),
}

impl<'a> ValueRef<'a> {
    pub fn tag(&self) -> TypeTag {
        match self {
            ValueRef::Null => TypeTag::Null,
            ValueRef::String(_) => TypeTag::String,
            ValueRef::Int64(_) => TypeTag::Int64,
            ValueRef::Double(_) => TypeTag::Double,
            ValueRef::Bool(_) => TypeTag::Bool,
            ValueRef::Binary(_) => TypeTag::Binary,
        }
    }

    /// Materializes the borrow into an owned [`Value`].
    pub fn to_owned(&self) -> Value {
        match self {
            ValueRef::Null => Value::Null,
            ValueRef::String(s) => Value::String(Bytes::copy_from_slice(s)),
            ValueRef::Int64(n) => Value::Int64(*n),
            ValueRef::Double(d) => Value::Double(*d),
            ValueRef::Bool(b) => Value::Bool(*b),
            ValueRef::Binary(b) => Value::Binary(Bytes::copy_from_slice(b)),
        }
    }
}

/// Formats a double the way C's `%g` does: six significant digits,
/// scientific notation with a signed two-digit exponent when the decimal
/// exponent is below -4 or at least 6, trailing zeros trimmed.
pub fn format_double(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    let mut exp = value.abs().log10().floor() as i32;
    // log10 can land one off at exact powers of ten; renormalize.
    if value.abs() / 10f64.powi(exp) >= 10.0 {
        exp += 1;
    }

    if !(-4..6).contains(&exp) {
        let mut mantissa = value / 10f64.powi(exp);
        let mut rendered = format!("{:.5}", mantissa);
        // Rounding may carry the mantissa to 10.x; bump the exponent.
        if rendered.starts_with("10") || rendered.starts_with("-10") {
            mantissa /= 10.0;
            exp += 1;
            rendered = format!("{:.5}", mantissa);
        }
        let mantissa = trim_fraction(rendered);
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exp.abs())
    } else {
        let decimals = (5 - exp).max(0) as usize;
        trim_fraction(format!("{:.*}", decimals, value))
    }
}

fn trim_fraction(mut s: String) -> String {
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_round_trip() {
        for tag in [
            TypeTag::Null,
            TypeTag::String,
            TypeTag::Int64,
            TypeTag::Double,
            TypeTag::Bool,
            TypeTag::Binary,
        ] {
            assert_eq!(TypeTag::from_u8(tag as u8), Some(tag));
        }
        assert_eq!(TypeTag::from_u8(6), None);
        assert_eq!(TypeTag::from_u8(0xFF), None);
    }

    #[test]
    fn test_render_int64() {
        assert_eq!(Value::Int64(-42).render(), Bytes::from_static(b"-42"));
        assert_eq!(Value::Int64(0).render(), Bytes::from_static(b"0"));
        assert_eq!(
            Value::Int64(i64::MIN).render(),
            Bytes::from(i64::MIN.to_string())
        );
    }

    #[test]
    fn test_render_bool() {
        assert_eq!(Value::Bool(true).render(), Bytes::from_static(b"true"));
        assert_eq!(Value::Bool(false).render(), Bytes::from_static(b"false"));
    }

    #[test]
    fn test_format_double_plain() {
        assert_eq!(format_double(0.0), "0");
        assert_eq!(format_double(3.14), "3.14");
        assert_eq!(format_double(-0.5), "-0.5");
        assert_eq!(format_double(100000.0), "100000");
        assert_eq!(format_double(1.5), "1.5");
    }

    #[test]
    fn test_format_double_scientific() {
        assert_eq!(format_double(1_000_000.0), "1e+06");
        assert_eq!(format_double(0.00001), "1e-05");
        assert_eq!(format_double(2.5e10), "2.5e+10");
        assert_eq!(format_double(-3e-7), "-3e-07");
    }

    #[test]
    fn test_format_double_significant_digits() {
        // %g keeps six significant digits.
        assert_eq!(format_double(3.14159265), "3.14159");
        assert_eq!(format_double(123456.0), "123456");
    }

    #[test]
    fn test_value_ref_to_owned() {
        let value = ValueRef::String(b"hello");
        assert_eq!(value.to_owned(), Value::string("hello"));
        assert_eq!(value.tag(), TypeTag::String);

        assert_eq!(ValueRef::Null.to_owned(), Value::Null);
        assert_eq!(ValueRef::Int64(7).to_owned(), Value::Int64(7));
    }
}
