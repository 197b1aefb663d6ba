//! `Datum`: the tagged value carried by attributes, query results, and
//! protocol payloads (C1).
//!
//! Grounded in the teacher's `serde_json::Value`-driven value handling
//! (`query_builder::format_value`/`format_array_value`) but replacing the
//! untyped JSON value with an explicit tagged union, per the "never an
//! integer tag plus untyped payload" design note.

use std::cmp::Ordering;
use std::fmt;

use chrono::{Local, TimeZone, Utc};
use thiserror::Error;

/// The element type carried by an `Array` datum. Arrays are homogeneous and
/// never contain `Null` or nested arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarTag {
    Integer,
    Decimal,
    String,
    Datetime,
    Binary,
    Regex,
}

/// The full type tag of a `Datum`, including `Null` and `Array`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatumTag {
    Null,
    Integer,
    Decimal,
    String,
    Datetime,
    Binary,
    Regex,
    Array(ScalarTag),
}

impl fmt::Display for DatumTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatumTag::Null => write!(f, "NULL"),
            DatumTag::Integer => write!(f, "INTEGER"),
            DatumTag::Decimal => write!(f, "DECIMAL"),
            DatumTag::String => write!(f, "STRING"),
            DatumTag::Datetime => write!(f, "DATETIME"),
            DatumTag::Binary => write!(f, "BINARY"),
            DatumTag::Regex => write!(f, "REGEX"),
            DatumTag::Array(t) => write!(f, "ARRAY[{t:?}]"),
        }
    }
}

/// A regex value: the original source text plus its compiled form, so that
/// serialization remains lossless (the source round-trips even though the
/// compiled automaton does not).
#[derive(Debug, Clone)]
pub struct DatumRegex {
    pub source: String,
    pub compiled: Option<regex::Regex>,
}

impl DatumRegex {
    /// Compile `source` eagerly. A compile failure is not an error here —
    /// callers that need no-match-on-failure semantics (matcher evaluation)
    /// should check `compiled.is_none()` rather than failing construction.
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let compiled = regex::Regex::new(&source).ok();
        DatumRegex { source, compiled }
    }
}

impl PartialEq for DatumRegex {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}
impl Eq for DatumRegex {}

/// A homogeneous array of scalar values.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayDatum {
    pub elem_tag: ScalarTag,
    pub elements: Vec<Datum>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Integer(i64),
    Decimal(f64),
    String(String),
    /// Nanoseconds since the Unix epoch.
    Datetime(i64),
    Binary(Vec<u8>),
    Regex(DatumRegex),
    Array(ArrayDatum),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DatumError {
    #[error("type mismatch")]
    TypeMismatch,
    #[error("division by zero")]
    DivisionByZero,
    #[error("invalid literal for {0}")]
    InvalidLiteral(DatumTag),
    #[error("array element has tag {found:?}, expected {expected:?}")]
    ArrayElementMismatch { expected: ScalarTag, found: DatumTag },
    #[error("null or array values cannot be array elements")]
    InvalidArrayElement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStyle {
    None,
    Single,
    Double,
}

/// The result of comparing two data points; distinct from `Option<Ordering>`
/// so call sites read as "incomparable", not "equal-ish".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareResult {
    Less,
    Equal,
    Greater,
    Incomparable,
}

impl CompareResult {
    pub fn as_ordering(self) -> Option<Ordering> {
        match self {
            CompareResult::Less => Some(Ordering::Less),
            CompareResult::Equal => Some(Ordering::Equal),
            CompareResult::Greater => Some(Ordering::Greater),
            CompareResult::Incomparable => None,
        }
    }
}

impl Datum {
    pub fn tag(&self) -> DatumTag {
        match self {
            Datum::Null => DatumTag::Null,
            Datum::Integer(_) => DatumTag::Integer,
            Datum::Decimal(_) => DatumTag::Decimal,
            Datum::String(_) => DatumTag::String,
            Datum::Datetime(_) => DatumTag::Datetime,
            Datum::Binary(_) => DatumTag::Binary,
            Datum::Regex(_) => DatumTag::Regex,
            Datum::Array(a) => DatumTag::Array(a.elem_tag),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// Build an array datum, enforcing the homogeneity invariant.
    pub fn array(elem_tag: ScalarTag, elements: Vec<Datum>) -> Result<Datum, DatumError> {
        for el in &elements {
            match el.tag() {
                DatumTag::Null | DatumTag::Array(_) => return Err(DatumError::InvalidArrayElement),
                found if found == scalar_as_tag(elem_tag) => {}
                found => {
                    return Err(DatumError::ArrayElementMismatch { expected: elem_tag, found });
                }
            }
        }
        Ok(Datum::Array(ArrayDatum { elem_tag, elements }))
    }

    /// A rough estimate of the datum's in-memory footprint, used for sizing
    /// diagnostics (not for any correctness-relevant decision).
    pub fn length_estimate(&self) -> usize {
        match self {
            Datum::Null => 0,
            Datum::Integer(_) | Datum::Decimal(_) | Datum::Datetime(_) => 8,
            Datum::String(s) => s.len(),
            Datum::Binary(b) => b.len(),
            Datum::Regex(r) => r.source.len(),
            Datum::Array(a) => a.elements.iter().map(Datum::length_estimate).sum(),
        }
    }

    /// Type-strict comparison. `Null` is less than any non-null datum.
    /// Differing non-null tags are incomparable.
    pub fn compare(&self, other: &Datum) -> CompareResult {
        match (self, other) {
            (Datum::Null, Datum::Null) => CompareResult::Equal,
            (Datum::Null, _) => CompareResult::Less,
            (_, Datum::Null) => CompareResult::Greater,
            (Datum::Integer(a), Datum::Integer(b)) => from_ord(a.cmp(b)),
            (Datum::Decimal(a), Datum::Decimal(b)) => from_partial(a.partial_cmp(b)),
            (Datum::String(a), Datum::String(b)) => from_ord(a.cmp(b)),
            (Datum::Datetime(a), Datum::Datetime(b)) => from_ord(a.cmp(b)),
            (Datum::Binary(a), Datum::Binary(b)) => from_ord(a.cmp(b)),
            (Datum::Regex(a), Datum::Regex(b)) => from_ord(a.source.cmp(&b.source)),
            (Datum::Array(a), Datum::Array(b)) if a.elem_tag == b.elem_tag => {
                for (x, y) in a.elements.iter().zip(b.elements.iter()) {
                    match x.compare(y) {
                        CompareResult::Equal => continue,
                        other => return other,
                    }
                }
                from_ord(a.elements.len().cmp(&b.elements.len()))
            }
            _ => CompareResult::Incomparable,
        }
    }

    /// Compare by formatting both sides as unquoted strings first — the
    /// explicit string-fallback path spec.md allows for cross-tag compares.
    pub fn strcompare(&self, other: &Datum) -> CompareResult {
        let a = self.format(QuoteStyle::None);
        let b = other.format(QuoteStyle::None);
        from_ord(a.cmp(&b))
    }

    /// True iff `needle` appears in `haystack`, using type-strict equality.
    /// An empty or tag-mismatched haystack always yields false.
    pub fn in_array(&self, haystack: &Datum) -> bool {
        let Datum::Array(arr) = haystack else { return false };
        arr.elements.iter().any(|el| self.compare(el) == CompareResult::Equal)
    }

    pub fn format(&self, quote: QuoteStyle) -> String {
        match self {
            Datum::Null => "NULL".to_string(),
            Datum::Integer(i) => i.to_string(),
            Datum::Decimal(d) => format_decimal(*d),
            Datum::String(s) => quote_string(s, quote),
            Datum::Datetime(ns) => format_datetime(*ns),
            Datum::Binary(b) => format_binary(b),
            Datum::Regex(r) => r.source.clone(),
            Datum::Array(a) => {
                let items: Vec<String> = a.elements.iter().map(|e| e.format(quote)).collect();
                format!("[{}]", items.join(", "))
            }
        }
    }

    /// Parse `text` as the given expected tag. Only scalar tags are
    /// accepted; array literals are parsed by the SysQL lexer directly.
    pub fn parse(text: &str, expected: DatumTag) -> Result<Datum, DatumError> {
        match expected {
            DatumTag::Null => Ok(Datum::Null),
            DatumTag::Integer => text
                .parse::<i64>()
                .map(Datum::Integer)
                .map_err(|_| DatumError::InvalidLiteral(expected)),
            DatumTag::Decimal => parse_decimal(text).ok_or(DatumError::InvalidLiteral(expected)),
            DatumTag::String => Ok(Datum::String(unquote(text))),
            DatumTag::Datetime => parse_datetime(text).ok_or(DatumError::InvalidLiteral(expected)),
            DatumTag::Binary => parse_binary(text).ok_or(DatumError::InvalidLiteral(expected)),
            DatumTag::Regex => Ok(Datum::Regex(DatumRegex::new(text))),
            DatumTag::Array(_) => Err(DatumError::InvalidLiteral(expected)),
        }
    }

    /// Arithmetic/string evaluation per the rules in spec.md §4.1. Any
    /// operand being `Null` yields `Null`, not an error.
    pub fn eval(op: ArithOp, a: &Datum, b: &Datum) -> Result<Datum, DatumError> {
        if a.is_null() || b.is_null() {
            return Ok(Datum::Null);
        }
        use ArithOp::*;
        match (op, a, b) {
            (Add, Datum::Integer(x), Datum::Integer(y)) => Ok(Datum::Integer(x.wrapping_add(*y))),
            (Sub, Datum::Integer(x), Datum::Integer(y)) => Ok(Datum::Integer(x.wrapping_sub(*y))),
            (Mul, Datum::Integer(x), Datum::Integer(y)) => Ok(Datum::Integer(x.wrapping_mul(*y))),
            (Div, Datum::Integer(x), Datum::Integer(y)) => {
                if *y == 0 { Err(DatumError::DivisionByZero) } else { Ok(Datum::Integer(x / y)) }
            }
            (Mod, Datum::Integer(x), Datum::Integer(y)) => {
                if *y == 0 { Err(DatumError::DivisionByZero) } else { Ok(Datum::Integer(x % y)) }
            }

            (Add, Datum::Decimal(x), Datum::Decimal(y)) => Ok(Datum::Decimal(x + y)),
            (Sub, Datum::Decimal(x), Datum::Decimal(y)) => Ok(Datum::Decimal(x - y)),
            (Mul, Datum::Decimal(x), Datum::Decimal(y)) => Ok(Datum::Decimal(x * y)),
            (Div, Datum::Decimal(x), Datum::Decimal(y)) => {
                if *y == 0.0 { Err(DatumError::DivisionByZero) } else { Ok(Datum::Decimal(x / y)) }
            }
            (Mod, Datum::Decimal(_), Datum::Decimal(_)) => Err(DatumError::TypeMismatch),

            (Add, Datum::Integer(x), Datum::Decimal(y)) => Ok(Datum::Decimal(*x as f64 + y)),
            (Add, Datum::Decimal(x), Datum::Integer(y)) => Ok(Datum::Decimal(x + *y as f64)),
            (Sub, Datum::Integer(x), Datum::Decimal(y)) => Ok(Datum::Decimal(*x as f64 - y)),
            (Sub, Datum::Decimal(x), Datum::Integer(y)) => Ok(Datum::Decimal(x - *y as f64)),
            (Mul, Datum::Integer(x), Datum::Decimal(y)) => Ok(Datum::Decimal(*x as f64 * y)),
            (Mul, Datum::Decimal(x), Datum::Integer(y)) => Ok(Datum::Decimal(x * *y as f64)),
            (Div, Datum::Integer(x), Datum::Decimal(y)) => {
                if *y == 0.0 { Err(DatumError::DivisionByZero) } else { Ok(Datum::Decimal(*x as f64 / y)) }
            }
            (Div, Datum::Decimal(x), Datum::Integer(y)) => {
                if *y == 0 { Err(DatumError::DivisionByZero) } else { Ok(Datum::Decimal(x / *y as f64)) }
            }

            (Add, Datum::Datetime(x), Datum::Datetime(y)) => Ok(Datum::Datetime(x.wrapping_add(*y))),
            (Sub, Datum::Datetime(x), Datum::Datetime(y)) => Ok(Datum::Datetime(x.wrapping_sub(*y))),
            (Mul, Datum::Datetime(x), Datum::Integer(y)) => Ok(Datum::Datetime(x.wrapping_mul(*y))),
            (Div, Datum::Datetime(x), Datum::Integer(y)) => {
                if *y == 0 { Err(DatumError::DivisionByZero) } else { Ok(Datum::Datetime(x / y)) }
            }

            (Concat, Datum::String(x), Datum::String(y)) => Ok(Datum::String(format!("{x}{y}"))),
            (Concat, Datum::Binary(x), Datum::Binary(y)) => {
                let mut v = x.clone();
                v.extend_from_slice(y);
                Ok(Datum::Binary(v))
            }

            _ => Err(DatumError::TypeMismatch),
        }
    }
}

fn scalar_as_tag(t: ScalarTag) -> DatumTag {
    match t {
        ScalarTag::Integer => DatumTag::Integer,
        ScalarTag::Decimal => DatumTag::Decimal,
        ScalarTag::String => DatumTag::String,
        ScalarTag::Datetime => DatumTag::Datetime,
        ScalarTag::Binary => DatumTag::Binary,
        ScalarTag::Regex => DatumTag::Regex,
    }
}

fn from_ord(o: Ordering) -> CompareResult {
    match o {
        Ordering::Less => CompareResult::Less,
        Ordering::Equal => CompareResult::Equal,
        Ordering::Greater => CompareResult::Greater,
    }
}

fn from_partial(o: Option<Ordering>) -> CompareResult {
    o.map(from_ord).unwrap_or(CompareResult::Incomparable)
}

fn format_decimal(d: f64) -> String {
    if !d.is_finite() {
        return format!("{d}");
    }
    // %g-style: shortest representation that round-trips; Rust's default
    // float Display already produces the shortest round-tripping decimal.
    let s = format!("{d}");
    if s.parse::<f64>() == Ok(d) {
        return s;
    }
    // Fallback for values that can't be expressed exactly in decimal
    // notation without loss: the IEEE-754 bit pattern as a hex literal.
    format!("0x{:x}p0", d.to_bits())
}

fn quote_string(s: &str, quote: QuoteStyle) -> String {
    let (q, esc_quote) = match quote {
        QuoteStyle::None => return s.to_string(),
        QuoteStyle::Single => ('\'', "\\'"),
        QuoteStyle::Double => ('"', "\\\""),
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(q);
    for c in s.chars() {
        if c == '\\' {
            out.push_str("\\\\");
        } else if c == q {
            out.push_str(esc_quote);
        } else {
            out.push(c);
        }
    }
    out.push(q);
    out
}

fn unquote(text: &str) -> String {
    let bytes = text.as_bytes();
    if bytes.len() >= 2 && (bytes[0] == b'\'' || bytes[0] == b'"') && bytes[bytes.len() - 1] == bytes[0] {
        let quote = bytes[0] as char;
        let inner = &text[1..text.len() - 1];
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\\' {
                if let Some(&next) = chars.peek() {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
            out.push(c);
        }
        out
    } else {
        text.to_string()
    }
}

fn format_datetime(ns: i64) -> String {
    let secs = ns.div_euclid(1_000_000_000);
    let nanos = ns.rem_euclid(1_000_000_000) as u32;
    match Utc.timestamp_opt(secs, nanos).single() {
        Some(utc) => utc.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S %z").to_string(),
        None => format!("invalid-datetime({ns})"),
    }
}

fn parse_decimal(text: &str) -> Option<Datum> {
    text.trim().parse::<f64>().ok().map(Datum::Decimal)
}

fn parse_binary(text: &str) -> Option<Datum> {
    // `\xHH` per byte, as emitted by format().
    let mut out = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && bytes[i + 1] == b'x' {
            let hex = std::str::from_utf8(&bytes[i + 2..i + 4]).ok()?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 4;
        } else {
            return None;
        }
    }
    Some(Datum::Binary(out))
}

fn format_binary(b: &[u8]) -> String {
    b.iter().map(|byte| format!("\\x{byte:02x}")).collect()
}

/// Parse an ISO-8601-ish date or datetime into nanoseconds since the epoch.
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS`, and the same with a `T`
/// separator and/or fractional seconds.
fn parse_datetime(text: &str) -> Option<Datum> {
    let text = text.trim();
    let normalized = text.replacen('T', " ", 1);
    let formats = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d",
    ];
    for fmt in formats {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(&normalized, fmt) {
            return Some(Datum::Datetime(dt.and_utc().timestamp_nanos_opt()?));
        }
        if let Ok(d) = chrono::NaiveDate::parse_from_str(&normalized, fmt) {
            let dt = d.and_hms_opt(0, 0, 0)?;
            return Some(Datum::Datetime(dt.and_utc().timestamp_nanos_opt()?));
        }
    }
    None
}

/// Duration unit table from spec.md §4.4: `Y M D h m s ms us ns`, case
/// sensitive. `1Y` = 365.2425 days; `1M` = 30.436875 days (Julian calendar
/// averages, matching the original implementation).
pub fn parse_duration_ns(text: &str) -> Option<i64> {
    const NS_PER_SEC: f64 = 1_000_000_000.0;
    const UNITS: &[(&str, f64)] = &[
        ("ms", NS_PER_SEC / 1_000.0),
        ("us", NS_PER_SEC / 1_000_000.0),
        ("ns", 1.0),
        ("Y", 365.2425 * 86_400.0 * NS_PER_SEC),
        ("M", 30.436_875 * 86_400.0 * NS_PER_SEC),
        ("D", 86_400.0 * NS_PER_SEC),
        ("h", 3_600.0 * NS_PER_SEC),
        ("m", 60.0 * NS_PER_SEC),
        ("s", NS_PER_SEC),
    ];

    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let mut total = 0.0f64;
    let mut rest = text;
    let mut matched_any = false;
    while !rest.is_empty() {
        let digit_end = rest.find(|c: char| !c.is_ascii_digit() && c != '.').unwrap_or(rest.len());
        if digit_end == 0 {
            return None;
        }
        let (num_str, after_num) = rest.split_at(digit_end);
        let num: f64 = num_str.parse().ok()?;

        let (unit, after_unit) = UNITS
            .iter()
            .find(|(u, _)| after_num.starts_with(u))
            .map(|(u, scale)| (*scale, &after_num[u.len()..]))?;
        total += num * unit;
        rest = after_unit;
        matched_any = true;
    }
    if !matched_any {
        return None;
    }
    Some(total.round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_less_than_anything() {
        assert_eq!(Datum::Null.compare(&Datum::Integer(0)), CompareResult::Less);
        assert_eq!(Datum::Integer(0).compare(&Datum::Null), CompareResult::Greater);
        assert_eq!(Datum::Null.compare(&Datum::Null), CompareResult::Equal);
    }

    #[test]
    fn cross_tag_is_incomparable() {
        assert_eq!(
            Datum::Integer(1).compare(&Datum::String("1".into())),
            CompareResult::Incomparable
        );
    }

    #[test]
    fn arithmetic_rules() {
        assert_eq!(
            Datum::eval(ArithOp::Add, &Datum::Integer(2), &Datum::Integer(3)),
            Ok(Datum::Integer(5))
        );
        assert_eq!(
            Datum::eval(ArithOp::Div, &Datum::Integer(1), &Datum::Integer(0)),
            Err(DatumError::DivisionByZero)
        );
        assert_eq!(
            Datum::eval(ArithOp::Mod, &Datum::Decimal(1.0), &Datum::Decimal(2.0)),
            Err(DatumError::TypeMismatch)
        );
        assert_eq!(Datum::eval(ArithOp::Add, &Datum::Null, &Datum::Integer(1)), Ok(Datum::Null));
    }

    #[test]
    fn mixed_integer_decimal_arithmetic_promotes_to_decimal() {
        assert_eq!(Datum::eval(ArithOp::Add, &Datum::Integer(2), &Datum::Decimal(0.5)), Ok(Datum::Decimal(2.5)));
        assert_eq!(Datum::eval(ArithOp::Sub, &Datum::Integer(0), &Datum::Decimal(5.5)), Ok(Datum::Decimal(-5.5)));
    }

    #[test]
    fn string_concat() {
        assert_eq!(
            Datum::eval(ArithOp::Concat, &Datum::String("a".into()), &Datum::String("b".into())),
            Ok(Datum::String("ab".into()))
        );
    }

    #[test]
    fn array_rejects_null_and_nested_arrays() {
        assert_eq!(
            Datum::array(ScalarTag::Integer, vec![Datum::Null]),
            Err(DatumError::InvalidArrayElement)
        );
    }

    #[test]
    fn in_array_on_empty_is_false() {
        let empty = Datum::array(ScalarTag::Integer, vec![]).unwrap();
        assert!(!Datum::Integer(1).in_array(&empty));
    }

    #[test]
    fn round_trip_format_parse_integer() {
        let d = Datum::Integer(-42);
        let s = d.format(QuoteStyle::None);
        assert_eq!(Datum::parse(&s, DatumTag::Integer).unwrap(), d);
    }

    #[test]
    fn round_trip_format_parse_string() {
        let d = Datum::String("quote ' and backslash \\".into());
        let s = d.format(QuoteStyle::Single);
        assert_eq!(Datum::parse(&s, DatumTag::String).unwrap(), d);
    }

    #[test]
    fn duration_units() {
        assert_eq!(parse_duration_ns("5m"), Some(300_000_000_000));
        assert_eq!(parse_duration_ns("30s"), Some(30_000_000_000));
        assert_eq!(parse_duration_ns("1D"), Some(86_400_000_000_000));
    }
}
