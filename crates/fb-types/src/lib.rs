#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An immutable, ordered sequence of text fields.
///
/// Field access is 0-based. Implementations return `None` for an index past
/// the last field; callers decide how to surface that.
pub trait Record {
    fn field(&self, index: usize) -> Option<&str>;

    fn width(&self) -> usize;
}

impl<R: Record + ?Sized> Record for &R {
    fn field(&self, index: usize) -> Option<&str> {
        (**self).field(index)
    }

    fn width(&self) -> usize {
        (**self).width()
    }
}

impl Record for Vec<String> {
    fn field(&self, index: usize) -> Option<&str> {
        self.get(index).map(String::as_str)
    }

    fn width(&self) -> usize {
        self.len()
    }
}

impl Record for Vec<&str> {
    fn field(&self, index: usize) -> Option<&str> {
        self.get(index).copied()
    }

    fn width(&self) -> usize {
        self.len()
    }
}

impl<const N: usize> Record for [&str; N] {
    fn field(&self, index: usize) -> Option<&str> {
        self.get(index).copied()
    }

    fn width(&self) -> usize {
        N
    }
}

/// Owned record, e.g. one tab-delimited feature line after splitting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TextRecord {
    fields: Vec<String>,
}

impl TextRecord {
    #[must_use]
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }

    #[must_use]
    pub fn from_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Split an already-read line on `delimiter`. No quoting rules apply.
    #[must_use]
    pub fn split(line: &str, delimiter: char) -> Self {
        Self::from_fields(line.split(delimiter))
    }

    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

impl Record for TextRecord {
    fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    fn width(&self) -> usize {
        self.fields.len()
    }
}

/// Column selector, stored 0-based.
///
/// Displayed 1-based (`column 5`) because that is how interval tools number
/// columns on the command line.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ColumnIndex(usize);

impl ColumnIndex {
    pub const FIRST: Self = Self(0);

    #[must_use]
    pub const fn zero_based(index: usize) -> Self {
        Self(index)
    }

    pub fn one_based(column: usize) -> Result<Self, TypeError> {
        match column {
            0 => Err(TypeError::ZeroColumn),
            n => Ok(Self(n - 1)),
        }
    }

    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }

    #[must_use]
    pub const fn number(self) -> usize {
        self.0.saturating_add(1)
    }
}

impl fmt::Display for ColumnIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "column {}", self.number())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("column numbers are 1-based; 0 is not a valid column")]
    ZeroColumn,
}

/// Classification of a column value read as a number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericParse {
    /// The whole (whitespace-trimmed) text is a float, decimal or `0x` hex.
    Exact(f64),
    /// Only a leading prefix is numeric, e.g. `"12abc"`.
    Prefix(f64),
    Unparsable,
}

impl NumericParse {
    #[must_use]
    pub fn is_exact(self) -> bool {
        matches!(self, Self::Exact(_))
    }

    /// The value C's `atof` would produce: the numeric prefix (decimal or hex),
    /// or zero.
    #[must_use]
    pub fn lenient_value(self) -> f64 {
        match self {
            Self::Exact(v) | Self::Prefix(v) => v,
            Self::Unparsable => 0.0,
        }
    }
}

pub fn parse_numeric(text: &str) -> NumericParse {
    let trimmed = text.trim();
    if !trimmed.is_empty()
        && let Ok(value) = trimmed.parse::<f64>()
    {
        return NumericParse::Exact(value);
    }

    let lead = text.trim_start();
    if let Some((len, value)) = hex_prefix(lead) {
        return if len == trimmed.len() {
            NumericParse::Exact(value)
        } else {
            NumericParse::Prefix(value)
        };
    }

    let len = numeric_prefix_len(lead);
    if len == 0 {
        return NumericParse::Unparsable;
    }
    match lead[..len].parse::<f64>() {
        Ok(value) => NumericParse::Prefix(value),
        Err(_) => NumericParse::Unparsable,
    }
}

/// Leading C99 hex float (`0x1A`, `-0x1.8p3`): its length in bytes and value.
/// `None` unless at least one hex digit follows the `0x`.
fn hex_prefix(text: &str) -> Option<(usize, f64)> {
    let bytes = text.as_bytes();
    let negative = bytes.first() == Some(&b'-');
    let mut pos = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    if bytes.get(pos) != Some(&b'0') || !matches!(bytes.get(pos + 1), Some(b'x' | b'X')) {
        return None;
    }
    pos += 2;

    let hex_digit = |at: usize| bytes.get(at).and_then(|&b| char::from(b).to_digit(16));
    let mut mantissa = 0.0_f64;
    let mut digits = 0;
    while let Some(d) = hex_digit(pos) {
        mantissa = mantissa * 16.0 + f64::from(d);
        pos += 1;
        digits += 1;
    }
    let mut scale = 0_i64;
    if bytes.get(pos) == Some(&b'.') {
        let mut frac = pos + 1;
        while let Some(d) = hex_digit(frac) {
            mantissa = mantissa * 16.0 + f64::from(d);
            scale -= 4;
            frac += 1;
            digits += 1;
        }
        if digits > 0 {
            pos = frac;
        }
    }
    if digits == 0 {
        return None;
    }

    if matches!(bytes.get(pos), Some(b'p' | b'P')) {
        let mut exp = pos + 1;
        let exp_negative = bytes.get(exp) == Some(&b'-');
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_digits = bytes[exp..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if exp_digits > 0 {
            let power = bytes[exp..exp + exp_digits].iter().fold(0_i64, |acc, &b| {
                acc.saturating_mul(10).saturating_add(i64::from(b - b'0'))
            });
            scale = scale.saturating_add(if exp_negative { -power } else { power });
            pos = exp + exp_digits;
        }
    }

    let value = mantissa * 2.0_f64.powi(scale.clamp(-4096, 4096) as i32);
    Some((pos, if negative { -value } else { value }))
}

/// Length in bytes of the longest leading float literal: sign, digits with an
/// optional fraction, optional exponent; or a signed `inf`/`infinity`/`nan`.
fn numeric_prefix_len(text: &str) -> usize {
    let bytes = text.as_bytes();
    let mut pos = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));

    let rest = &bytes[pos..];
    for word in ["infinity", "inf", "nan"] {
        if rest
            .get(..word.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(word.as_bytes()))
        {
            return pos + word.len();
        }
    }

    let digits = |from: usize| bytes[from..].iter().take_while(|b| b.is_ascii_digit()).count();

    let int_digits = digits(pos);
    pos += int_digits;
    let mut frac_digits = 0;
    if bytes.get(pos) == Some(&b'.') {
        frac_digits = digits(pos + 1);
        pos += 1 + frac_digits;
    }
    if int_digits + frac_digits == 0 {
        return 0;
    }

    if matches!(bytes.get(pos), Some(b'e' | b'E')) {
        let mut exp = pos + 1;
        if matches!(bytes.get(exp), Some(b'+' | b'-')) {
            exp += 1;
        }
        let exp_digits = digits(exp);
        if exp_digits > 0 {
            pos = exp + exp_digits;
        }
    }
    pos
}

/// Owned aggregation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AggValue {
    Number(f64),
    Count(usize),
    Text(String),
}

impl AggValue {
    #[must_use]
    pub fn as_count(&self) -> Option<usize> {
        match self {
            Self::Count(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_nan(&self) -> bool {
        matches!(self, Self::Number(v) if v.is_nan())
    }

    /// Text form for output columns; a NaN number prints as `null_value`.
    #[must_use]
    pub fn render(&self, null_value: &str) -> String {
        if self.is_nan() {
            return null_value.to_owned();
        }
        self.to_string()
    }
}

impl fmt::Display for AggValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Count(n) => write!(f, "{n}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AggValue, ColumnIndex, NumericParse, Record, TextRecord, TypeError, parse_numeric};

    #[test]
    fn text_record_field_access_is_zero_based() {
        let record = TextRecord::split("chr1\t100\t200\tgeneA", '\t');
        assert_eq!(record.width(), 4);
        assert_eq!(record.field(0), Some("chr1"));
        assert_eq!(record.field(3), Some("geneA"));
        assert_eq!(record.field(4), None);
    }

    #[test]
    fn borrowed_and_array_records_share_the_contract() {
        let owned = vec!["a".to_owned(), "b".to_owned()];
        let borrowed = vec!["a", "b"];
        let array = ["a", "b"];
        let records: [&dyn Record; 3] = [&owned, &borrowed, &array];
        for record in records {
            assert_eq!(record.width(), 2);
            assert_eq!(record.field(1), Some("b"));
            assert_eq!(record.field(2), None);
        }
    }

    #[test]
    fn column_index_one_based_rejects_zero() {
        assert_eq!(ColumnIndex::one_based(0), Err(TypeError::ZeroColumn));
        let col = ColumnIndex::one_based(5).expect("column 5");
        assert_eq!(col.get(), 4);
        assert_eq!(col.number(), 5);
        assert_eq!(col.to_string(), "column 5");
        assert_eq!(ColumnIndex::default(), ColumnIndex::FIRST);
    }

    #[test]
    fn parse_numeric_exact_values() {
        assert_eq!(parse_numeric("3"), NumericParse::Exact(3.0));
        assert_eq!(parse_numeric(" -2.5 "), NumericParse::Exact(-2.5));
        assert_eq!(parse_numeric("1e3"), NumericParse::Exact(1000.0));
        assert_eq!(parse_numeric(".5"), NumericParse::Exact(0.5));
        assert!(matches!(parse_numeric("inf"), NumericParse::Exact(v) if v.is_infinite()));
    }

    #[test]
    fn parse_numeric_prefix_follows_atof() {
        assert_eq!(parse_numeric("12abc"), NumericParse::Prefix(12.0));
        assert_eq!(parse_numeric("  7.25kb"), NumericParse::Prefix(7.25));
        assert_eq!(parse_numeric("3e"), NumericParse::Prefix(3.0));
        assert_eq!(parse_numeric("-4e+x"), NumericParse::Prefix(-4.0));
        assert_eq!(parse_numeric("2.5e2bp"), NumericParse::Prefix(250.0));
    }

    #[test]
    fn parse_numeric_unparsable_falls_back_to_zero() {
        for text in ["", "   ", "abc", ".", "-", "+.", "géne"] {
            let parsed = parse_numeric(text);
            assert_eq!(parsed, NumericParse::Unparsable, "text={text:?}");
            assert_eq!(parsed.lenient_value(), 0.0);
        }
    }

    #[test]
    fn parse_numeric_reads_hex_like_atof() {
        assert_eq!(parse_numeric("0x1A"), NumericParse::Exact(26.0));
        assert_eq!(parse_numeric(" -0X10 "), NumericParse::Exact(-16.0));
        assert_eq!(parse_numeric("0x1.8p3"), NumericParse::Exact(12.0));
        assert_eq!(parse_numeric("0x10p-2"), NumericParse::Exact(4.0));
        assert_eq!(parse_numeric("0x1Agene"), NumericParse::Prefix(26.0));
        assert_eq!(parse_numeric("0xffp"), NumericParse::Prefix(255.0));
        assert_eq!(parse_numeric("0x1A").lenient_value(), 26.0);
    }

    #[test]
    fn bare_hex_marker_reads_as_zero_prefix() {
        assert_eq!(parse_numeric("0x"), NumericParse::Prefix(0.0));
        assert_eq!(parse_numeric("0xg1"), NumericParse::Prefix(0.0));
        assert_eq!(parse_numeric("-0x.p1"), NumericParse::Prefix(-0.0));
    }

    #[test]
    fn column_number_saturates_at_the_top_index() {
        let last = ColumnIndex::zero_based(usize::MAX);
        assert_eq!(last.number(), usize::MAX);
        assert_eq!(last.to_string(), format!("column {}", usize::MAX));
    }

    #[test]
    fn agg_value_render_uses_null_marker_for_nan() {
        assert_eq!(AggValue::Number(f64::NAN).render("."), ".");
        assert_eq!(AggValue::Number(2.0).render("."), "2");
        assert_eq!(AggValue::Number(2.5).render("."), "2.5");
        assert_eq!(AggValue::Count(4).render("."), "4");
        assert_eq!(AggValue::Text("a,b".to_owned()).render("."), "a,b");
    }

    #[test]
    fn agg_value_accessors_match_kind() {
        assert_eq!(AggValue::Count(3).as_count(), Some(3));
        assert_eq!(AggValue::Number(3.0).as_count(), None);
        assert_eq!(AggValue::Text("x".to_owned()).as_text(), Some("x"));
        assert_eq!(AggValue::Count(1).as_text(), None);
        assert!(AggValue::Number(f64::NAN).is_nan());
        assert!(!AggValue::Text("nan".to_owned()).is_nan());
    }
}
