//! Message encoding: rendering typed records into fixed-width or delimited text
//!
//! A [`FormatSpec`] declaratively describes one message layout as an ordered
//! list of [`FieldSpec`]s. [`encode`] renders a [`SourceRecord`] into a single
//! text line per that layout. Encoding is a pure function of the record and
//! the spec — no side effects, fully deterministic — which is what makes this
//! module trivially testable.
//!
//! # Rendering rules
//!
//! - Fields are emitted in `position` order (stable sort, declaration order
//!   breaks ties).
//! - A `Custom` field emits its literal; a `Named` field looks the value up
//!   in the record. A missing key renders as spaces for the field's full
//!   width (empty string without a width) — never an error.
//! - `decimal_places` coerces the value to a number and formats it with
//!   exactly that many fractional digits; a value that fails to parse falls
//!   back to its literal text. The `.` is then swapped for the configured
//!   decimal separator.
//! - A `prefix` is prepended before padding/truncation.
//! - Numeric fields are right-aligned (left-padded with spaces), text fields
//!   left-aligned; values longer than the width are truncated from the right.
//!   A field counts as numeric if `decimal_places` is set or the value is of
//!   a numeric type.

use crate::error::EncodeError;
use crate::types::{FieldValue, SourceRecord};
use serde::{Deserialize, Serialize};

/// How a field obtains its value
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKey {
    /// Look the value up by this name in the source record
    Named(String),
    /// Emit this literal verbatim (still subject to prefix/width rules)
    Custom(String),
}

/// Declarative description of one field in a message layout
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Value source for this field
    pub key: FieldKey,

    /// Fixed character width; pad or truncate the rendered value to exactly
    /// this many characters. `None` leaves the value unpadded.
    #[serde(default)]
    pub width: Option<usize>,

    /// Render the value as a number with exactly this many fractional digits
    #[serde(default)]
    pub decimal_places: Option<u32>,

    /// Literal prepended to the rendered value before padding/truncation
    #[serde(default)]
    pub prefix: Option<String>,

    /// Ordering key; lower positions are emitted first
    #[serde(default)]
    pub position: i32,
}

impl FieldSpec {
    /// A named field with no width, decimals, or prefix
    #[must_use]
    pub fn named(name: impl Into<String>, position: i32) -> Self {
        Self {
            key: FieldKey::Named(name.into()),
            width: None,
            decimal_places: None,
            prefix: None,
            position,
        }
    }

    /// A custom literal field with no width, decimals, or prefix
    #[must_use]
    pub fn custom(literal: impl Into<String>, position: i32) -> Self {
        Self {
            key: FieldKey::Custom(literal.into()),
            width: None,
            decimal_places: None,
            prefix: None,
            position,
        }
    }
}

/// Declarative description of one message's layout
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FormatSpec {
    /// Separator between fields; empty selects fixed-width mode
    /// (fields concatenated with no separator)
    #[serde(default)]
    pub field_delimiter: String,

    /// Literal emitted before the first field
    #[serde(default)]
    pub message_start: Option<String>,

    /// Literal emitted after the last field
    #[serde(default)]
    pub message_end: Option<String>,

    /// Decimal separator substituted for `.` in numeric renderings
    #[serde(default = "default_decimal_separator")]
    pub decimal_separator: String,

    /// Field layout, ordered by `position`
    pub fields: Vec<FieldSpec>,
}

impl Default for FormatSpec {
    fn default() -> Self {
        Self {
            field_delimiter: String::new(),
            message_start: None,
            message_end: None,
            decimal_separator: default_decimal_separator(),
            fields: Vec::new(),
        }
    }
}

fn default_decimal_separator() -> String {
    ".".to_string()
}

/// Render a record into a single message line per the given layout
///
/// # Errors
///
/// Returns [`EncodeError::Unrenderable`] only when a value has no text form
/// at all (a non-finite number under decimal formatting). This is a
/// configuration error class, not a condition callers should retry.
pub fn encode(record: &SourceRecord, spec: &FormatSpec) -> Result<String, EncodeError> {
    // Stable sort preserves declaration order for equal positions
    let mut ordered: Vec<&FieldSpec> = spec.fields.iter().collect();
    ordered.sort_by_key(|f| f.position);

    let mut rendered = Vec::with_capacity(ordered.len());
    for field in ordered {
        rendered.push(encode_field(record, field, spec)?);
    }

    let body = if spec.field_delimiter.is_empty() {
        rendered.concat()
    } else {
        rendered.join(&spec.field_delimiter)
    };

    let mut message = String::new();
    if let Some(start) = &spec.message_start {
        message.push_str(start);
    }
    message.push_str(&body);
    if let Some(end) = &spec.message_end {
        message.push_str(end);
    }
    Ok(message)
}

/// Render one field to its final (padded/truncated) form
fn encode_field(
    record: &SourceRecord,
    field: &FieldSpec,
    spec: &FormatSpec,
) -> Result<String, EncodeError> {
    let value = match &field.key {
        FieldKey::Custom(literal) => Some(FieldValue::Text(literal.clone())),
        FieldKey::Named(name) => record.field(name).cloned(),
    };

    // Missing key renders as the field's full width of spaces (or nothing)
    let Some(value) = value else {
        return Ok(" ".repeat(field.width.unwrap_or(0)));
    };

    let numeric = field.decimal_places.is_some() || value.is_numeric();
    let mut text = render_value(&value, field, spec)?;

    if let Some(prefix) = &field.prefix {
        text.insert_str(0, prefix);
    }

    if let Some(width) = field.width {
        text = fit_to_width(&text, width, numeric);
    }
    Ok(text)
}

/// Render the raw value, applying decimal formatting where requested
fn render_value(
    value: &FieldValue,
    field: &FieldSpec,
    spec: &FormatSpec,
) -> Result<String, EncodeError> {
    let Some(places) = field.decimal_places else {
        return Ok(value.as_text());
    };

    match value.as_f64() {
        Some(number) if number.is_finite() => {
            let mut text = format!("{:.*}", places as usize, number);
            if spec.decimal_separator != "." {
                text = text.replace('.', &spec.decimal_separator);
            }
            Ok(text)
        }
        Some(number) => Err(EncodeError::Unrenderable {
            key: describe_key(&field.key),
            reason: format!("non-finite number {number} cannot be rendered with fixed decimals"),
        }),
        // Non-numeric input under decimal formatting falls back to its
        // literal text rather than failing the whole encode
        None => Ok(value.as_text()),
    }
}

/// Pad or truncate to exactly `width` characters
///
/// Numeric fields are left-padded (right-aligned), text fields right-padded
/// (left-aligned). Overlong values are truncated from the right.
fn fit_to_width(text: &str, width: usize, numeric: bool) -> String {
    let len = text.chars().count();
    if len > width {
        return text.chars().take(width).collect();
    }
    let padding = " ".repeat(width - len);
    if numeric {
        format!("{padding}{text}")
    } else {
        format!("{text}{padding}")
    }
}

fn describe_key(key: &FieldKey) -> String {
    match key {
        FieldKey::Named(name) => name.clone(),
        FieldKey::Custom(literal) => format!("custom:{literal}"),
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn record(fields: Vec<(&str, FieldValue)>) -> SourceRecord {
        SourceRecord {
            record_id: "r1".into(),
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    fn field(name: &str, width: Option<usize>, decimals: Option<u32>, position: i32) -> FieldSpec {
        FieldSpec {
            key: FieldKey::Named(name.into()),
            width,
            decimal_places: decimals,
            prefix: None,
            position,
        }
    }

    #[test]
    fn fixed_width_numeric_and_text_alignment() {
        // 10-char right-aligned numeric followed by 12-char left-aligned text
        let spec = FormatSpec {
            fields: vec![
                field("Weight_Ratio", Some(10), Some(2), 0),
                field("Barcode", Some(12), None, 1),
            ],
            ..Default::default()
        };
        let rec = record(vec![
            ("Weight_Ratio", FieldValue::Float(-1.2)),
            ("Barcode", FieldValue::Text("ABC".into())),
        ]);

        let line = encode(&rec, &spec).unwrap();
        assert_eq!(line, "     -1.20ABC         ");
        assert_eq!(line.chars().count(), 22);
    }

    #[test]
    fn every_value_kind_respects_width() {
        let values = vec![
            FieldValue::Text("hello".into()),
            FieldValue::Integer(-42),
            FieldValue::Float(3.14159),
            FieldValue::Bool(true),
            FieldValue::Null,
        ];
        for value in values {
            let spec = FormatSpec {
                fields: vec![field("v", Some(8), None, 0)],
                ..Default::default()
            };
            let rec = record(vec![("v", value.clone())]);
            let line = encode(&rec, &spec).unwrap();
            assert_eq!(
                line.chars().count(),
                8,
                "width invariant violated for {value:?}: {line:?}"
            );
        }
    }

    #[test]
    fn overlong_value_truncated_from_the_right() {
        let spec = FormatSpec {
            fields: vec![field("v", Some(4), None, 0)],
            ..Default::default()
        };
        let rec = record(vec![("v", FieldValue::Text("ABCDEFGH".into()))]);
        assert_eq!(encode(&rec, &spec).unwrap(), "ABCD");
    }

    #[test]
    fn missing_key_renders_as_spaces_not_error() {
        let spec = FormatSpec {
            fields: vec![field("absent", Some(6), None, 0)],
            ..Default::default()
        };
        let rec = record(vec![]);
        assert_eq!(encode(&rec, &spec).unwrap(), "      ");

        // Without a width, a missing key renders as nothing
        let spec = FormatSpec {
            fields: vec![field("absent", None, None, 0)],
            ..Default::default()
        };
        assert_eq!(encode(&rec, &spec).unwrap(), "");
    }

    #[test]
    fn decimal_separator_substitution() {
        let spec = FormatSpec {
            decimal_separator: ",".into(),
            fields: vec![field("amount", None, Some(2), 0)],
            ..Default::default()
        };
        let rec = record(vec![("amount", FieldValue::Float(12.34))]);
        let line = encode(&rec, &spec).unwrap();
        assert_eq!(line, "12,34");
        assert!(!line.contains('.'));
    }

    #[test]
    fn decimal_formatting_pads_and_rounds_fractional_digits() {
        let spec = FormatSpec {
            fields: vec![field("amount", None, Some(3), 0)],
            ..Default::default()
        };
        let rec = record(vec![("amount", FieldValue::Integer(5))]);
        assert_eq!(encode(&rec, &spec).unwrap(), "5.000");

        let rec = record(vec![("amount", FieldValue::Float(1.23456))]);
        assert_eq!(encode(&rec, &spec).unwrap(), "1.235");
    }

    #[test]
    fn decimal_coercion_parses_text_input() {
        let spec = FormatSpec {
            fields: vec![field("amount", None, Some(2), 0)],
            ..Default::default()
        };
        let rec = record(vec![("amount", FieldValue::Text("7.5".into()))]);
        assert_eq!(encode(&rec, &spec).unwrap(), "7.50");
    }

    #[test]
    fn unparseable_text_under_decimals_falls_back_to_literal() {
        let spec = FormatSpec {
            fields: vec![field("amount", None, Some(2), 0)],
            ..Default::default()
        };
        let rec = record(vec![("amount", FieldValue::Text("N/A".into()))]);
        assert_eq!(encode(&rec, &spec).unwrap(), "N/A");
    }

    #[test]
    fn decimal_places_forces_numeric_alignment_even_after_fallback() {
        let spec = FormatSpec {
            fields: vec![field("amount", Some(6), Some(2), 0)],
            ..Default::default()
        };
        let rec = record(vec![("amount", FieldValue::Text("N/A".into()))]);
        // decimal_places set, so the field is numeric and right-aligned
        assert_eq!(encode(&rec, &spec).unwrap(), "   N/A");
    }

    #[test]
    fn prefix_applied_before_padding_and_truncation() {
        let mut spec_field = field("code", Some(6), None, 0);
        spec_field.prefix = Some("ID".into());
        let spec = FormatSpec {
            fields: vec![spec_field],
            ..Default::default()
        };
        let rec = record(vec![("code", FieldValue::Text("7".into()))]);
        assert_eq!(encode(&rec, &spec).unwrap(), "ID7   ");

        // Prefix plus value longer than the width truncates from the right
        let mut spec_field = field("code", Some(3), None, 0);
        spec_field.prefix = Some("ID".into());
        let spec = FormatSpec {
            fields: vec![spec_field],
            ..Default::default()
        };
        let rec = record(vec![("code", FieldValue::Text("12345".into()))]);
        assert_eq!(encode(&rec, &spec).unwrap(), "ID1");
    }

    #[test]
    fn custom_field_emits_literal_with_width_rules() {
        let spec = FormatSpec {
            fields: vec![FieldSpec {
                key: FieldKey::Custom("HDR".into()),
                width: Some(5),
                decimal_places: None,
                prefix: None,
                position: 0,
            }],
            ..Default::default()
        };
        let rec = record(vec![]);
        assert_eq!(encode(&rec, &spec).unwrap(), "HDR  ");
    }

    #[test]
    fn fields_ordered_by_position_with_stable_ties() {
        let spec = FormatSpec {
            field_delimiter: "|".into(),
            fields: vec![
                FieldSpec::custom("c", 5),
                FieldSpec::custom("a", 1),
                FieldSpec::custom("b1", 3),
                FieldSpec::custom("b2", 3),
            ],
            ..Default::default()
        };
        let rec = record(vec![]);
        assert_eq!(encode(&rec, &spec).unwrap(), "a|b1|b2|c");
    }

    #[test]
    fn delimited_mode_joins_with_separator() {
        let spec = FormatSpec {
            field_delimiter: ";".into(),
            fields: vec![field("a", None, None, 0), field("b", None, None, 1)],
            ..Default::default()
        };
        let rec = record(vec![
            ("a", FieldValue::Integer(1)),
            ("b", FieldValue::Text("two".into())),
        ]);
        assert_eq!(encode(&rec, &spec).unwrap(), "1;two");
    }

    #[test]
    fn message_start_and_end_wrap_the_body() {
        let spec = FormatSpec {
            message_start: Some("STX".into()),
            message_end: Some("ETX".into()),
            fields: vec![field("a", None, None, 0)],
            ..Default::default()
        };
        let rec = record(vec![("a", FieldValue::Text("body".into()))]);
        assert_eq!(encode(&rec, &spec).unwrap(), "STXbodyETX");
    }

    #[test]
    fn non_finite_number_is_unrenderable() {
        let spec = FormatSpec {
            fields: vec![field("amount", None, Some(2), 0)],
            ..Default::default()
        };
        let rec = record(vec![("amount", FieldValue::Float(f64::NAN))]);
        let err = encode(&rec, &spec).unwrap_err();
        assert!(err.to_string().contains("amount"));
    }

    #[test]
    fn encoding_is_deterministic() {
        let spec = FormatSpec {
            fields: vec![
                field("Weight_Ratio", Some(10), Some(2), 0),
                field("Barcode", Some(12), None, 1),
            ],
            ..Default::default()
        };
        let rec = record(vec![
            ("Weight_Ratio", FieldValue::Float(-1.2)),
            ("Barcode", FieldValue::Text("ABC".into())),
        ]);
        let first = encode(&rec, &spec).unwrap();
        let second = encode(&rec, &spec).unwrap();
        assert_eq!(first, second);
    }
}
