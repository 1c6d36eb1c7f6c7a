//! Read config text into a [`ConfigDocument`].
//!
//! Lexing is left to `toml_edit`; this module only maps its tree onto the
//! supported subset. The span-preserving [`ImDocument`] is used so rejected
//! constructs can be reported by line.

use std::ops::Range;

use toml_edit::{ImDocument, Item, Table, Value};

use super::document::{ConfigDocument, ConfigValue};
use super::ConfigError;

/// Parse config text into a document.
///
/// Arrays of tables, inline tables, multi-line strings and datetimes are
/// rejected with [`ConfigError::Unsupported`].
pub fn parse_document(text: &str) -> Result<ConfigDocument, ConfigError> {
    let parsed = ImDocument::parse(text).map_err(|source| ConfigError::Parse {
        line: line_at(text, source.span()),
        source,
    })?;
    convert_table(text, parsed.as_table())
}

/// 1-based line of the start of `span`
fn line_at(text: &str, span: Option<Range<usize>>) -> usize {
    span.and_then(|span| text.get(..span.start))
        .map_or(1, |before| before.matches('\n').count() + 1)
}

fn unsupported(text: &str, span: Option<Range<usize>>, construct: &'static str) -> ConfigError {
    ConfigError::Unsupported {
        line: line_at(text, span),
        construct,
    }
}

fn convert_table(text: &str, table: &Table) -> Result<ConfigDocument, ConfigError> {
    let mut doc = ConfigDocument::new();

    for (key, item) in table.iter() {
        let value = match item {
            Item::None => continue,
            Item::Value(value) => convert_value(text, value)?,
            Item::Table(child) => ConfigValue::Table(convert_table(text, child)?),
            Item::ArrayOfTables(array) => {
                let span = item
                    .span()
                    .or_else(|| array.iter().next().and_then(Table::span));
                return Err(unsupported(text, span, "array of tables"));
            }
        };
        doc.insert(key, value);
    }

    Ok(doc)
}

fn convert_value(text: &str, value: &Value) -> Result<ConfigValue, ConfigError> {
    let converted = match value {
        Value::String(s) => {
            let raw = value.span().and_then(|span| text.get(span));
            if raw.is_some_and(|r| r.starts_with("\"\"\"") || r.starts_with("'''")) {
                return Err(unsupported(text, value.span(), "multi-line string"));
            }
            ConfigValue::String(s.value().clone())
        }
        Value::Integer(i) => ConfigValue::Integer(*i.value()),
        Value::Float(f) => ConfigValue::Float(*f.value()),
        Value::Boolean(b) => ConfigValue::Bool(*b.value()),
        Value::Array(items) => ConfigValue::Array(
            items
                .iter()
                .map(|item| convert_value(text, item))
                .collect::<Result<_, _>>()?,
        ),
        Value::InlineTable(_) => return Err(unsupported(text, value.span(), "inline table")),
        Value::Datetime(_) => return Err(unsupported(text, value.span(), "datetime")),
    };
    Ok(converted)
}
