//! Render a [`ConfigDocument`] back to config text.

use super::document::{ConfigDocument, ConfigValue};

/// Escape a string for a double-quoted value.
///
/// Control characters without a short escape become `\uXXXX`; TOML does not
/// allow them raw inside basic strings.
pub fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04X}", u32::from(c))),
            c => out.push(c),
        }
    }
    out
}

/// Render a value as it appears on the right-hand side of `key = value`
pub fn format_value(value: &ConfigValue) -> String {
    match value {
        ConfigValue::String(s) => format!("\"{}\"", escape_string(s)),
        ConfigValue::Bool(b) => b.to_string(),
        ConfigValue::Integer(i) => i.to_string(),
        ConfigValue::Float(f) => format_float(*f),
        ConfigValue::Array(items) => {
            let items: Vec<String> = items.iter().map(format_value).collect();
            format!("[{}]", items.join(", "))
        }
        // Tables are written as sections; inside an array this is the best
        // approximation, and the parser rejects it on the way back in.
        ConfigValue::Table(table) => {
            let items: Vec<String> = table
                .iter()
                .map(|(k, v)| format!("{} = {}", format_key(k), format_value(v)))
                .collect();
            format!("{{ {} }}", items.join(", "))
        }
    }
}

/// Floats always carry a `.` or exponent so they read back as floats
fn format_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{f:.1}")
    } else if f.fract() == 0.0 {
        format!("{f:e}")
    } else {
        f.to_string()
    }
}

/// Bare keys stay bare; anything else is quoted
fn format_key(key: &str) -> String {
    let bare = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if bare {
        key.to_string()
    } else {
        format!("\"{}\"", escape_string(key))
    }
}

/// Serialize a document: root scalars first, then every table depth-first
/// under a `[parent.child]` header.
pub fn serialize_document(doc: &ConfigDocument) -> String {
    let mut out = String::new();
    write_scalars(&mut out, doc);
    let mut path = Vec::new();
    write_tables(&mut out, doc, &mut path);
    out
}

fn write_scalars(out: &mut String, table: &ConfigDocument) {
    for (key, value) in table.scalars() {
        out.push_str(&format_key(key));
        out.push_str(" = ");
        out.push_str(&format_value(value));
        out.push('\n');
    }
}

fn write_tables(out: &mut String, table: &ConfigDocument, path: &mut Vec<String>) {
    for (key, child) in table.tables() {
        path.push(format_key(key));

        if !out.is_empty() {
            out.push('\n');
        }
        out.push('[');
        out.push_str(&path.join("."));
        out.push_str("]\n");

        write_scalars(out, child);
        write_tables(out, child, path);
        path.pop();
    }
}
