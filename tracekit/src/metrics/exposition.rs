//! Prometheus exposition text encoding.

use std::fmt::Write;

/// Returns `raw` truncated to 100 characters with non-alphanumeric
/// characters replaced by underscores, prefixed if it would otherwise start
/// with a digit or underscore.
pub(crate) fn sanitize<T: AsRef<str>>(raw: T) -> String {
    let mut escaped = raw
        .as_ref()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .peekable();

    let prefix = if escaped.peek().is_some_and(|c| c.is_ascii_digit()) {
        "key_"
    } else if escaped.peek().is_some_and(|&c| c == '_') {
        "key"
    } else {
        ""
    };

    prefix.chars().chain(escaped).take(100).collect()
}

pub(crate) fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

pub(crate) fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

pub(crate) fn format_value(value: f64) -> String {
    if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        format!("{value}")
    }
}

pub(crate) fn write_sample(
    buffer: &mut String,
    name: &str,
    labels: &[(String, String)],
    value: &str,
) {
    buffer.push_str(name);
    if !labels.is_empty() {
        buffer.push('{');
        for (i, (key, val)) in labels.iter().enumerate() {
            if i > 0 {
                buffer.push(',');
            }
            let _ = write!(buffer, "{key}=\"{}\"", escape_label_value(val));
        }
        buffer.push('}');
    }
    let _ = writeln!(buffer, " {value}");
}

pub(crate) fn write_header(buffer: &mut String, name: &str, help: &str, metric_type: &str) {
    if !help.is_empty() {
        let _ = writeln!(buffer, "# HELP {name} {}", escape_help(help));
    }
    let _ = writeln!(buffer, "# TYPE {name} {metric_type}");
}
