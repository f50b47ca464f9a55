//! printf-style message formatting for log arguments.
//!
//! The first argument is treated as a template when it is a string. Supported
//! directives: `%s` `%d` `%i` `%f` `%j` `%o` `%O` `%c` and `%%`. Directives
//! without a matching argument are left untouched and surplus arguments are
//! appended, separated by single spaces. Non-string values render as compact
//! JSON.

use serde_json::Value;

/// Format a sequence of log arguments into a single message.
pub fn format_message(args: &[Value]) -> String {
    let Some((first, rest)) = args.split_first() else {
        return String::new();
    };

    let (mut out, consumed) = match first {
        Value::String(template) if !rest.is_empty() => apply_template(template, rest),
        Value::String(template) => return template.clone(),
        other => (display(other), 0),
    };

    for arg in &rest[consumed..] {
        out.push(' ');
        out.push_str(&display(arg));
    }
    out
}

/// Substitute directives in `template`, returning the result and the number
/// of arguments consumed.
fn apply_template(template: &str, args: &[Value]) -> (String, usize) {
    let mut out = String::with_capacity(template.len());
    let mut next = 0;
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let Some(&directive) = chars.peek() else {
            out.push('%');
            break;
        };
        if directive == '%' {
            chars.next();
            out.push('%');
            continue;
        }
        let Some(arg) = args.get(next) else {
            out.push('%');
            continue;
        };
        let rendered = match directive {
            's' => display(arg),
            'd' => format_number(to_number(arg)),
            'i' => format_number(to_integer(arg)),
            'f' => format_number(to_float(arg)),
            'j' | 'o' | 'O' => arg.to_string(),
            'c' => String::new(),
            _ => {
                out.push('%');
                continue;
            }
        };
        chars.next();
        next += 1;
        out.push_str(&rendered);
    }

    (out, next)
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn to_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Null => 0.0,
        Value::String(s) if s.trim().is_empty() => 0.0,
        Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

fn to_integer(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().map(f64::trunc).unwrap_or(f64::NAN),
        Value::String(s) => leading_number(s, false).trunc(),
        _ => f64::NAN,
    }
}

fn to_float(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => leading_number(s, true),
        _ => f64::NAN,
    }
}

/// Parse the longest numeric prefix of `s`, ignoring leading whitespace.
fn leading_number(s: &str, allow_fraction: bool) -> f64 {
    let s = s.trim_start();
    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in s.char_indices() {
        let ok = c.is_ascii_digit()
            || (i == 0 && (c == '-' || c == '+'))
            || (allow_fraction && c == '.' && !seen_dot);
        if !ok {
            break;
        }
        seen_dot |= c == '.';
        end = i + c.len_utf8();
    }
    s[..end].parse().unwrap_or(f64::NAN)
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{:.0}", n)
    } else {
        n.to_string()
    }
}
