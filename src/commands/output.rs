//! Shared terminal output for one-shot commands.

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

/// Compact human-readable logs on stderr, so stdout stays clean for `--format json`.
pub fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}

pub fn is_json(format: &str) -> bool {
    format == "json"
}

pub fn print_output<T: Serialize>(format: &str, data: &T) -> Result<()> {
    match format {
        "json" => {
            let json = serde_json::to_string_pretty(data)?;
            println!("{}", json);
        }
        _ => {
            // Table format: recursive key-value from serde_json::Value
            let value = serde_json::to_value(data)?;
            print_value(&value, 0);
        }
    }
    Ok(())
}

fn print_value(value: &Value, indent: usize) {
    let pad = "  ".repeat(indent);
    match value {
        Value::Object(map) => {
            for (key, val) in map {
                match val {
                    Value::Object(_) => {
                        println!("{}{}:", pad, key);
                        print_value(val, indent + 1);
                    }
                    Value::Array(arr) if arr.is_empty() => println!("{}{}: []", pad, key),
                    Value::Array(arr) if arr.iter().all(|v| !v.is_object() && !v.is_array()) => {
                        let items: Vec<String> = arr.iter().map(format_scalar).collect();
                        println!("{}{}: {}", pad, key, items.join(", "));
                    }
                    Value::Array(_) => {
                        println!("{}{}:", pad, key);
                        print_value(val, indent + 1);
                    }
                    _ => println!("{}{}: {}", pad, key, format_scalar(val)),
                }
            }
        }
        Value::Array(arr) => {
            for (i, item) in arr.iter().enumerate() {
                if item.is_object() {
                    println!("{}[{}]:", pad, i);
                    print_value(item, indent + 1);
                } else {
                    println!("{}- {}", pad, format_scalar(item));
                }
            }
        }
        _ => println!("{}{}", pad, format_scalar(value)),
    }
}

fn format_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

/// Pad to `width` display columns, truncating with an ellipsis.
pub fn cell(text: &str, width: usize) -> String {
    let count = text.chars().count();
    if count <= width {
        format!("{:<width$}", text, width = width)
    } else {
        let cut: String = text.chars().take(width.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("db", 4, "db  " ; "pads short text")]
    #[test_case("exact", 5, "exact" ; "keeps exact width")]
    #[test_case("backup-server", 6, "backu…" ; "truncates long text")]
    fn cell_fits_width(text: &str, width: usize, expected: &str) {
        assert_eq!(cell(text, width), expected);
    }

    #[test]
    fn scalars_render_without_quotes() {
        assert_eq!(format_scalar(&Value::String("up".into())), "up");
        assert_eq!(format_scalar(&Value::Null), "-");
        assert_eq!(format_scalar(&serde_json::json!(3)), "3");
    }
}
