//! Output formatting (§6): `--output table|json|yaml`.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn from_str_arg(raw: &str) -> Self {
        match raw {
            "json" => OutputFormat::Json,
            "yaml" => OutputFormat::Yaml,
            _ => OutputFormat::Table,
        }
    }
}

/// Prints a server response body (already-parsed JSON, since the daemon
/// encodes structured replies into `RpcStatus::message` as a JSON string)
/// in the requested format. A plain, non-JSON message is echoed as-is
/// regardless of format.
pub fn print_body(format: OutputFormat, raw_message: &str) {
    let Ok(value) = serde_json::from_str::<Value>(raw_message) else {
        if !raw_message.is_empty() {
            println!("{raw_message}");
        }
        return;
    };

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&value).unwrap_or(raw_message.to_string()));
        }
        OutputFormat::Yaml => match serde_yaml::to_string(&value) {
            Ok(yaml) => print!("{yaml}"),
            Err(_) => println!("{raw_message}"),
        },
        OutputFormat::Table => print_table(&value),
    }
}

/// A hand-rolled column table, matching the plain-text, no-extra-crate
/// rendering the rest of this CLI's `ui` module uses. Renders a JSON array
/// of flat objects as columns, a single object as `key: value` lines, and
/// anything else as its raw text.
fn print_table(value: &Value) {
    match value {
        Value::Array(rows) if rows.iter().all(|r| r.is_object()) && !rows.is_empty() => {
            print_object_rows(rows);
        }
        Value::Array(rows) if rows.is_empty() => {
            println!("(none)");
        }
        Value::Object(map) => {
            let width = map.keys().map(|k| k.len()).max().unwrap_or(0);
            for (key, val) in map {
                println!("{:<width$}  {}", key, scalar_to_string(val), width = width);
            }
        }
        other => println!("{}", scalar_to_string(other)),
    }
}

fn print_object_rows(rows: &[Value]) {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        if let Value::Object(map) = row {
            for key in map.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
    }

    let mut widths: Vec<usize> = columns.iter().map(|c| c.to_uppercase().len()).collect();
    for row in rows {
        if let Value::Object(map) = row {
            for (i, col) in columns.iter().enumerate() {
                let cell = map.get(col).map(scalar_to_string).unwrap_or_default();
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let header: Vec<String> = columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!("{:<width$}", c.to_uppercase(), width = w))
        .collect();
    println!("{}", header.join("  "));

    for row in rows {
        if let Value::Object(map) = row {
            let cells: Vec<String> = columns
                .iter()
                .zip(&widths)
                .map(|(c, w)| {
                    let cell = map.get(c).map(scalar_to_string).unwrap_or_default();
                    format!("{:<width$}", cell, width = w)
                })
                .collect();
            println!("{}", cells.join("  "));
        }
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}
