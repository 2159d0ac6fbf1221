use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use rpcprims_message::Encoding;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct CallOutput<'a> {
    method: &'a str,
    id: i64,
    encoding: String,
    result: &'a Value,
    timestamp: String,
}

/// A completed call, as printed by `rpcprims call`.
pub struct CallReport<'a> {
    pub method: &'a str,
    pub id: i64,
    pub encoding: Encoding,
    pub result: &'a Value,
}

pub fn print_result(report: &CallReport<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = CallOutput {
                method: report.method,
                id: report.id,
                encoding: report.encoding.to_string(),
                result: report.result,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["METHOD", "ID", "ENCODING", "RESULT"])
                .add_row(vec![
                    report.method.to_string(),
                    report.id.to_string(),
                    report.encoding.to_string(),
                    result_preview(report.result),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "method={} id={} encoding={}",
                report.method, report.id, report.encoding
            );
            println!(
                "{}",
                serde_json::to_string_pretty(report.result).unwrap_or_default()
            );
        }
        OutputFormat::Raw => {
            print_raw(result_preview(report.result).as_bytes());
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.write_all(b"\n");
    let _ = out.flush();
}

/// Strings print bare; everything else as compact JSON.
fn result_preview(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn preview_unquotes_strings_only() {
        assert_eq!(result_preview(&json!("pong")), "pong");
        assert_eq!(result_preview(&json!({"ok": true})), r#"{"ok":true}"#);
        assert_eq!(result_preview(&Value::Null), "null");
    }
}
