//! Printers: colored text report and JSON.

use owo_colors::OwoColorize;
use serde::Serialize;

use crate::{
    execution::{Bindings, RunReport},
    probe::TelemetrySample,
    scan::ScanResultSet,
};

pub struct TextPrinter {
    pub color: bool,
}

impl TextPrinter {
    pub fn print_run(&self, report: &RunReport) {
        println!("{}", self.paint_header(&format!("== {}", report.label)));
        for s in &report.telemetry {
            println!(
                "  Free heap: {}, Min free heap: {}, Largest free block: {}, {}",
                s.free_bytes, s.min_free_bytes_ever, s.largest_free_block_bytes, s.phase_label
            );
        }
        if let Some(err) = &report.search_path_error {
            println!("  {}", self.paint("yellow", &format!("search path not extended: {}", err)));
        }
        match &report.outcome {
            Ok(Some(value)) => println!("  {} {}", self.paint("green", "ok:"), value),
            Ok(None) => println!("  {}", self.paint("green", "ok")),
            Err(err) => println!("  {} [{}] {}", self.paint("red", "error:"), err.kind(), err),
        }
        for (name, value) in report.bindings.iter() {
            println!("  {} = {:?}", name, value);
        }
    }

    pub fn print_scan(&self, set: &ScanResultSet) {
        println!(
            "{}",
            self.paint_header(&format!(
                "== scan: {} of {} access points (capacity {})",
                set.records.len(),
                set.discovered,
                set.capacity
            ))
        );
        for ap in &set.records {
            println!("  SSID: {}, RSSI: {}", display_ssid(&ap.ssid), ap.rssi);
        }
    }

    pub fn print_error(&self, text: &str) {
        eprintln!("{}", self.paint("red", text));
    }

    fn paint_header(&self, text: &str) -> String {
        self.paint("cyan", text)
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        match color {
            "green" => format!("{}", text.green()),
            "cyan" => format!("{}", text.cyan()),
            "red" => format!("{}", text.red()),
            "yellow" => format!("{}", text.yellow()),
            _ => text.to_string(),
        }
    }
}

fn no_bindings(b: &&Bindings) -> bool {
    b.is_empty()
}

fn display_ssid(ssid: &str) -> &str {
    if ssid.is_empty() {
        "<hidden>"
    } else {
        ssid
    }
}

#[derive(Serialize)]
pub struct JsonRun<'a> {
    pub label: &'a str,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub telemetry: &'a [TelemetrySample],
    #[serde(skip_serializing_if = "no_bindings")]
    pub bindings: &'a Bindings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_path: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_path_error: Option<&'a str>,
}

impl<'a> From<&'a RunReport> for JsonRun<'a> {
    fn from(r: &'a RunReport) -> Self {
        let (result, error_kind, error) = match &r.outcome {
            Ok(value) => (value.as_deref(), None, None),
            Err(err) => (None, Some(err.kind()), Some(err.to_string())),
        };
        Self {
            label: &r.label,
            ok: r.outcome.is_ok(),
            result,
            error_kind,
            error,
            telemetry: &r.telemetry,
            bindings: &r.bindings,
            search_path: r.search_path.as_deref(),
            search_path_error: r.search_path_error.as_deref(),
        }
    }
}

#[derive(Serialize)]
pub struct JsonDocument<'a> {
    pub runs: Vec<JsonRun<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan: Option<&'a ScanResultSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_error: Option<String>,
}

pub fn to_json(doc: &JsonDocument<'_>) -> String {
    serde_json::to_string_pretty(doc).unwrap_or_else(|err| format!("{{\"error\":\"{}\"}}", err))
}
