use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use csv::Writer;
use serde::Serialize;

/// Per-run metrics logger writing JSON lines and CSV side by side under
/// `runs/<experiment>/`.
pub struct Logger {
    json: File,
    csv: Writer<File>,
}

#[derive(Serialize)]
pub struct MetricRecord {
    pub epoch: usize,
    pub iter: usize,
    pub loss: f32,
    pub kl: f32,
    pub recon: f32,
    pub mi: Option<f32>,
    pub au: Option<usize>,
    pub lr: f32,
    pub kind: &'static str,
}

impl Logger {
    pub fn new(experiment: &str) -> std::io::Result<Self> {
        let dir = PathBuf::from("runs").join(experiment);
        std::fs::create_dir_all(&dir)?;
        let json = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("metrics.jsonl"))?;
        let csv_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("metrics.csv"))?;
        let csv = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(csv_file);
        Ok(Logger { json, csv })
    }

    pub fn log(&mut self, record: &MetricRecord) {
        if let Ok(line) = serde_json::to_string(record) {
            let _ = writeln!(self.json, "{}", line);
        }
        let _ = self.csv.serialize(record);
    }
}
