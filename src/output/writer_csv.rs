use std::fs::File;
use std::io::Write;
use std::path::Path;

use csv::Writer;

use crate::model::ScanResult;

pub const CSV_COLUMNS: [&str; 7] = ["url", "timestamp", "score", "header", "issue", "severity", "fix"];

/// One row per finding; a clean result gets a single "No issues" row.
pub fn write_csv_to<W: Write>(out: W, results: &[ScanResult]) -> anyhow::Result<()> {
    let mut w = Writer::from_writer(out);
    w.write_record(CSV_COLUMNS)?;
    for r in results {
        let score = r.score.to_string();
        if r.findings.is_empty() {
            w.write_record([r.url.as_str(), r.timestamp.as_str(), score.as_str(), "", "No issues", "", ""])?;
            continue;
        }
        for f in &r.findings {
            let severity = f.severity.to_string();
            w.write_record([
                r.url.as_str(),
                r.timestamp.as_str(),
                score.as_str(),
                f.header.as_str(),
                f.issue.as_str(),
                severity.as_str(),
                f.recommended_fix.as_deref().unwrap_or(""),
            ])?;
        }
    }
    w.flush()?;
    Ok(())
}

pub fn write_csv(path: &Path, results: &[ScanResult]) -> anyhow::Result<()> {
    let f = File::create(path)?;
    write_csv_to(f, results)
}
