use std::fs;
use std::path::Path;

use crate::model::ScanResult;

pub fn to_json(results: &[ScanResult]) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(results)?)
}

pub fn write_json(path: &Path, results: &[ScanResult]) -> anyhow::Result<()> {
    fs::write(path, to_json(results)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Finding, Headers, Severity};
    use serde_json::Value;

    #[test]
    fn export_shape() {
        let mut headers = Headers::new();
        headers.insert("x-frame-options".into(), "DENY".into());
        let results = vec![ScanResult {
            url: "https://a.test".into(),
            timestamp: "2026-01-01T00:00:00+00:00".into(),
            headers,
            findings: vec![Finding::new(
                "content-security-policy",
                "Content-Security-Policy header is missing",
                Severity::Critical,
                "Add CSP",
            )],
            score: 0,
        }];

        let v: Value = serde_json::from_str(&to_json(&results).unwrap()).unwrap();
        let first = &v[0];
        assert_eq!(first["url"], "https://a.test");
        assert_eq!(first["score"], 0);
        assert_eq!(first["headers"]["x-frame-options"], "DENY");
        assert_eq!(first["findings"][0]["severity"], "critical");
        assert_eq!(first["findings"][0]["recommended_fix"], "Add CSP");
    }

    #[test]
    fn writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_json(&path, &[]).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "[]");
    }
}
