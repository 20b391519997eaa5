use std::fmt::Write as _;
use std::time::Duration;

use crate::concurrent::{BatchReport, SkipReason};
use crate::model::{ScanResult, Severity};

const SEVERITIES: [Severity; 3] = [Severity::Critical, Severity::Warning, Severity::Info];

pub fn score_color(score: u8) -> &'static str {
    if score >= 80 {
        "\x1b[1;92m" // Green
    } else if score >= 60 {
        "\x1b[1;93m" // Yellow
    } else {
        "\x1b[1;91m" // Red
    }
}

fn paint(text: &str, code: &str, color: bool) -> String {
    if color {
        format!("{}{}{}", code, text, Severity::reset_color())
    } else {
        text.to_string()
    }
}

/// Critical, warning and info counts.
pub fn severity_counts(result: &ScanResult) -> [usize; 3] {
    let mut counts = [0; 3];
    for f in &result.findings {
        match f.severity {
            Severity::Critical => counts[0] += 1,
            Severity::Warning => counts[1] += 1,
            Severity::Info => counts[2] += 1,
        }
    }
    counts
}

/// Compact block: url and score, then findings grouped by severity.
pub fn format_result(result: &ScanResult, color: bool) -> String {
    let mut out = String::new();
    let score = paint(&format!("{}/100", result.score), score_color(result.score), color);
    let _ = writeln!(out, "\n{}  {}", result.url, score);

    if result.findings.is_empty() {
        let _ = writeln!(out, "   [OK] No issues found");
        return out;
    }
    for severity in SEVERITIES {
        for f in result.findings.iter().filter(|f| f.severity == severity) {
            let tag = paint(&format!("[{}]", severity.label()), severity.color_code(), color);
            let _ = writeln!(out, "   {} {}: {}", tag, f.header, f.issue);
        }
    }
    out
}

/// Full audit view with headers and recommended fixes.
pub fn format_detailed(result: &ScanResult, color: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", "=".repeat(60));
    let _ = writeln!(out, "Security Header Audit: {}", result.url);
    let _ = writeln!(out, "Scanned at: {}", result.timestamp);
    let _ = writeln!(out, "{}", "=".repeat(60));
    let _ = writeln!(
        out,
        "\nScore: {}",
        paint(&format!("{}/100", result.score), score_color(result.score), color)
    );

    let [critical, warning, info] = severity_counts(result);
    let _ = writeln!(out, "Findings: {} critical, {} warning, {} info", critical, warning, info);

    let _ = writeln!(out, "\nResponse headers:");
    if result.headers.is_empty() {
        let _ = writeln!(out, "   (none)");
    }
    for (name, value) in &result.headers {
        let _ = writeln!(out, "   {}: {}", name, value);
    }

    for severity in SEVERITIES {
        let group: Vec<_> = result.findings.iter().filter(|f| f.severity == severity).collect();
        if group.is_empty() {
            continue;
        }
        let title = paint(&format!("{} FINDINGS", severity.label()), severity.color_code(), color);
        let _ = writeln!(out, "\n{}", title);
        let _ = writeln!(out, "{}", "-".repeat(60));
        for (i, f) in group.iter().enumerate() {
            let _ = writeln!(out, "{}. {}: {}", i + 1, f.header, f.issue);
            if let Some(fix) = &f.recommended_fix {
                let _ = writeln!(out, "   Fix: {}", fix);
            }
        }
    }
    out
}

/// End-of-run totals, average score and skip reasons.
pub fn format_summary(report: &BatchReport, elapsed: Duration) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n{}", "=".repeat(60));
    let _ = writeln!(out, "              SCAN COMPLETE");
    let _ = writeln!(out, "{}", "=".repeat(60));

    let scanned = report.results.len();
    let _ = writeln!(out, "\n[*] Summary:");
    let _ = writeln!(out, "   Scanned: {}", scanned);
    let _ = writeln!(out, "   Skipped: {}", report.skipped.len());
    let _ = writeln!(out, "   Duration: {:.2}s", elapsed.as_secs_f64());

    if scanned > 0 {
        let total: u64 = report.results.iter().map(|r| r.score as u64).sum();
        let _ = writeln!(out, "   Average score: {:.1}", total as f64 / scanned as f64);
        let critical = report.results.iter().filter(|r| r.has_critical()).count();
        let _ = writeln!(out, "   Targets with critical findings: {}", critical);
    }

    if !report.skipped.is_empty() {
        let _ = writeln!(out, "\n[!] Skipped targets:");
        for s in &report.skipped {
            let reason = match &s.reason {
                SkipReason::CircuitOpen => format!("circuit open for {}", s.domain),
                SkipReason::Failed(msg) => msg.clone(),
            };
            let _ = writeln!(out, "   {} ({})", s.url, reason);
        }
    }
    out
}

pub fn print_result(result: &ScanResult) {
    print!("{}", format_result(result, true));
}

pub fn print_detailed(result: &ScanResult) {
    print!("{}", format_detailed(result, true));
}

pub fn print_summary(report: &BatchReport, elapsed: Duration) {
    println!("{}", format_summary(report, elapsed));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrent::SkippedTarget;
    use crate::model::{Finding, Headers};

    fn sample(score: u8, findings: Vec<Finding>) -> ScanResult {
        ScanResult {
            url: "https://a.test".into(),
            timestamp: "2026-01-01T00:00:00+00:00".into(),
            headers: Headers::new(),
            findings,
            score,
        }
    }

    #[test]
    fn score_bands() {
        assert_eq!(score_color(80), score_color(100));
        assert_eq!(score_color(60), score_color(79));
        assert_ne!(score_color(59), score_color(60));
        assert_ne!(score_color(79), score_color(80));
    }

    #[test]
    fn compact_block_orders_by_severity() {
        let r = sample(
            55,
            vec![
                Finding::new("referrer-policy", "missing", Severity::Info, "add"),
                Finding::new("content-security-policy", "missing", Severity::Critical, "add"),
            ],
        );
        let text = format_result(&r, false);
        let crit = text.find("[CRITICAL] content-security-policy").unwrap();
        let info = text.find("[INFO] referrer-policy").unwrap();
        assert!(crit < info);
        assert!(text.contains("55/100"));
        assert!(!text.contains('\x1b'));
    }

    #[test]
    fn clean_result() {
        assert!(format_result(&sample(100, Vec::new()), false).contains("No issues found"));
    }

    #[test]
    fn detailed_view_lists_fixes() {
        let r = sample(90, vec![Finding::new("x-frame-options", "missing", Severity::Warning, "Add DENY")]);
        let text = format_detailed(&r, false);
        assert!(text.contains("Findings: 0 critical, 1 warning, 0 info"));
        assert!(text.contains("Fix: Add DENY"));
    }

    #[test]
    fn summary_reports_skip_reasons() {
        let report = BatchReport {
            results: vec![sample(80, Vec::new()), sample(40, Vec::new())],
            skipped: vec![SkippedTarget {
                url: "https://down.test/".into(),
                domain: "down.test".into(),
                reason: SkipReason::CircuitOpen,
            }],
        };
        let text = format_summary(&report, Duration::from_millis(1500));
        assert!(text.contains("Scanned: 2"));
        assert!(text.contains("Skipped: 1"));
        assert!(text.contains("Average score: 60.0"));
        assert!(text.contains("https://down.test/ (circuit open for down.test)"));
    }
}
