use crate::model::{Finding, Headers, Severity};

/// Scored headers and the points their presence is worth. Sums to 100.
pub const HEADER_WEIGHTS: [(&str, u32); 9] = [
    ("content-security-policy", 25),
    ("strict-transport-security", 25),
    ("x-frame-options", 15),
    ("x-content-type-options", 10),
    ("referrer-policy", 10),
    ("permissions-policy", 5),
    ("cross-origin-opener-policy", 5),
    ("cross-origin-embedder-policy", 3),
    ("cross-origin-resource-policy", 2),
];

pub fn severity_penalty(severity: Severity) -> u32 {
    match severity {
        Severity::Critical => 20,
        Severity::Warning => 10,
        Severity::Info => 5,
    }
}

/// Presence-based points; a header counts even if its value is wrong.
pub fn base_score(headers: &Headers) -> u32 {
    HEADER_WEIGHTS
        .iter()
        .filter(|(name, _)| headers.contains_key(*name))
        .map(|(_, weight)| weight)
        .sum()
}

pub fn total_penalty(findings: &[Finding]) -> u32 {
    findings.iter().map(|f| severity_penalty(f.severity)).sum()
}

/// Final score in `0..=100`.
pub fn score_headers(headers: &Headers, findings: &[Finding]) -> u8 {
    let score = base_score(headers).saturating_sub(total_penalty(findings));
    score.min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(severity: Severity) -> Finding {
        Finding::new("x", "issue", severity, "fix")
    }

    fn headers(names: &[&str]) -> Headers {
        names.iter().map(|n| (n.to_string(), "v".to_string())).collect()
    }

    #[test]
    fn empty_headers_score_zero() {
        assert_eq!(score_headers(&Headers::new(), &[]), 0);
    }

    #[test]
    fn all_scored_headers_score_hundred() {
        let names: Vec<&str> = HEADER_WEIGHTS.iter().map(|(n, _)| *n).collect();
        assert_eq!(score_headers(&headers(&names), &[]), 100);
    }

    #[test]
    fn penalties_clamp_at_zero() {
        let f = vec![finding(Severity::Critical), finding(Severity::Critical)];
        assert_eq!(score_headers(&Headers::new(), &f), 0);
    }

    #[test]
    fn mixed_penalties() {
        let h = headers(&["content-security-policy", "strict-transport-security"]);
        let f = vec![finding(Severity::Warning), finding(Severity::Info)];
        assert_eq!(score_headers(&h, &f), 35);
    }

    #[test]
    fn unscored_headers_add_nothing() {
        assert_eq!(base_score(&headers(&["server", "x-powered-by"])), 0);
    }
}
