use crate::analyze::checks::Checker;
use crate::model::{Finding, Headers, Severity};

const HEADER: &str = "content-security-policy";

/// (needle, reason) pairs, matched by substring against every source value.
const DANGEROUS_SOURCES: [(&str, &str); 4] = [
    ("'unsafe-inline'", "Allows inline scripts/styles, vulnerable to XSS"),
    ("'unsafe-eval'", "Allows eval(), vulnerable to code injection"),
    ("'unsafe-hashes'", "Allows event handler attributes"),
    ("*", "Allows resources from any origin"),
];

const DEPRECATED: [(&str, &str); 3] = [
    ("block-all-mixed-content", "Use upgrade-insecure-requests instead"),
    ("plugin-types", "Deprecated, use object-src none instead"),
    ("referrer", "Use Referrer-Policy header instead"),
];

/// One `name value...` entry of a policy.
#[derive(Debug, PartialEq)]
struct Directive<'a> {
    name: String,
    values: Vec<&'a str>,
}

/// Splits a policy into directives. A repeated directive keeps its first
/// occurrence, matching how browsers enforce it.
fn parse_policy(policy: &str) -> Vec<Directive<'_>> {
    let mut directives: Vec<Directive<'_>> = Vec::new();
    for part in policy.split(';') {
        let mut tokens = part.split_whitespace();
        let Some(name) = tokens.next() else { continue };
        let name = name.to_ascii_lowercase();
        if directives.iter().any(|d| d.name == name) {
            continue;
        }
        directives.push(Directive { name, values: tokens.collect() });
    }
    directives
}

/// Deep Content-Security-Policy review: unsafe sources, missing fallbacks,
/// permissive and deprecated directives, nonce/hash usage.
#[derive(Debug, Default)]
pub struct CspPolicyChecker;

impl CspPolicyChecker {
    fn dangerous_sources(directives: &[Directive<'_>], findings: &mut Vec<Finding>) {
        for d in directives {
            for value in &d.values {
                for (needle, reason) in DANGEROUS_SOURCES {
                    if !value.contains(needle) {
                        continue;
                    }
                    let severity = if needle == "*" { Severity::Warning } else { Severity::Critical };
                    let shown = needle.trim_matches('\'');
                    findings.push(Finding::new(
                        HEADER,
                        format!("CSP directive '{}' contains '{}': {}", d.name, shown, reason),
                        severity,
                        format!("Remove '{}' and use nonces, hashes, or strict-dynamic", shown),
                    ));
                }
            }
        }
    }

    fn missing_directives(directives: &[Directive<'_>], findings: &mut Vec<Finding>) {
        let has = |name: &str| directives.iter().any(|d| d.name == name);
        if !has("default-src") {
            findings.push(Finding::new(
                HEADER,
                "Missing critical directive 'default-src'",
                Severity::Critical,
                "Add 'default-src' directive as fallback",
            ));
        }
        if !has("script-src") {
            findings.push(Finding::new(
                HEADER,
                "Missing 'script-src' directive",
                Severity::Warning,
                "Add 'script-src' directive to control script sources",
            ));
        }
        if !has("object-src") {
            findings.push(Finding::new(
                HEADER,
                "Missing 'object-src' directive",
                Severity::Info,
                "Add 'object-src none' to prevent plugin execution",
            ));
        }
    }

    fn permissive_sources(directives: &[Directive<'_>], findings: &mut Vec<Finding>) {
        for d in directives {
            if d.name == "script-src" && d.values.iter().any(|v| *v == "data:") {
                findings.push(Finding::new(
                    HEADER,
                    "script-src allows 'data:' URIs, potential XSS vector",
                    Severity::Warning,
                    "Remove 'data:' from script-src",
                ));
            }
            for value in &d.values {
                if value.starts_with("*.") && value.matches('.').count() == 1 {
                    findings.push(Finding::new(
                        HEADER,
                        format!("{} allows all subdomains of {}", d.name, value),
                        Severity::Info,
                        "Consider restricting to specific subdomains",
                    ));
                }
            }
        }
    }

    fn deprecated(directives: &[Directive<'_>], findings: &mut Vec<Finding>) {
        for d in directives {
            if let Some((_, fix)) = DEPRECATED.iter().find(|(name, _)| *name == d.name) {
                findings.push(Finding::new(
                    HEADER,
                    format!("Deprecated directive '{}'", d.name),
                    Severity::Info,
                    *fix,
                ));
            }
        }
    }

    fn nonce_usage(directives: &[Directive<'_>], findings: &mut Vec<Finding>) {
        for d in directives.iter().filter(|d| d.name == "script-src" || d.name == "style-src") {
            let inline = d.values.iter().any(|v| *v == "'unsafe-inline'");
            let keyed = d.values.iter().any(|v| v.starts_with("'nonce-") || v.starts_with("'sha"));
            let strict = d.values.iter().any(|v| *v == "'strict-dynamic'");
            if inline && !keyed {
                findings.push(Finding::new(
                    HEADER,
                    format!("{} uses 'unsafe-inline' without nonces or hashes", d.name),
                    Severity::Critical,
                    "Use nonces or hashes instead of 'unsafe-inline'",
                ));
            } else if keyed && !strict {
                findings.push(Finding::new(
                    HEADER,
                    format!("{} uses nonces/hashes but not 'strict-dynamic'", d.name),
                    Severity::Info,
                    "Consider adding 'strict-dynamic' for better security",
                ));
            }
        }
    }
}

impl Checker for CspPolicyChecker {
    fn name(&self) -> &str {
        "advanced-csp"
    }

    fn check(&self, headers: &Headers) -> anyhow::Result<Vec<Finding>> {
        let mut findings = Vec::new();
        let Some(policy) = headers.get(HEADER) else {
            return Ok(findings);
        };

        let directives = parse_policy(policy);
        Self::dangerous_sources(&directives, &mut findings);
        Self::missing_directives(&directives, &mut findings);
        Self::permissive_sources(&directives, &mut findings);
        Self::deprecated(&directives, &mut findings);
        Self::nonce_usage(&directives, &mut findings);
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(policy: &str) -> Vec<Finding> {
        let mut h = Headers::new();
        h.insert(HEADER.to_string(), policy.to_string());
        CspPolicyChecker.check(&h).unwrap()
    }

    #[test]
    fn absent_policy_is_left_to_required_headers() {
        assert!(CspPolicyChecker.check(&Headers::new()).unwrap().is_empty());
    }

    #[test]
    fn parse_keeps_first_duplicate_and_skips_empty_parts() {
        let d = parse_policy("Script-Src 'self';; script-src *; img-src a b ");
        assert_eq!(d.len(), 2);
        assert_eq!(d[0], Directive { name: "script-src".into(), values: vec!["'self'"] });
        assert_eq!(d[1].values, vec!["a", "b"]);
    }

    #[test]
    fn strict_policy_is_clean() {
        let f = check("default-src 'self'; script-src 'nonce-abc' 'strict-dynamic'; object-src 'none'");
        assert!(f.is_empty(), "{:?}", f);
    }

    #[test]
    fn unsafe_inline_without_nonce_is_critical_twice() {
        let f = check("default-src 'self'; script-src 'self' 'unsafe-inline'; object-src 'none'");
        let critical: Vec<_> = f.iter().filter(|f| f.severity == Severity::Critical).collect();
        assert_eq!(critical.len(), 2);
        assert!(critical[0].issue.starts_with("CSP directive 'script-src' contains 'unsafe-inline'"));
        assert_eq!(critical[1].issue, "script-src uses 'unsafe-inline' without nonces or hashes");
    }

    #[test]
    fn wildcard_source_is_a_warning() {
        let f = check("default-src *; script-src 'self'; object-src 'none'");
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].severity, Severity::Warning);
        assert!(f[0].issue.contains("Allows resources from any origin"));
    }

    #[test]
    fn missing_fallbacks_graded_by_importance() {
        let f = check("img-src 'self'");
        let graded: Vec<_> = f.iter().map(|f| (f.issue.as_str(), f.severity)).collect();
        assert_eq!(
            graded,
            vec![
                ("Missing critical directive 'default-src'", Severity::Critical),
                ("Missing 'script-src' directive", Severity::Warning),
                ("Missing 'object-src' directive", Severity::Info),
            ]
        );
    }

    #[test]
    fn data_uris_and_deprecated_directives() {
        let f = check("default-src 'self'; script-src 'self' data:; object-src 'none'; block-all-mixed-content");
        assert!(f
            .iter()
            .any(|f| f.issue == "script-src allows 'data:' URIs, potential XSS vector" && f.severity == Severity::Warning));
        let deprecated = f.iter().find(|f| f.issue == "Deprecated directive 'block-all-mixed-content'").unwrap();
        assert_eq!(deprecated.severity, Severity::Info);
        assert_eq!(deprecated.recommended_fix.as_deref(), Some("Use upgrade-insecure-requests instead"));
    }

    #[test]
    fn hashes_without_strict_dynamic_is_info() {
        let f = check("default-src 'self'; script-src 'sha256-abc='; style-src 'nonce-x'; object-src 'none'");
        assert_eq!(f.len(), 2);
        assert!(f.iter().all(|f| f.severity == Severity::Info && f.issue.contains("but not 'strict-dynamic'")));
    }
}
