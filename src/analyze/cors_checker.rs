use crate::analyze::checks::Checker;
use crate::model::{Finding, Headers, Severity};

const HEADER: &str = "access-control-allow-origin";

/// Flags permissive cross-origin settings.
#[derive(Debug, Default)]
pub struct CorsChecker;

impl Checker for CorsChecker {
    fn name(&self) -> &str {
        "cors"
    }

    fn check(&self, headers: &Headers) -> anyhow::Result<Vec<Finding>> {
        let mut findings = Vec::new();

        let Some(origin) = headers.get(HEADER).map(|v| v.trim()) else {
            return Ok(findings);
        };

        let allow_credentials = headers
            .get("access-control-allow-credentials")
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        if origin == "*" && allow_credentials {
            findings.push(Finding::new(
                HEADER,
                "Wildcard origin (*) combined with credentials",
                Severity::Critical,
                "Reflect an allow-listed origin instead of * when credentials are allowed",
            ));
        } else if origin == "*" {
            findings.push(Finding::new(
                HEADER,
                "Wildcard origin (*) allows any domain to read responses",
                Severity::Warning,
                "Restrict Access-Control-Allow-Origin to trusted origins",
            ));
        }

        if origin.eq_ignore_ascii_case("null") {
            findings.push(Finding::new(
                HEADER,
                "Null origin accepted",
                Severity::Warning,
                "Never allow the null origin; sandboxed documents can forge it",
            ));
        }

        let dangerous: Vec<String> = headers
            .get("access-control-allow-methods")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_ascii_uppercase())
                    .filter(|m| matches!(m.as_str(), "DELETE" | "PUT" | "PATCH"))
                    .collect()
            })
            .unwrap_or_default();
        if !dangerous.is_empty() {
            findings.push(Finding::new(
                "access-control-allow-methods",
                format!("State-changing methods allowed cross-origin: {}", dangerous.join(", ")),
                Severity::Info,
                "Only expose the methods cross-origin clients need",
            ));
        }

        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> Headers {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn no_cors_headers_no_findings() {
        assert!(CorsChecker.check(&Headers::new()).unwrap().is_empty());
    }

    #[test]
    fn wildcard_with_credentials_is_critical() {
        let h = headers(&[(HEADER, "*"), ("access-control-allow-credentials", "true")]);
        let f = CorsChecker.check(&h).unwrap();
        assert_eq!(f.len(), 1);
        assert_eq!(f[0].severity, Severity::Critical);
    }

    #[test]
    fn null_origin_and_methods() {
        let h = headers(&[(HEADER, "null"), ("access-control-allow-methods", "GET, delete")]);
        let f = CorsChecker.check(&h).unwrap();
        assert_eq!(f.len(), 2);
        assert!(f[1].issue.contains("DELETE"));
    }
}
