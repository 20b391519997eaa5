pub mod auxiliary;
pub mod certificate;
pub mod checks;
pub mod cors_checker;
pub mod csp_checker;
pub mod rules;
pub mod security_headers;
pub mod security_txt;
pub mod tls_checker;

pub use auxiliary::{AuxiliaryCheck, AuxiliaryChecks, AuxiliaryFindings};
pub use checks::{CheckRegistry, Checker};
pub use rules::{Rule, RuleSet};
pub use security_headers::HeaderAnalyzer;
