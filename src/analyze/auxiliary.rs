use async_trait::async_trait;

use crate::model::Finding;
use crate::probe::Fetcher;
use crate::target::Target;

/// A check that needs more than the response headers (network, TLS).
/// Implementations swallow their own errors and return no findings instead.
#[async_trait]
pub trait AuxiliaryCheck: Send + Sync {
    fn name(&self) -> &str;
    async fn check(&self, target: &Target, fetcher: &dyn Fetcher) -> Vec<Finding>;
}

/// Findings from auxiliary checks, kept apart so the analyzer can place them
/// after the header-derived findings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuxiliaryFindings {
    pub certificate: Vec<Finding>,
    pub security_txt: Vec<Finding>,
}

/// The optional certificate and security.txt checks for one run.
#[derive(Default)]
pub struct AuxiliaryChecks {
    pub certificate: Option<Box<dyn AuxiliaryCheck>>,
    pub security_txt: Option<Box<dyn AuxiliaryCheck>>,
}

impl AuxiliaryChecks {
    pub fn none() -> Self {
        Self::default()
    }

    pub async fn run(&self, target: &Target, fetcher: &dyn Fetcher) -> AuxiliaryFindings {
        let certificate = match &self.certificate {
            Some(c) => c.check(target, fetcher).await,
            None => Vec::new(),
        };
        let security_txt = match &self.security_txt {
            Some(c) => c.check(target, fetcher).await,
            None => Vec::new(),
        };
        AuxiliaryFindings { certificate, security_txt }
    }
}

impl std::fmt::Debug for AuxiliaryChecks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuxiliaryChecks")
            .field("certificate", &self.certificate.as_ref().map(|c| c.name().to_string()))
            .field("security_txt", &self.security_txt.as_ref().map(|c| c.name().to_string()))
            .finish()
    }
}
