use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use native_tls::TlsConnector;
use tokio::task::spawn_blocking;
use x509_parser::prelude::*;

use crate::analyze::auxiliary::AuxiliaryCheck;
use crate::model::{Finding, Severity};
use crate::probe::Fetcher;
use crate::target::Target;

pub const EXPIRY_WARNING_DAYS: i64 = 30;
pub const MIN_RSA_BITS: usize = 2048;

/// Signature algorithm OIDs built on MD2, MD5 or SHA-1.
const WEAK_SIGNATURE_OIDS: [&str; 6] = [
    "1.2.840.113549.1.1.2", // md2WithRSAEncryption
    "1.2.840.113549.1.1.4", // md5WithRSAEncryption
    "1.2.840.113549.1.1.5", // sha1WithRSAEncryption
    "1.2.840.10045.4.1",    // ecdsa-with-SHA1
    "1.2.840.10040.4.3",    // dsa-with-sha1
    "1.3.14.3.2.29",        // sha1WithRSASignature (OIW)
];

#[derive(Debug, Clone)]
pub struct CertificateInfo {
    pub subject: String,
    pub issuer: String,
    pub not_after: DateTime<Utc>,
    pub signature_oid: String,
    pub rsa_key_bits: Option<usize>,
}

pub fn evaluate_certificate(info: &CertificateInfo, now: DateTime<Utc>) -> Vec<Finding> {
    let mut findings = Vec::new();

    let days_left = info.not_after.signed_duration_since(now).num_days();
    if info.not_after < now {
        findings.push(Finding::new(
            "ssl-certificate",
            "SSL certificate has expired",
            Severity::Critical,
            "Renew SSL certificate immediately",
        ));
    } else if days_left < EXPIRY_WARNING_DAYS {
        findings.push(Finding::new(
            "ssl-certificate",
            format!("SSL certificate expires in {} days", days_left),
            Severity::Warning,
            "Renew SSL certificate soon",
        ));
    }

    if WEAK_SIGNATURE_OIDS.contains(&info.signature_oid.as_str()) {
        findings.push(Finding::new(
            "ssl-certificate",
            format!("Weak signature algorithm: {}", info.signature_oid),
            Severity::Warning,
            "Use SHA256 or stronger",
        ));
    }

    if let Some(bits) = info.rsa_key_bits.filter(|b| *b < MIN_RSA_BITS) {
        findings.push(Finding::new(
            "ssl-certificate",
            format!("Weak key size: {} bits", bits),
            Severity::Critical,
            "Use at least 2048-bit RSA or 256-bit ECC",
        ));
    }

    findings
}

fn fetch_certificate(host: &str, port: u16, timeout: Duration) -> anyhow::Result<CertificateInfo> {
    // Accept invalid chains so expired or self-signed certificates can still be inspected.
    let connector = TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()?;

    let addr = (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| anyhow::anyhow!("no address for {}", host))?;
    let tcp = TcpStream::connect_timeout(&addr, timeout)?;
    tcp.set_read_timeout(Some(timeout))?;
    tcp.set_write_timeout(Some(timeout))?;

    let stream = connector
        .connect(host, tcp)
        .map_err(|e| anyhow::anyhow!("TLS handshake failed: {}", e))?;
    let cert = stream
        .peer_certificate()?
        .ok_or_else(|| anyhow::anyhow!("no peer certificate"))?;
    let der = cert.to_der()?;

    let (_, x509) = parse_x509_certificate(&der).map_err(|e| anyhow::anyhow!("X.509 parse error: {}", e))?;

    let not_after = DateTime::from_timestamp(x509.validity().not_after.timestamp(), 0).unwrap_or_default();
    let rsa_key_bits = match x509.public_key().parsed() {
        Ok(x509_parser::public_key::PublicKey::RSA(rsa)) => Some(rsa.key_size()),
        _ => None,
    };

    tracing::debug!(subject = %x509.subject(), issuer = %x509.issuer(), "parsed peer certificate");

    Ok(CertificateInfo {
        subject: x509.subject().to_string(),
        issuer: x509.issuer().to_string(),
        not_after,
        signature_oid: x509.signature_algorithm.algorithm.to_id_string(),
        rsa_key_bits,
    })
}

/// Inspects the certificate served on an https target's port.
#[derive(Debug, Clone)]
pub struct CertificateCheck {
    timeout: Duration,
}

impl CertificateCheck {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for CertificateCheck {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl AuxiliaryCheck for CertificateCheck {
    fn name(&self) -> &str {
        "certificate"
    }

    async fn check(&self, target: &Target, _fetcher: &dyn Fetcher) -> Vec<Finding> {
        if !target.is_https() {
            return Vec::new();
        }
        let host = target.domain().to_string();
        let port = url::Url::parse(target.url())
            .ok()
            .and_then(|u| u.port_or_known_default())
            .unwrap_or(443);
        let timeout = self.timeout;

        let info = spawn_blocking(move || fetch_certificate(&host, port, timeout)).await;
        match info {
            Ok(Ok(info)) => evaluate_certificate(&info, Utc::now()),
            Ok(Err(e)) => {
                tracing::warn!(url = target.url(), error = %e, "certificate check failed");
                Vec::new()
            }
            Err(e) => {
                tracing::error!(url = target.url(), error = %e, "certificate task panicked");
                Vec::new()
            }
        }
    }
}
