use reqwest::{Client, ClientBuilder, Proxy};
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = concat!("header-hunter/", env!("CARGO_PKG_VERSION"), " Security Header Analyzer");

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub timeout: Duration,
    pub user_agent: String,
    pub follow_redirects: bool,
    pub proxy: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            follow_redirects: true,
            proxy: None,
        }
    }
}

/// Build the shared HTTP client used for every request in a run.
pub fn build_client(opts: &ClientOptions) -> anyhow::Result<Client> {
    let redirect = if opts.follow_redirects {
        reqwest::redirect::Policy::limited(5)
    } else {
        reqwest::redirect::Policy::none()
    };

    let mut builder = ClientBuilder::new()
        // Connection pooling
        .pool_max_idle_per_host(16)
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .tcp_nodelay(true)

        // Timeouts
        .timeout(opts.timeout)
        .connect_timeout(opts.timeout.min(Duration::from_secs(5)))

        .use_rustls_tls()
        .redirect(redirect)
        .user_agent(opts.user_agent.clone());

    if let Some(proxy) = &opts.proxy {
        builder = builder.proxy(Proxy::all(proxy)?);
    }

    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        assert!(build_client(&ClientOptions::default()).is_ok());
    }
}
