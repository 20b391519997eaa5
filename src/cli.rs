use clap::Parser;

#[derive(clap::Parser, Debug)]
#[command(author, version, about = "Scan web servers for security headers", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable detailed debug logging (global)
    #[arg(long, global = true, default_value_t = false)]
    pub debug: bool,

    /// Enable verbose logging (global)
    #[arg(long, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Scan a URL, or a file of newline-delimited URLs with -f
    Scan {
        /// Target URL (or file path with --file)
        target: String,

        /// Treat TARGET as a file of URLs
        #[arg(short = 'f', long, default_value_t = false)]
        file: bool,

        /// Concurrent requests (default from config: 10)
        #[arg(short = 'c', long)]
        concurrency: Option<usize>,

        /// Request timeout in seconds (default from config: 10)
        #[arg(short = 't', long)]
        timeout: Option<u64>,

        /// Rate limit, e.g. 10/s, 100/m, 1000/h
        #[arg(long)]
        rate: Option<String>,

        /// Send requests through this proxy (overrides config)
        #[arg(long, value_name = "URL")]
        proxy: Option<String>,

        /// User-Agent header to send (overrides config)
        #[arg(long, value_name = "UA")]
        user_agent: Option<String>,

        /// Follow redirects: true or false (overrides config)
        #[arg(long, value_name = "BOOL")]
        follow_redirects: Option<bool>,

        /// Reuse results cached by earlier runs
        #[arg(long, default_value_t = false)]
        cache: bool,

        /// Cache TTL in seconds (overrides config)
        #[arg(long)]
        cache_ttl: Option<u64>,

        /// Skip the TLS certificate check
        #[arg(long, default_value_t = false)]
        no_cert_check: bool,

        /// Also look for security.txt
        #[arg(long, default_value_t = false)]
        security_txt: bool,

        /// Export results to FILE
        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<String>,

        /// Export format
        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,

        /// Hide the progress bar
        #[arg(long, default_value_t = false)]
        no_progress: bool,

        /// Only print the summary
        #[arg(short = 'q', long, default_value_t = false)]
        quiet: bool,
    },

    /// Detailed audit of a single URL
    Audit {
        url: String,

        /// Print the result as JSON
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Save the JSON result to FILE
        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<String>,
    },

    /// Exit non-zero when any target fails the policy (for CI pipelines)
    CiCheck {
        target: String,

        /// Treat TARGET as a file of URLs
        #[arg(short = 'f', long, default_value_t = false)]
        file: bool,

        /// Minimum acceptable score
        #[arg(long, default_value_t = 80_u8)]
        threshold: u8,

        /// Do not fail on critical findings alone
        #[arg(long, default_value_t = false)]
        no_fail_on_critical: bool,
    },

    /// Manage the on-disk result cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Inspect configured checks and rule packs
    Plugin {
        #[command(subcommand)]
        action: PluginAction,
    },
}

#[derive(clap::Subcommand, Debug)]
pub enum CacheAction {
    /// Remove every cached entry
    Clear,
    /// Remove only expired entries
    ClearExpired,
}

#[derive(clap::Subcommand, Debug)]
pub enum PluginAction {
    /// List enabled checks and loaded rule packs
    List,
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_flags() {
        let cli = Cli::try_parse_from([
            "header-hunter", "scan", "urls.txt", "-f", "-c", "4", "--rate", "5/s", "--format", "csv", "-q",
        ])
        .unwrap();
        match cli.command {
            Commands::Scan { target, file, concurrency, rate, format, quiet, .. } => {
                assert_eq!(target, "urls.txt");
                assert!(file);
                assert_eq!(concurrency, Some(4));
                assert_eq!(rate.as_deref(), Some("5/s"));
                assert_eq!(format, ExportFormat::Csv);
                assert!(quiet);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn scan_client_overrides() {
        let cli = Cli::try_parse_from([
            "header-hunter",
            "scan",
            "https://a.test",
            "--proxy",
            "http://127.0.0.1:8080",
            "--user-agent",
            "audit-bot/1.0",
            "--follow-redirects",
            "false",
        ])
        .unwrap();
        match cli.command {
            Commands::Scan { proxy, user_agent, follow_redirects, .. } => {
                assert_eq!(proxy.as_deref(), Some("http://127.0.0.1:8080"));
                assert_eq!(user_agent.as_deref(), Some("audit-bot/1.0"));
                assert_eq!(follow_redirects, Some(false));
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let cli = Cli::try_parse_from(["header-hunter", "scan", "https://a.test"]).unwrap();
        match cli.command {
            Commands::Scan { proxy, user_agent, follow_redirects, .. } => {
                assert!(proxy.is_none() && user_agent.is_none() && follow_redirects.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["header-hunter", "cache", "clear-expired", "--debug"]).unwrap();
        assert!(cli.debug);
        assert!(matches!(cli.command, Commands::Cache { action: CacheAction::ClearExpired }));
    }

    #[test]
    fn ci_check_defaults() {
        let cli = Cli::try_parse_from(["header-hunter", "ci-check", "https://a.test"]).unwrap();
        match cli.command {
            Commands::CiCheck { threshold, no_fail_on_critical, file, .. } => {
                assert_eq!(threshold, 80);
                assert!(!no_fail_on_critical);
                assert!(!file);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
