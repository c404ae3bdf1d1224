//! Command line argument parsing

use crate::core::resolver::ResolveOptions;
use crate::download::chunker::DEFAULT_CHUNK_SIZE;
use crate::platform::client::HttpClientConfig;
use clap::Parser;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;

/// Resolve YouTube videos into directly fetchable media URLs
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Video URLs or ids
    #[arg(required = true, value_name = "URL")]
    pub inputs: Vec<String>,

    /// Format id (itag) to select
    #[arg(short, long, value_name = "ITAG")]
    pub format: Option<String>,

    /// List available formats instead of selecting one
    #[arg(short, long)]
    pub info: bool,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    /// Netscape cookies.txt file for restricted videos
    #[arg(long, value_name = "FILE")]
    pub cookies: Option<PathBuf>,

    /// HTTP timeout (e.g., 30s, 1m)
    #[arg(long, value_name = "DURATION", default_value = "30s")]
    pub timeout: humantime::Duration,

    /// HTTP retries for transient errors
    #[arg(long, default_value = "3")]
    pub retries: u32,

    /// Range request size in bytes for adaptive streams
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: u64,

    /// Concurrent size probes per video
    #[arg(long, value_name = "N", default_value = "4")]
    pub probe_concurrency: usize,

    /// Override User-Agent header
    #[arg(long, value_name = "USER_AGENT")]
    pub user_agent: Option<String>,

    /// Proxy URL (http/https/socks)
    #[arg(long, value_name = "URL")]
    pub proxy: Option<String>,

    /// Request rate limit in requests per second
    #[arg(long, value_name = "REQ_PER_SEC")]
    pub rate: Option<NonZeroU32>,

    /// Print only the selected media URLs
    #[arg(short = 'g', long)]
    pub print_url: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Quiet output (only errors)
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Get HTTP timeout as Duration
    pub fn timeout_duration(&self) -> Duration {
        self.timeout.into()
    }

    /// HTTP client settings from the command line
    pub fn http_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: self.timeout_duration(),
            max_retries: self.retries,
            user_agent: self.user_agent.clone(),
            proxy_url: self.proxy.clone(),
            requests_per_second: self.rate,
        }
    }

    /// Per-video options from the command line
    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions {
            format_id: self.format.clone(),
            info_only: self.info,
        }
    }

    /// Get output verbosity level
    pub fn verbosity_level(&self) -> VerbosityLevel {
        if self.quiet {
            VerbosityLevel::Quiet
        } else if self.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }
}

/// Output verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbosityLevel {
    /// Quiet (only errors)
    Quiet,
    /// Normal
    Normal,
    /// Verbose (debug info)
    Verbose,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            format: None,
            info: false,
            json: false,
            cookies: None,
            timeout: humantime::Duration::from(Duration::from_secs(30)),
            retries: 3,
            chunk_size: DEFAULT_CHUNK_SIZE,
            probe_concurrency: 4,
            user_agent: None,
            proxy: None,
            rate: None,
            print_url: false,
            verbose: false,
            quiet: false,
        }
    }
}
