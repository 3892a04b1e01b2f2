use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use url::Url;

pub const DEFAULT_CEILING: u32 = 3;
pub const DEFAULT_WINDOW_SECS: u64 = 60;
pub const DEFAULT_MIN_ENGAGEMENT_MS: u64 = 5_000;
pub const DEFAULT_MIRROR_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Log filter from a `RUST_LOG`-style directive, INFO when unset, empty or
/// unparsable.
pub fn log_filter(directive: Option<&str>) -> EnvFilter {
    directive
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_LEVEL))
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be > 0 (got {value})")]
    NotPositive { field: &'static str, value: u64 },
    #[error("{field} must be a valid URL: {value}")]
    InvalidUrl { field: &'static str, value: String },
    #[error("{field} URL scheme must be http or https: {value}")]
    InvalidUrlScheme { field: &'static str, value: String },
}

/// Limits applied to every play report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdmissionConfig {
    /// Reports accepted per source within one window.
    pub ceiling: u32,
    pub window: Duration,
    /// Shortest engagement that counts as a play.
    pub min_engagement_ms: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            ceiling: DEFAULT_CEILING,
            window: Duration::from_secs(DEFAULT_WINDOW_SECS),
            min_engagement_ms: DEFAULT_MIN_ENGAGEMENT_MS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MirrorConfig {
    pub endpoint: Url,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub listen: SocketAddr,
    pub catalog: PathBuf,
    pub admission: AdmissionConfig,
    pub mirror: Option<MirrorConfig>,
    pub sweep_interval: Duration,
}

#[derive(Debug, Parser)]
#[command(
    name = "play-admission",
    about = "Rate-limits and validates play reports before they reach the play rewards ledger"
)]
pub struct Args {
    /// Address the HTTP API listens on.
    #[arg(long, env = "PLAY_ADMISSION_LISTEN", default_value = "0.0.0.0:9180")]
    pub listen: SocketAddr,

    /// JSON file with the creations the local play store starts from.
    #[arg(long, env = "PLAY_ADMISSION_CATALOG")]
    pub catalog: PathBuf,

    #[arg(long, env = "PLAY_ADMISSION_CEILING", default_value_t = DEFAULT_CEILING)]
    pub ceiling: u32,

    #[arg(long, env = "PLAY_ADMISSION_WINDOW_SECS", default_value_t = DEFAULT_WINDOW_SECS)]
    pub window_secs: u64,

    #[arg(
        long,
        env = "PLAY_ADMISSION_MIN_ENGAGEMENT_MS",
        default_value_t = DEFAULT_MIN_ENGAGEMENT_MS
    )]
    pub min_engagement_ms: u64,

    /// Relay that submits `record_play` to the rewards contract. Mirroring is
    /// off when unset.
    #[arg(long, env = "PLAY_ADMISSION_MIRROR_URL")]
    pub mirror_url: Option<String>,

    #[arg(
        long,
        env = "PLAY_ADMISSION_MIRROR_TIMEOUT_MS",
        default_value_t = DEFAULT_MIRROR_TIMEOUT_MS
    )]
    pub mirror_timeout_ms: u64,

    #[arg(
        long,
        env = "PLAY_ADMISSION_SWEEP_INTERVAL_SECS",
        default_value_t = DEFAULT_SWEEP_INTERVAL_SECS
    )]
    pub sweep_interval_secs: u64,
}

impl Args {
    pub fn build_config(&self) -> Result<ServiceConfig, ConfigError> {
        let ceiling = positive("ceiling", self.ceiling as u64)?;
        let window_secs = positive("window_secs", self.window_secs)?;
        let mirror_timeout_ms = positive("mirror_timeout_ms", self.mirror_timeout_ms)?;
        let sweep_interval_secs = positive("sweep_interval_secs", self.sweep_interval_secs)?;

        let mirror = self
            .mirror_url
            .as_deref()
            .map(|raw| {
                parse_http_url("mirror_url", raw).map(|endpoint| MirrorConfig {
                    endpoint,
                    timeout: Duration::from_millis(mirror_timeout_ms),
                })
            })
            .transpose()?;

        Ok(ServiceConfig {
            listen: self.listen,
            catalog: self.catalog.clone(),
            admission: AdmissionConfig {
                ceiling: ceiling as u32,
                window: Duration::from_secs(window_secs),
                min_engagement_ms: self.min_engagement_ms,
            },
            mirror,
            sweep_interval: Duration::from_secs(sweep_interval_secs),
        })
    }
}

fn positive(field: &'static str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(ConfigError::NotPositive { field, value });
    }
    Ok(value)
}

fn parse_http_url(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|_| ConfigError::InvalidUrl {
        field,
        value: raw.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(ConfigError::InvalidUrlScheme {
            field,
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_anti_spam_policy() {
        let args = Args::parse_from(["play-admission", "--catalog", "catalog.json"]);
        let config = args.build_config().expect("config should build");

        assert_eq!(config.admission, AdmissionConfig::default());
        assert_eq!(config.admission.ceiling, 3);
        assert_eq!(config.admission.window, Duration::from_secs(60));
        assert_eq!(config.admission.min_engagement_ms, 5_000);
        assert!(config.mirror.is_none());
    }

    #[test]
    fn parses_mirror_settings() {
        let args = Args::parse_from([
            "play-admission",
            "--catalog",
            "catalog.json",
            "--mirror-url",
            "http://relay.local:8080/record-play",
            "--mirror-timeout-ms",
            "250",
        ]);
        let mirror = args.build_config().unwrap().mirror.unwrap();
        assert_eq!(mirror.endpoint.path(), "/record-play");
        assert_eq!(mirror.timeout, Duration::from_millis(250));
    }

    #[test]
    fn log_filter_defaults_to_info() {
        use tracing_subscriber::filter::LevelFilter;

        assert_eq!(log_filter(None).max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(log_filter(Some("  ")).max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(
            log_filter(Some("canvasforge_play_admission=debug")).max_level_hint(),
            Some(LevelFilter::DEBUG)
        );
    }

    #[test]
    fn rejects_zero_window() {
        let args = Args::parse_from([
            "play-admission",
            "--catalog",
            "catalog.json",
            "--window-secs",
            "0",
        ]);
        let err = args.build_config().unwrap_err();
        assert_eq!(
            err,
            ConfigError::NotPositive {
                field: "window_secs",
                value: 0
            }
        );
    }

    #[test]
    fn rejects_non_http_mirror() {
        let args = Args::parse_from([
            "play-admission",
            "--catalog",
            "catalog.json",
            "--mirror-url",
            "ftp://relay.local/record",
        ]);
        let err = args.build_config().unwrap_err();
        assert!(err.to_string().contains("http or https"), "unexpected error: {err}");
    }
}
