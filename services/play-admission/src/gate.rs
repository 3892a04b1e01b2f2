use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::AdmissionConfig;
use crate::limiter::WindowLimiter;
use crate::mirror::MirrorDispatcher;
use crate::store::PlayStore;

/// A client's claim that one play of `item_id` happened.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlayReport {
    pub item_id: Option<String>,
    pub engagement_duration_ms: Option<u64>,
    pub content_fingerprint: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Accepted {
    pub item_id: String,
    pub play_count: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Rejection {
    #[error("item id is required")]
    MissingItemId,
    #[error("engagement {duration_ms:?} ms is below the {minimum_ms} ms minimum")]
    TooShort {
        duration_ms: Option<u64>,
        minimum_ms: u64,
    },
    #[error("item not found: {0}")]
    NotFound(String),
    #[error("content fingerprint does not match item {0}")]
    ContentMismatch(String),
    #[error("rate limit reached, retry in {retry_after:?}")]
    RateLimited { retry_after: Duration },
    #[error("play store failure: {0}")]
    Store(String),
}

impl Rejection {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Rejection::MissingItemId => "MISSING_ITEM_ID",
            Rejection::TooShort { .. } => "TOO_SHORT",
            Rejection::NotFound(_) => "NOT_FOUND",
            Rejection::ContentMismatch(_) => "CONTENT_MISMATCH",
            Rejection::RateLimited { .. } => "RATE_LIMITED",
            Rejection::Store(_) => "STORE_FAILURE",
        }
    }
}

/// Decides which play reports reach the play store.
///
/// Validity checks run first so a rejected report consumes no window slot.
/// Accepted plays are counted locally, then handed to the optional ledger
/// mirror without waiting for it.
pub struct AdmissionController {
    config: AdmissionConfig,
    limiter: WindowLimiter,
    store: Arc<dyn PlayStore>,
    mirror: Option<MirrorDispatcher>,
}

impl AdmissionController {
    pub fn new(
        config: AdmissionConfig,
        store: Arc<dyn PlayStore>,
        mirror: Option<MirrorDispatcher>,
    ) -> Self {
        let limiter = WindowLimiter::new(config.ceiling, config.window);
        Self {
            config,
            limiter,
            store,
            mirror,
        }
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    pub fn admit(&self, source: &str, report: PlayReport) -> Result<Accepted, Rejection> {
        self.admit_at(source, report, Instant::now())
    }

    pub fn admit_at(
        &self,
        source: &str,
        report: PlayReport,
        now: Instant,
    ) -> Result<Accepted, Rejection> {
        let item_id = match report.item_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => return Err(self.reject(source, None, Rejection::MissingItemId)),
        };

        let minimum_ms = self.config.min_engagement_ms;
        match report.engagement_duration_ms {
            Some(ms) if ms >= minimum_ms => {}
            duration_ms => {
                return Err(self.reject(
                    source,
                    Some(&item_id),
                    Rejection::TooShort {
                        duration_ms,
                        minimum_ms,
                    },
                ))
            }
        }

        let item = match self.store.lookup(&item_id) {
            Ok(Some(item)) => item,
            Ok(None) => {
                let rejection = Rejection::NotFound(item_id.clone());
                return Err(self.reject(source, Some(&item_id), rejection));
            }
            Err(err) => return Err(self.store_failure(source, &item_id, err.to_string())),
        };

        let supplied = report
            .content_fingerprint
            .as_deref()
            .filter(|fp| !fp.is_empty());
        if let (Some(supplied), Some(expected)) = (supplied, item.expected_fingerprint.as_deref())
        {
            if supplied != expected {
                let rejection = Rejection::ContentMismatch(item_id.clone());
                return Err(self.reject(source, Some(&item_id), rejection));
            }
        }

        if let Err(retry_after) = self.limiter.try_acquire(source, now) {
            return Err(self.reject(
                source,
                Some(&item_id),
                Rejection::RateLimited { retry_after },
            ));
        }

        let play_count = match self.store.increment(&item_id) {
            Ok(count) => count,
            Err(err) => {
                self.limiter.release(source);
                return Err(self.store_failure(source, &item_id, err.to_string()));
            }
        };
        info!(%source, %item_id, play_count, "play admitted");

        if let Some(mirror) = &self.mirror {
            mirror.dispatch(&item_id);
        }

        Ok(Accepted {
            item_id,
            play_count,
        })
    }

    /// Drop expired rate windows. Returns how many were removed.
    pub fn sweep_expired(&self, now: Instant) -> usize {
        self.limiter.sweep(now)
    }

    pub fn tracked_sources(&self) -> usize {
        self.limiter.len()
    }

    fn reject(&self, source: &str, item_id: Option<&str>, rejection: Rejection) -> Rejection {
        debug!(
            %source,
            item_id = item_id.unwrap_or_default(),
            reason = rejection.reason_code(),
            "play rejected"
        );
        rejection
    }

    fn store_failure(&self, source: &str, item_id: &str, message: String) -> Rejection {
        error!(%source, %item_id, error = %message, "play store failure");
        Rejection::Store(message)
    }
}
