use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

/// Best-effort copy of an admitted play onto the rewards ledger.
pub trait LedgerMirror: Send + Sync {
    fn record_play(&self, item_id: &str) -> BoxFuture<'static, anyhow::Result<()>>;
}

#[derive(Serialize)]
struct RecordPlayRequest<'a> {
    creation_id: &'a str,
}

/// Posts `{ "creation_id": .. }` to a relay that submits `record_play` as the
/// configured recorder account.
pub struct HttpMirror {
    client: Client,
    endpoint: Url,
}

impl HttpMirror {
    pub fn new(endpoint: Url) -> Self {
        Self {
            client: Client::new(),
            endpoint,
        }
    }
}

impl LedgerMirror for HttpMirror {
    fn record_play(&self, item_id: &str) -> BoxFuture<'static, anyhow::Result<()>> {
        let request = self
            .client
            .post(self.endpoint.clone())
            .json(&RecordPlayRequest {
                creation_id: item_id,
            });
        Box::pin(async move {
            let resp = request.send().await?;
            if resp.status().is_success() {
                return Ok(());
            }
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("relay rejected record_play: {status} - {text}")
        })
    }
}

/// Runs mirror calls off the request path. Failures and timeouts are logged
/// and dropped; they never touch the local count.
#[derive(Clone)]
pub struct MirrorDispatcher {
    mirror: Arc<dyn LedgerMirror>,
    timeout: Duration,
}

impl MirrorDispatcher {
    pub fn new(mirror: Arc<dyn LedgerMirror>, timeout: Duration) -> Self {
        Self { mirror, timeout }
    }

    pub fn dispatch(&self, item_id: &str) -> tokio::task::JoinHandle<()> {
        let call = self.mirror.record_play(item_id);
        let timeout = self.timeout;
        let item_id = item_id.to_string();
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, call).await {
                Ok(Ok(())) => debug!(%item_id, "play mirrored to ledger"),
                Ok(Err(err)) => warn!(%item_id, error = %err, "ledger mirror failed"),
                Err(_) => warn!(%item_id, ?timeout, "ledger mirror timed out"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Hanging;

    impl LedgerMirror for Hanging {
        fn record_play(&self, _item_id: &str) -> BoxFuture<'static, anyhow::Result<()>> {
            Box::pin(futures::future::pending())
        }
    }

    struct Counting(Arc<AtomicUsize>);

    impl LedgerMirror for Counting {
        fn record_play(&self, _item_id: &str) -> BoxFuture<'static, anyhow::Result<()>> {
            let calls = self.0.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn hanging_mirror_is_cut_off() {
        let dispatcher = MirrorDispatcher::new(Arc::new(Hanging), Duration::from_millis(20));
        let handle = dispatcher.dispatch("bafy-snake");
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("dispatch should finish once the mirror times out")
            .unwrap();
    }

    #[tokio::test]
    async fn dispatch_calls_mirror() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher =
            MirrorDispatcher::new(Arc::new(Counting(calls.clone())), Duration::from_secs(1));

        dispatcher.dispatch("a").await.unwrap();
        dispatcher.dispatch("b").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unreachable_relay_is_swallowed() {
        // Nothing listens on the discard port.
        let endpoint = Url::parse("http://127.0.0.1:9/record-play").unwrap();
        let dispatcher =
            MirrorDispatcher::new(Arc::new(HttpMirror::new(endpoint)), Duration::from_secs(2));
        dispatcher.dispatch("bafy-pong").await.unwrap();
    }
}
