use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tokio::time;
use tracing::{debug, info};

use canvasforge_play_admission::{
    log_filter, router, AdmissionController, Args, CatalogStore, HttpMirror, MirrorDispatcher,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .init();

    let args = Args::parse();
    let config = args.build_config().context("invalid configuration")?;

    let store = CatalogStore::load(&config.catalog).context("failed to load catalog")?;
    info!(items = store.len(), catalog = %config.catalog.display(), "play store loaded");

    let mirror = config.mirror.as_ref().map(|mirror| {
        info!(endpoint = %mirror.endpoint, timeout = ?mirror.timeout, "ledger mirror enabled");
        MirrorDispatcher::new(
            Arc::new(HttpMirror::new(mirror.endpoint.clone())),
            mirror.timeout,
        )
    });

    let controller = Arc::new(AdmissionController::new(
        config.admission.clone(),
        Arc::new(store),
        mirror,
    ));

    // Sweep loop
    let sweeper = controller.clone();
    let sweep_interval = config.sweep_interval;
    tokio::spawn(async move {
        let mut interval = time::interval(sweep_interval);
        loop {
            interval.tick().await;
            let removed = sweeper.sweep_expired(Instant::now());
            if removed > 0 {
                debug!(removed, tracked = sweeper.tracked_sources(), "swept rate windows");
            }
        }
    });

    let app = router(controller);
    info!(
        addr = %config.listen,
        ceiling = config.admission.ceiling,
        window = ?config.admission.window,
        min_engagement_ms = config.admission.min_engagement_ms,
        "play admission service listening"
    );

    axum::serve(tokio::net::TcpListener::bind(config.listen).await?, app).await?;
    Ok(())
}
