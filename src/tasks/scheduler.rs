use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, sleep, Duration};

use crate::core::state::AppState;
use crate::services::detection::DetectionService;
use crate::tasks::scoring;

pub(crate) async fn run(state: AppState) -> Result<()> {
    let detection = DetectionService::from_settings(state.settings())?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let concurrency = state.settings().worker().concurrency as usize;
    let mut handles = Vec::with_capacity(concurrency + 1);

    for _ in 0..concurrency {
        handles.push(tokio::spawn(scoring_worker(
            state.clone(),
            detection.clone(),
            shutdown_rx.clone(),
        )));
    }
    handles.push(tokio::spawn(release_stale_loop(state.clone(), shutdown_rx.clone())));

    crate::core::shutdown::shutdown_signal().await;
    if shutdown_tx.send(true).is_err() {
        tracing::warn!("Failed to broadcast shutdown signal to background tasks");
    }

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Background task join failed");
        }
    }

    Ok(())
}

async fn scoring_worker(
    state: AppState,
    detection: DetectionService,
    mut shutdown: watch::Receiver<bool>,
) {
    let poll_interval = Duration::from_secs(state.settings().worker().poll_interval_seconds);

    loop {
        if *shutdown.borrow() {
            break;
        }

        match scoring::claim_next_sheet(state.db()).await {
            Ok(Some(sheet)) => {
                if let Err(err) = scoring::process_sheet(&state, &detection, &sheet).await {
                    if let Err(recovery_err) =
                        scoring::fail_sheet(state.db(), &sheet.id, &err.to_string()).await
                    {
                        tracing::error!(
                            sheet_id = %sheet.id,
                            error = %recovery_err,
                            "Failed to recover sheet after worker error"
                        );
                    }
                    tracing::error!(sheet_id = %sheet.id, error = %err, "Failed to process sheet");
                }
                continue;
            }
            Ok(None) => {}
            Err(err) => tracing::error!(error = %err, "Failed to claim sheet"),
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = sleep(poll_interval) => {}
        }
    }
}

async fn release_stale_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let stale_minutes = state.settings().worker().stale_processing_minutes;
    let mut ticker = interval(Duration::from_secs(60));

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }
        if *shutdown.borrow() {
            break;
        }

        match scoring::release_stale_sheets(state.db(), stale_minutes).await {
            Ok(released) if !released.is_empty() => {
                tracing::warn!(count = released.len(), "Released stale processing sheets");
            }
            Ok(_) => {}
            Err(err) => tracing::error!(error = %err, "Failed to release stale sheets"),
        }
    }
}
