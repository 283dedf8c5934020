//! Per-source polling tasks
//!
//! One task per enabled source. Each tick runs a full ingestion cycle on the
//! blocking pool and waits for it, so cycles for the same source never overlap.
//! A failed cycle is logged and retried on the next tick.

use super::config::SourceConfig;
use super::engine::{CyclePhase, CycleReport, PipelineEngine};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Spawn the polling loop for `source`
///
/// The first cycle runs immediately. The task exits once `shutdown` flips to
/// `true` (or its sender is dropped), after any in-flight cycle has finished.
pub fn spawn_source_task(
    engine: Arc<PipelineEngine>,
    source: SourceConfig,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        log::info!(
            "⏰ [{}] Polling {} every {}s",
            source.name,
            source.saved_path.join(&source.db_pattern).display(),
            source.poll_interval
        );

        let mut timer = interval(source.poll_interval());
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = timer.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let cycle = {
                let engine = engine.clone();
                let source = source.clone();
                tokio::task::spawn_blocking(move || engine.run_cycle(&source)).await
            };

            match cycle {
                Ok(Ok(report)) => log_report(&source, &report),
                Ok(Err(e)) => {
                    log::error!(
                        "❌ [{}] Cycle failed while {:?}: {}",
                        source.name,
                        e.phase(),
                        e
                    );
                }
                // A panicked cycle wrote no watermark, the next tick retries it
                Err(e) => log::error!("❌ [{}] Cycle task panicked: {}", source.name, e),
            }

            if *shutdown.borrow() {
                break;
            }
        }

        log::info!("🛑 [{}] Polling stopped", source.name);
    })
}

fn log_report(source: &SourceConfig, report: &CycleReport) {
    match report.phase {
        CyclePhase::Idle => log::debug!("💤 [{}] Waiting for a first snapshot", source.name),
        _ if report.events > 0 => log::info!("📥 [{}] {}", source.name, report),
        _ => log::debug!(
            "💤 [{}] No new events (watermark {})",
            source.name,
            report.watermark_after
        ),
    }
}
