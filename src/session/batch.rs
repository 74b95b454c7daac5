use std::time::Duration;
use tokio_util::sync::CancellationToken;

use log::{info, warn};

use super::controller::SessionController;
use super::engine::{run_session, AbortReason, SessionOutcome, SessionReport, SessionSettings};
use super::request::LoggingRequest;

/// Planned wall time of a whole batch: every run plus the gaps between them.
/// Saturates for absurd durations.
pub fn batch_planned_secs(duration_s: u64, settings: &SessionSettings) -> u64 {
    let runs = u64::from(settings.batch_runs);
    let gaps = runs.saturating_sub(1).saturating_mul(settings.batch_gap.as_secs());
    runs.saturating_mul(duration_s).saturating_add(gaps)
}

/// Sub-requests `{label}_1..{label}_N`. Each run's clock time is pushed back by
/// the runs and gaps before it so the embedded timestamps line up end to end.
pub fn batch_parts(request: &LoggingRequest, settings: &SessionSettings) -> Vec<LoggingRequest> {
    let stride = request.duration_s.saturating_add(settings.batch_gap.as_secs());
    (1..=u64::from(settings.batch_runs))
        .map(|i| LoggingRequest {
            label: format!("{}_{}", request.label, i),
            clock_time: request.clock_time.offset_by((i - 1).saturating_mul(stride)),
            ..request.clone()
        })
        .collect()
}

/// Runs the parts back to back with a gap between them. Aggregate session state
/// is owned by the caller; only the label follows the running part.
pub(crate) async fn run_batch(
    controller: &SessionController,
    request: &LoggingRequest,
    cancel: &CancellationToken,
) -> Vec<SessionReport> {
    let settings = controller.context().settings.clone();
    let parts = batch_parts(request, &settings);
    let count = parts.len();
    let mut reports = Vec::with_capacity(count);

    info!(
        "Starting batch '{}': {} files {}_1.csv to {}_{}.csv",
        request.label, count, request.label, request.label, count
    );

    for (index, part) in parts.iter().enumerate() {
        info!(
            "=== Batch {}/{}: {} (start {}) ===",
            index + 1,
            count,
            part.label,
            part.clock_time
        );
        controller.set_label(&part.label).await;

        let report = run_session(controller.context(), part, cancel).await;
        let cancelled = report.outcome == SessionOutcome::Aborted(AbortReason::Cancelled);
        controller.publish(report.clone());
        reports.push(report);

        if cancelled {
            warn!("Batch '{}' cancelled during {}", request.label, part.label);
            break;
        }

        if index + 1 < count && !wait_gap(settings.batch_gap, cancel).await {
            warn!("Batch '{}' cancelled between runs", request.label);
            break;
        }
    }

    info!("Batch recording '{}' finished", request.label);
    reports
}

/// False when cancelled during the gap.
async fn wait_gap(gap: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(gap) => true,
        _ = cancel.cancelled() => false,
    }
}
