use std::sync::Arc;

use anyhow::{bail, Result};
use log::{error, info};
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::batch::{batch_planned_secs, run_batch};
use super::engine::{run_session, SessionContext, SessionReport};
use super::request::LoggingRequest;
use super::state::{SessionKind, SessionState};

/// Owns the session record and the task running against it. At most one
/// session (single or batch) runs at a time; further start requests are
/// rejected until it ends.
#[derive(Clone)]
pub struct SessionController {
    state: Arc<Mutex<SessionState>>,
    context: SessionContext,
    reports: Arc<watch::Sender<Option<SessionReport>>>,
}

impl SessionController {
    pub fn new(context: SessionContext) -> Self {
        let (reports, _) = watch::channel(None);
        Self {
            state: Arc::new(Mutex::new(SessionState::new())),
            context,
            reports: Arc::new(reports),
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub async fn snapshot(&self) -> SessionState {
        self.state.lock().await.clone()
    }

    pub async fn status_line(&self) -> String {
        self.state.lock().await.status_line(Instant::now())
    }

    /// Latest finished session (or batch part).
    pub fn subscribe(&self) -> watch::Receiver<Option<SessionReport>> {
        self.reports.subscribe()
    }

    /// Claims the session slot and spawns the sampling task. Returns as soon as
    /// the task is scheduled.
    pub async fn start_single(&self, request: LoggingRequest) -> Result<()> {
        let cancel = self
            .claim(SessionKind::Single, &request.label, request.duration_s)
            .await?;

        let controller = self.clone();
        self.spawn_supervised(async move {
            let report = run_session(controller.context(), &request, &cancel).await;
            vec![report]
        });
        Ok(())
    }

    pub async fn start_batch(&self, request: LoggingRequest) -> Result<()> {
        let planned = batch_planned_secs(request.duration_s, &self.context.settings);
        let cancel = self
            .claim(SessionKind::Batch, &request.label, planned)
            .await?;

        let controller = self.clone();
        self.spawn_supervised(async move { run_batch(&controller, &request, &cancel).await });
        Ok(())
    }

    /// Cancels the running session. False when idle.
    pub async fn stop(&self) -> bool {
        let state = self.state.lock().await;
        match (&state.cancel, state.active) {
            (Some(token), true) => {
                info!("Stop requested for '{}'", state.label);
                token.cancel();
                true
            }
            _ => false,
        }
    }

    async fn claim(&self, kind: SessionKind, label: &str, planned_secs: u64) -> Result<CancellationToken> {
        let mut state = self.state.lock().await;
        if state.active {
            bail!("{}", state.status_line(Instant::now()));
        }
        let token = CancellationToken::new();
        state.begin(kind, label.to_string(), planned_secs, Instant::now(), token.clone());
        info!(
            "Session claimed: {} '{}' ({}s planned)",
            kind.as_str(),
            label,
            planned_secs
        );
        Ok(token)
    }

    /// Runs `work` in its own task and resets the session record however it
    /// ends, panics included. Single-session reports are published after the
    /// reset so subscribers observe an idle controller.
    fn spawn_supervised<F>(&self, work: F)
    where
        F: std::future::Future<Output = Vec<SessionReport>> + Send + 'static,
    {
        let controller = self.clone();
        tokio::spawn(async move {
            let outcome = tokio::spawn(work).await;
            let kind = controller.finish().await;
            match outcome {
                Ok(reports) if kind == SessionKind::Single => {
                    for report in reports {
                        controller.publish(report);
                    }
                }
                Ok(_) => {}
                Err(err) => error!("Logging task failed: {err}"),
            }
        });
    }

    pub(crate) async fn set_label(&self, label: &str) {
        let mut state = self.state.lock().await;
        if state.active {
            state.label = label.to_string();
        }
    }

    pub(crate) fn publish(&self, report: SessionReport) {
        self.reports.send_replace(Some(report));
    }

    async fn finish(&self) -> SessionKind {
        let mut state = self.state.lock().await;
        let kind = state.kind;
        if let Some(started_at) = state.started_at {
            info!(
                "Session {} '{}' released, started {} ({}s ago)",
                kind.as_str(),
                state.label,
                started_at.format("%Y-%m-%d %H:%M:%S UTC"),
                state.elapsed_secs(Instant::now())
            );
        }
        state.clear();
        kind
    }
}
