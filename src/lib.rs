pub mod config;
pub mod http;
pub mod sensing;
pub mod session;
pub mod utils;

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use config::AppConfig;
use http::{AcceptLoop, Router};
use sensing::{CapsenseSensor, SensorFacade, SimulatedCapsense, SimulatedEnvironment};
use session::{LogIndicator, SessionContext, SessionController, SessionOutcome, SessionSettings};

/// Everything the control plane needs once the listener is bound.
pub struct AppState {
    pub config: AppConfig,
    pub sessions: SessionController,
}

impl AppState {
    pub fn new(config: AppConfig, sensors: SensorFacade) -> Self {
        let context = SessionContext::new(
            sensors,
            Arc::new(LogIndicator),
            SessionSettings::from(&config),
        );
        Self {
            config,
            sessions: SessionController::new(context),
        }
    }

    pub fn router(&self) -> Router {
        Router::new(self.sessions.clone(), self.config.read_timeout())
    }
}

/// Sensors for off-target runs.
pub fn simulated_sensors(config: &AppConfig) -> SensorFacade {
    let capsense = config
        .capsense
        .clone()
        .map(|layout| Arc::new(SimulatedCapsense::new(layout)) as Arc<dyn CapsenseSensor>);
    SensorFacade::new(
        Arc::new(SimulatedEnvironment::new(config.simulate_env_faults)),
        capsense,
    )
}

/// Binary entry: config, logging, then a single-threaded runtime so sampling
/// and request handling only interleave at await points.
pub fn run() -> Result<()> {
    let config = AppConfig::load()?;
    utils::logging::init(config.verbose);

    info!("PicoLogger starting up...");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build runtime")?;

    runtime.block_on(async move {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, shutting down");
                token.cancel();
            }
        });
        serve(config, shutdown).await
    })
}

pub async fn serve(config: AppConfig, shutdown: CancellationToken) -> Result<()> {
    if let Err(err) = std::fs::create_dir_all(&config.log_dir) {
        warn!(
            "Logs directory {} cannot be created: {err}",
            config.log_dir.display()
        );
    }

    let sensors = simulated_sensors(&config);
    let state = AppState::new(config, sensors);
    spawn_report_logger(&state.sessions);

    let listener = TcpListener::bind(&state.config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", state.config.bind_addr))?;

    AcceptLoop::new(
        listener,
        state.router(),
        state.config.accept_tick(),
        state.config.accept_backoff(),
    )
    .run(shutdown)
    .await?;

    state.sessions.stop().await;
    Ok(())
}

fn spawn_report_logger(sessions: &SessionController) {
    let mut reports = sessions.subscribe();
    tokio::spawn(async move {
        while reports.changed().await.is_ok() {
            let Some(report) = reports.borrow_and_update().clone() else {
                continue;
            };
            match &report.outcome {
                SessionOutcome::Completed => info!(
                    "Session {} '{}' completed: {} rows in {}",
                    report.id,
                    report.label,
                    report.rows_written,
                    report.path.display()
                ),
                SessionOutcome::Aborted(reason) => warn!(
                    "Session {} '{}' aborted ({reason}): {} rows in {}",
                    report.id,
                    report.label,
                    report.rows_written,
                    report.path.display()
                ),
            }
        }
    });
}
