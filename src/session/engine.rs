use anyhow::{Context, Result};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::sensing::SensorFacade;

use super::clock::{sample_timestamp, DateRollover};
use super::indicator::{Indicator, IndicatorGuard};
use super::request::LoggingRequest;

// Set to false to silence per-session chatter from this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

const ENV_COLUMNS: &str = "BME280_temperature,BME280_humidity,BME280_pressure";

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub log_dir: PathBuf,
    pub max_consecutive_errors: u32,
    pub date_rollover: DateRollover,
    pub batch_runs: u32,
    pub batch_gap: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for SessionSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            log_dir: config.log_dir.clone(),
            max_consecutive_errors: config.max_consecutive_errors.max(1),
            date_rollover: config.date_rollover,
            batch_runs: config.batch_runs.max(1),
            batch_gap: Duration::from_secs(config.batch_gap_secs),
        }
    }
}

impl SessionSettings {
    pub fn log_path(&self, label: &str) -> PathBuf {
        self.log_dir.join(format!("{label}.csv"))
    }
}

/// Collaborators shared by every session task.
#[derive(Clone)]
pub struct SessionContext {
    pub sensors: SensorFacade,
    pub indicator: Arc<dyn Indicator>,
    pub settings: Arc<SessionSettings>,
}

impl SessionContext {
    pub fn new(
        sensors: SensorFacade,
        indicator: Arc<dyn Indicator>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            sensors,
            indicator,
            settings: Arc::new(settings),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// The log file could not be created or opened.
    LogFile(String),
    ConsecutiveErrors(u32),
    Cancelled,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::LogFile(err) => write!(f, "log file unavailable: {err}"),
            AbortReason::ConsecutiveErrors(n) => write!(f, "{n} consecutive errors"),
            AbortReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed,
    Aborted(AbortReason),
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub id: Uuid,
    pub label: String,
    pub path: PathBuf,
    pub total_samples: u64,
    pub rows_written: u64,
    pub successful: u64,
    pub failed: u64,
    pub outcome: SessionOutcome,
}

impl SessionReport {
    fn new(label: &str, path: PathBuf, total_samples: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.to_string(),
            path,
            total_samples,
            rows_written: 0,
            successful: 0,
            failed: 0,
            outcome: SessionOutcome::Completed,
        }
    }
}

/// Runs one logging session to completion, abort or cancellation.
///
/// Sampling is fixed-delay: after every tick the task sleeps a full interval
/// no matter how long the tick took. Nothing here returns an error; failures
/// end up in the report.
pub async fn run_session(
    ctx: &SessionContext,
    request: &LoggingRequest,
    cancel: &CancellationToken,
) -> SessionReport {
    let _indicator = IndicatorGuard::on(ctx.indicator.clone());

    let total_samples = request.total_samples();
    let interval_secs = request.interval_secs();
    let path = ctx.settings.log_path(&request.label);
    let mut report = SessionReport::new(&request.label, path.clone(), total_samples);

    log_info!(
        "Starting logging {} '{}': {}s at {}Hz ({} samples, interval {:.2}s), start {} {}",
        report.id,
        request.label,
        request.duration_s,
        request.sample_rate_hz,
        total_samples,
        interval_secs,
        request.start_date,
        request.clock_time
    );

    let mut log_file = match open_log_file(&path, &ctx.sensors) {
        Ok(file) => file,
        Err(err) => {
            log_error!("Cannot create log file for '{}': {err:#}", request.label);
            report.outcome = SessionOutcome::Aborted(AbortReason::LogFile(format!("{err:#}")));
            return report;
        }
    };

    sample_loop(ctx, request, cancel, &mut log_file, &mut report).await;
    drop(log_file);

    log_info!(
        "Logging '{}' finished ({:?}): {}/{} samples logged successfully, {} failed",
        request.label,
        report.outcome,
        report.successful,
        total_samples,
        report.failed
    );

    report
}

/// The tick loop proper. Rows go to `sink`; a failed write counts against the
/// error streak exactly like a sensor fault.
async fn sample_loop<W: Write>(
    ctx: &SessionContext,
    request: &LoggingRequest,
    cancel: &CancellationToken,
    sink: &mut W,
    report: &mut SessionReport,
) {
    let settings = &ctx.settings;
    let total_samples = report.total_samples;
    let interval_secs = request.interval_secs();
    let interval = Duration::try_from_secs_f64(interval_secs).unwrap_or(Duration::MAX);
    let mut consecutive_errors: u32 = 0;

    for i in 0..total_samples {
        if i % 10 == 0 || i < 3 {
            log_debug!("Logging sample {}/{}", i + 1, total_samples);
        }

        let tick = ctx.sensors.read();
        let timestamp = sample_timestamp(
            request.start_date,
            request.clock_time,
            i as f64 * interval_secs,
            settings.date_rollover,
        );
        let row = format!("{timestamp},{}\n", tick.to_csv_fields());

        let written = match append_row(sink, &row) {
            Ok(()) => {
                report.rows_written += 1;
                true
            }
            Err(err) => {
                log_warn!("File write error at sample {}: {err:#}", i + 1);
                false
            }
        };

        if written && !tick.has_fault() {
            report.successful += 1;
            consecutive_errors = 0;
        } else {
            report.failed += 1;
            consecutive_errors += 1;
        }

        if consecutive_errors >= settings.max_consecutive_errors {
            log_error!(
                "Stopping '{}': {} consecutive errors at sample {}",
                request.label,
                consecutive_errors,
                i + 1
            );
            report.outcome =
                SessionOutcome::Aborted(AbortReason::ConsecutiveErrors(consecutive_errors));
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel.cancelled() => {
                log_warn!("Logging '{}' cancelled after {} samples", request.label, i + 1);
                report.outcome = SessionOutcome::Aborted(AbortReason::Cancelled);
                break;
            }
        }
    }
}

/// Writes the header into a fresh file, then reopens it for appending rows.
fn open_log_file(path: &Path, sensors: &SensorFacade) -> Result<File> {
    let header = format!("Time,{ENV_COLUMNS},{}\n", sensors.capsense_header());

    {
        let mut file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        file.write_all(header.as_bytes())
            .with_context(|| format!("failed to write header to {}", path.display()))?;
    }

    OpenOptions::new()
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {} for append", path.display()))
}

fn append_row<W: Write>(sink: &mut W, row: &str) -> Result<()> {
    sink.write_all(row.as_bytes())?;
    sink.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensing::{
        CapsenseLayout, CapsenseSensor, EnvironmentReading, EnvironmentSensor, SimulatedCapsense,
    };
    use crate::session::indicator::testing::RecordingIndicator;
    use crate::session::request::{ClockTime, StartDate};
    use anyhow::bail;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails every read whose index is in `failing`.
    struct ScriptedEnv {
        reads: AtomicUsize,
        failing: Vec<usize>,
    }

    impl ScriptedEnv {
        fn healthy() -> Self {
            Self::failing(Vec::new())
        }

        fn failing(failing: Vec<usize>) -> Self {
            Self {
                reads: AtomicUsize::new(0),
                failing,
            }
        }

        fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    impl EnvironmentSensor for ScriptedEnv {
        fn read(&self) -> anyhow::Result<EnvironmentReading> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(&n) {
                bail!("bus error on read {n}");
            }
            Ok(EnvironmentReading {
                temperature: 20.0,
                humidity: 50.0,
                pressure: 1000.0,
            })
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        ctx: SessionContext,
        env: Arc<ScriptedEnv>,
        lamp: Arc<RecordingIndicator>,
    }

    fn fixture(env: ScriptedEnv, capsense: Option<Arc<dyn CapsenseSensor>>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let env = Arc::new(env);
        let lamp = Arc::new(RecordingIndicator::default());
        let settings = SessionSettings {
            log_dir: dir.path().to_path_buf(),
            ..SessionSettings::default()
        };
        let ctx = SessionContext::new(
            SensorFacade::new(env.clone(), capsense),
            lamp.clone(),
            settings,
        );
        Fixture {
            _dir: dir,
            ctx,
            env,
            lamp,
        }
    }

    fn request(label: &str, duration_s: u64, sample_rate_hz: f64) -> LoggingRequest {
        LoggingRequest {
            duration_s,
            sample_rate_hz,
            label: label.into(),
            clock_time: ClockTime::from_hm(12, 0),
            start_date: StartDate {
                year: 2024,
                month: 1,
                day: 1,
            },
        }
    }

    fn read_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn writes_header_and_one_row_per_sample() {
        let fx = fixture(ScriptedEnv::healthy(), None);
        let report = run_session(&fx.ctx, &request("bench", 5, 1.0), &CancellationToken::new()).await;

        assert_eq!(report.outcome, SessionOutcome::Completed);
        assert_eq!(report.total_samples, 5);
        assert_eq!(report.rows_written, 5);
        assert_eq!(report.successful, 5);

        let lines = read_lines(&report.path);
        assert_eq!(
            lines[0],
            "Time,BME280_temperature,BME280_humidity,BME280_pressure,capsense_unavailable"
        );
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[1], "2024-01-01 12:00:00.000,20.00,50.00,1000.00,NO_SENSOR");
        assert_eq!(lines[5], "2024-01-01 12:00:04.000,20.00,50.00,1000.00,NO_SENSOR");
    }

    #[tokio::test(start_paused = true)]
    async fn every_row_matches_header_width() {
        let capsense: Arc<dyn CapsenseSensor> =
            Arc::new(SimulatedCapsense::new(CapsenseLayout::default()));
        let fx = fixture(ScriptedEnv::failing(vec![1]), Some(capsense));
        let report = run_session(&fx.ctx, &request("wide", 4, 1.0), &CancellationToken::new()).await;

        let lines = read_lines(&report.path);
        let width = lines[0].split(',').count();
        assert_eq!(width, 1 + 3 + 9);
        assert_eq!(lines.len(), 5);
        for line in &lines[1..] {
            assert_eq!(line.split(',').count(), width, "row {line}");
        }
        assert!(lines[2].contains(",ERROR,ERROR,ERROR,"));
        assert_eq!(report.failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_samples_writes_header_only() {
        let fx = fixture(ScriptedEnv::healthy(), None);
        let started = tokio::time::Instant::now();
        let report = run_session(&fx.ctx, &request("tiny", 1, 0.5), &CancellationToken::new()).await;

        assert_eq!(report.outcome, SessionOutcome::Completed);
        assert_eq!(report.total_samples, 0);
        assert_eq!(read_lines(&report.path).len(), 1);
        assert_eq!(fx.env.reads(), 0);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_planned_rows() {
        let fx = fixture(ScriptedEnv::healthy(), None);
        let report = run_session(&fx.ctx, &request("rate", 7, 0.3), &CancellationToken::new()).await;

        assert_eq!(report.total_samples, 2);
        assert_eq!(read_lines(&report.path).len(), 3);
        assert_eq!(fx.env.reads(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn five_consecutive_faults_abort_the_session() {
        let fx = fixture(ScriptedEnv::failing(vec![2, 3, 4, 5, 6, 7, 8]), None);
        let report =
            run_session(&fx.ctx, &request("flaky", 20, 1.0), &CancellationToken::new()).await;

        assert_eq!(
            report.outcome,
            SessionOutcome::Aborted(AbortReason::ConsecutiveErrors(5))
        );
        // ticks 0..=6 ran; the tick after the fifth failure never did
        assert_eq!(fx.env.reads(), 7);
        assert_eq!(report.successful, 2);
        assert_eq!(report.failed, 5);
        assert_eq!(read_lines(&report.path).len(), 1 + 7);
        assert!(!fx.lamp.is_lit());
    }

    /// Accepts `ok_writes` rows, then fails every write.
    struct FlakySink {
        ok_writes: usize,
        rows: Vec<u8>,
    }

    impl Write for FlakySink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.ok_writes == 0 {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
            }
            self.ok_writes -= 1;
            self.rows.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn write_failures_trip_the_breaker() {
        let fx = fixture(ScriptedEnv::healthy(), None);
        let request = request("full", 20, 1.0);
        let mut sink = FlakySink {
            ok_writes: 2,
            rows: Vec::new(),
        };
        let mut report = SessionReport::new("full", PathBuf::from("full.csv"), 20);

        sample_loop(&fx.ctx, &request, &CancellationToken::new(), &mut sink, &mut report).await;

        assert_eq!(
            report.outcome,
            SessionOutcome::Aborted(AbortReason::ConsecutiveErrors(5))
        );
        assert_eq!(fx.env.reads(), 7);
        assert_eq!(report.rows_written, 2);
        assert_eq!(report.successful, 2);
        assert_eq!(report.failed, 5);
        assert_eq!(String::from_utf8(sink.rows).unwrap().lines().count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn a_clean_tick_resets_the_error_streak() {
        let fx = fixture(ScriptedEnv::failing(vec![0, 1, 2, 3, 5, 6, 7, 8]), None);
        let report = run_session(&fx.ctx, &request("streak", 10, 1.0), &CancellationToken::new()).await;

        assert_eq!(report.outcome, SessionOutcome::Completed);
        assert_eq!(report.rows_written, 10);
        assert_eq!(report.failed, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_between_ticks() {
        let fx = fixture(ScriptedEnv::healthy(), None);
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2_500)).await;
            canceller.cancel();
        });

        let report = run_session(&fx.ctx, &request("stopme", 100, 1.0), &cancel).await;

        assert_eq!(report.outcome, SessionOutcome::Aborted(AbortReason::Cancelled));
        assert_eq!(report.rows_written, 3);
        assert!(!fx.lamp.is_lit());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_log_dir_aborts_before_sampling() {
        let fx = fixture(ScriptedEnv::healthy(), None);
        let mut settings = (*fx.ctx.settings).clone();
        settings.log_dir = fx._dir.path().join("does/not/exist");
        let ctx = SessionContext::new(fx.ctx.sensors.clone(), fx.lamp.clone(), settings);

        let report = run_session(&ctx, &request("nowhere", 10, 1.0), &CancellationToken::new()).await;

        assert!(matches!(
            report.outcome,
            SessionOutcome::Aborted(AbortReason::LogFile(_))
        ));
        assert_eq!(fx.env.reads(), 0);
        assert_eq!(fx.lamp.activations(), 1);
        assert!(!fx.lamp.is_lit());
    }

    #[tokio::test(start_paused = true)]
    async fn indicator_is_lit_only_while_running() {
        let fx = fixture(ScriptedEnv::healthy(), None);
        let ctx = fx.ctx.clone();
        let handle = tokio::spawn(async move {
            run_session(&ctx, &request("lamp", 3, 1.0), &CancellationToken::new()).await
        });

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(fx.lamp.is_lit());

        handle.await.unwrap();
        assert!(!fx.lamp.is_lit());
    }
}
