use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionKind {
    #[default]
    None,
    Single,
    Batch,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::None => "none",
            SessionKind::Single => "single",
            SessionKind::Batch => "batch",
        }
    }
}

/// Process-wide record of the running session, read by `/status`.
///
/// Inactive state always has `kind == None` and an empty label.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub active: bool,
    pub label: String,
    pub kind: SessionKind,
    pub started_at: Option<DateTime<Utc>>,
    pub planned_secs: u64,
    /// Monotonic anchor for elapsed time.
    pub start_anchor: Option<Instant>,
    pub cancel: Option<CancellationToken>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(
        &mut self,
        kind: SessionKind,
        label: String,
        planned_secs: u64,
        now: Instant,
        cancel: CancellationToken,
    ) {
        *self = Self {
            active: true,
            label,
            kind,
            started_at: Some(Utc::now()),
            planned_secs,
            start_anchor: Some(now),
            cancel: Some(cancel),
        };
    }

    pub fn elapsed_secs(&self, now: Instant) -> u64 {
        match (self.active, self.start_anchor) {
            (true, Some(anchor)) => now.saturating_duration_since(anchor).as_secs(),
            _ => 0,
        }
    }

    pub fn remaining_secs(&self, now: Instant) -> u64 {
        if !self.active {
            return 0;
        }
        self.planned_secs.saturating_sub(self.elapsed_secs(now))
    }

    /// `ACTIVE: <kind> '<label>' - <e>s elapsed, <r>s remaining` or `IDLE`.
    pub fn status_line(&self, now: Instant) -> String {
        if !self.active {
            return "IDLE".to_string();
        }
        format!(
            "ACTIVE: {} '{}' - {}s elapsed, {}s remaining",
            self.kind.as_str(),
            self.label,
            self.elapsed_secs(now),
            self.remaining_secs(now)
        )
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
