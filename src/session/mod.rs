pub mod batch;
pub mod clock;
pub mod controller;
pub mod engine;
pub mod indicator;
pub mod request;
pub mod state;

pub use clock::DateRollover;
pub use controller::SessionController;
pub use engine::{
    run_session, AbortReason, SessionContext, SessionOutcome, SessionReport, SessionSettings,
};
pub use indicator::{Indicator, IndicatorGuard, LogIndicator};
pub use request::{ClockTime, LoggingRequest, StartDate};
pub use state::{SessionKind, SessionState};
