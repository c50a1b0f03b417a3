pub mod db;
pub mod session;
pub mod session_store;

pub use db::PaperflowDb;

pub use session::{
    LogEntry, LogLevel, Outcome, PaperReport, RunMetrics, Session, SessionError, SessionSummary,
    StageOutput, StatusView,
};
pub use session_store::{SessionStore, StoreError};
