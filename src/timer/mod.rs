pub mod controller;
pub mod state;

pub use controller::{CompletedSession, SessionTimer, StopOutcome};
pub use state::{reconcile, Reconciliation, SessionState, SessionStatus};
