//! Autonomous session sequencing
//!
//! A session alternates two decks: while one is audible the next track is
//! chosen, navigated to, loaded onto the other deck and armed, then the
//! crossfader is ramped across and the roles swap.
//!
//! - [`SessionController`] - control surface (start, stop, status, log)
//! - `machine` - the single coordinating task that owns the device link
//! - [`SessionState`] / [`DeckState`] - believed session and deck state
//! - [`EventLog`] - append-only decision trail
//! - [`SessionReport`] - JSON report written when a session finishes

mod controller;
mod events;
mod machine;
mod report;
mod state;

pub use controller::SessionController;
pub use events::{DecisionSource, EventKind, EventLog, SessionEvent};
pub use machine::{Correction, SessionContext};
pub use report::SessionReport;
pub use state::{DeckState, DeckStatus, SessionPhase, SessionState, SessionStatus};
