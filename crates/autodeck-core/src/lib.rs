//! autodeck-core: autonomous mixing orchestration
//!
//! This crate drives a third-party DJ application that can only be steered
//! through relative, unacknowledged commands. It provides:
//!
//! - Harmonic wheel key model and compatibility matching
//! - A read-only track catalog mirroring the application's browse tree
//! - The device command vocabulary and channel abstraction
//! - Dead-reckoning browse navigation with re-homing
//! - The next-track decision service boundary
//! - The session state machine and its control surface

pub mod catalog;
pub mod config;
pub mod decision;
pub mod device;
pub mod error;
pub mod matcher;
pub mod music;
pub mod navigation;
pub mod session;
pub mod types;

pub use catalog::{Catalog, CatalogScope, InMemoryCatalog};
pub use device::{CommandChannel, DeviceCommand, DeviceError};
pub use error::{CycleError, LoadError, SessionError};
pub use music::HarmonicKey;
pub use session::{SessionController, SessionPhase, SessionStatus};
pub use types::{DeckId, Track, TrackId};
