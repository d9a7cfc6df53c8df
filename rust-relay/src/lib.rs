//! Samsara relay - verifying webhook relay for geofence events.
//!
//! Receives signed webhooks from Samsara, admits them by origin, verifies the
//! HMAC signature, keeps only the relevant event types and forwards them to
//! Make.com and/or IFTTT.
//!
//! ## Architecture
//!
//! ```text
//! Samsara → origin gate → signature check → classifier → dispatcher ─┬→ Make.com
//!                                                                    └→ IFTTT
//! ```

pub mod classify;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod web;

// Re-export commonly used types
pub use classify::{Classification, EventClassifier};
pub use config::Config;
pub use dispatch::{
    Destination, DestinationChoice, DestinationConfig, DispatchOutcome, DispatchResult, Dispatcher,
};
pub use error::{ConfigError, RelayError, SendError};
pub use web::{router, AppState};
