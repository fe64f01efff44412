//! Multi-source navigation fusion for a marine instrument panel.
//!
//! Three collectors (serial GPS, TCP instrument feed, local IMU) write into
//! a shared [`nav_state::NavState`] blackboard. Every field carries its own
//! timestamp and producer; readers decide freshness, writers never wait on
//! each other.

pub mod calibration;
pub mod clock;
pub mod collectors;
pub mod config;
pub mod error;
pub mod fusion;
pub mod health;
pub mod live_status;
pub mod nav_state;
pub mod nmea;
pub mod publish;
pub mod retry;
pub mod sensor;
pub mod types;

pub use config::NavConfig;
pub use nav_state::{NavSnapshot, NavState, SharedNavState};
