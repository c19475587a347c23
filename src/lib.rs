//! Gym Attendance Library
//!
//! Authenticated polling client for live gym occupancy: token session, gym
//! directory resolution, attendance lookups and the monitor that drives them.

pub mod attendance;
pub mod config;
pub mod directory;
pub mod error;
pub mod monitor;
pub mod session;
pub mod traits;

// Re-export commonly used types
pub use attendance::{AttendanceClient, AttendanceLevel, AttendanceSnapshot};
pub use config::AppConfig;
pub use directory::{GymDirectory, GymRecord, best_match, edit_distance, normalize_name};
pub use error::MonitorError;
pub use monitor::{AttendanceReport, CheckTrigger, HOME_GYM, Monitor, MonitorState, poll_interval};
pub use session::{Credentials, TokenSession};
pub use traits::{Clock, MockClock, RecordingReporter, Reporter, SystemClock};
