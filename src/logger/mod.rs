//! Process-wide tracing setup for the `campus-session` binaries.

mod logger;
pub use logger::*;

pub use tracing::{debug, error, info, trace, warn};
