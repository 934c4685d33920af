//! Persistence pacing.
//!
//! Progress signals arrive far more often than the state file needs to be
//! rewritten; the throttle here bounds write frequency on that hot path.

mod throttle;

pub use throttle::PersistThrottle;
