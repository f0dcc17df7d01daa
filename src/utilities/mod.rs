//! Small shared helpers.

pub mod chunking;
pub mod text;

use chrono::{DateTime, SubsecRound, Utc};

/// Current time at the precision the store keeps (microseconds).
///
/// Records stamped with this round-trip through the database unchanged.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
