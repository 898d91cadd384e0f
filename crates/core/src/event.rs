//! Domain event contract.

use chrono::{DateTime, Utc};

/// A fact emitted by an aggregate.
///
/// Security-state transitions are events; each applied event is also the
/// source of exactly one audit incident, so the stable `event_type` name is
/// what shows up in logs next to the incident type.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable dotted name, e.g. `"account.login_failed"`.
    fn event_type(&self) -> &'static str;

    /// Business time at which the transition happened.
    fn occurred_at(&self) -> DateTime<Utc>;
}
