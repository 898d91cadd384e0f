//! `warden-reference`: classification metadata (roles, statuses) and the
//! tiered code-to-label resolution used by display layers.
//!
//! This is a pure read path. Nothing here mutates accounts.

pub mod cache;
pub mod item;
pub mod resolve;
pub mod source;

pub use cache::ReferenceDataCache;
pub use item::{default_items, ReferenceItem, MODULE_USERS, TYPE_ROLE, TYPE_STATUS};
pub use resolve::{resolve, ResolveRequest, ResolvedLabel, Tier};
pub use source::{JsonFileSource, ReferenceDataSource, ReferenceError, StaticSource};
