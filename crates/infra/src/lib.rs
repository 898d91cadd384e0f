//! Infrastructure layer: storage, command dispatch, incident recording,
//! configuration and the application service the API calls into.

pub mod bootstrap;
pub mod config;
pub mod dispatcher;
pub mod notifier;
pub mod recorder;
pub mod service;
pub mod store;

pub use bootstrap::{BootstrapReport, ADMINISTRATOR_PROFILE};
pub use config::WardenConfig;
pub use dispatcher::{AccountDispatcher, DispatchError, Dispatched};
pub use notifier::{Notifier, OutboxNotifier, ResetNotice, TracingNotifier};
pub use recorder::IncidentRecorder;
pub use service::{AccessControl, Actor, ServiceError};
pub use store::{AccessStore, InMemoryAccessStore, StoreError};
