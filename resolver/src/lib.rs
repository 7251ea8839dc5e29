// The changes suggested by this lint usually make the code more cluttered and less clear:
#![allow(clippy::needless_range_loop)]

pub mod bootstrap;
pub mod observer;
pub mod placement;
pub mod resolve;
pub mod settings;
pub mod spoiler_log;
pub mod traverse;

pub use observer::{LogObserver, NoopObserver, ResolverObserver, RollbackLogEntry};
pub use resolve::{ActionPriority, ResolveFailure, resolve, resolve_from_state};
pub use settings::{ResolverSettings, VictoryMode};
pub use spoiler_log::{ActionEntry, ActionPath};
pub use traverse::{ResolverReach, accessible_items, calculate_reach};
