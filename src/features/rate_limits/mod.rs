pub mod counter_store;
pub mod service;

pub use counter_store::{CounterStore, InMemoryCounterStore};
pub use service::{RateLimitClass, RateLimitService};
