//! Durable storage for events, connections, and trips.

pub mod connection_store;
pub mod event_store;
pub mod trip_store;

pub use connection_store::ConnectionStore;
pub use event_store::{EventStore, InMemoryEventStore};
pub use trip_store::{InMemoryTripStore, TripStore};

#[cfg(feature = "aof")]
pub use event_store::PersistentEventStore;
