//! Persistent snapshot state for the coordinator.

pub mod store;

pub use store::SnapshotStore;
