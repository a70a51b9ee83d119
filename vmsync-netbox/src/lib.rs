//! NetBox adapters for vmsync.
//!
//! [`NetBoxClient`] implements the engine's `Registry` against the NetBox
//! REST API. [`NetBoxProvider`] reads a (filtered) NetBox instance as a VM
//! source, so one NetBox can be synced into another.

pub mod client;
pub mod models;
pub mod provider;
mod registry;

pub use client::NetBoxClient;
pub use provider::NetBoxProvider;
