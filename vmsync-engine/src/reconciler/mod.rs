//! Reconciliation components.
//!
//! Each component compares provider state with the registry for one concern
//! and issues the writes needed to converge:
//! - `schema`: custom fields and the provider's cluster type
//! - `matcher`: provider VM → registry record
//! - `creator`: new registry VM with interfaces and addresses
//! - `updater`: field-level diff of a matched VM
//! - `pruner`: decommission-then-delete of VMs gone from the provider

pub mod creator;
pub mod interface;
pub mod matcher;
pub mod pruner;
pub mod schema;
pub mod updater;

pub use creator::VmCreator;
pub use interface::NicChanges;
pub use matcher::VmMatcher;
pub use pruner::{PruneDecision, PruneSummary, Pruner};
pub use schema::{SchemaBootstrapper, required_custom_fields};
pub use updater::{UpdateSummary, VmUpdater};
