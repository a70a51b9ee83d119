//! Proxmox VE provider for vmsync.
//!
//! Talks to the PVE REST API (`/api2/json`) with an API token. A PVE
//! installation is exposed as a single datacenter holding its cluster (or
//! standalone node); VM details come from the VM config and, when the QEMU
//! guest agent runs, from the agent's view of the network interfaces.

mod client;
pub mod models;
mod provider;

pub use provider::{PROVIDER_NAME, ProxmoxProvider};
