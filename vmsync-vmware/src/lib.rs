//! VMware vCenter provider for vmsync.
//!
//! Uses the vSphere Automation REST API (`/api`, vCenter 7.0+) with a session
//! token obtained through basic auth. Guest network data requires VMware
//! Tools in the guest.

mod client;
pub mod models;
mod provider;

pub use provider::{PROVIDER_NAME, VmwareProvider};
