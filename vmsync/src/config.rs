//! Command line and environment configuration.

use clap::{Parser, ValueEnum};
use vmsync_engine::{DEFAULT_GRACE_PERIOD_DAYS, SyncConfig};

/// Upper bound for `PRUNE_GRACE_DAYS` (100 years).
pub const MAX_GRACE_PERIOD_DAYS: i64 = 36_500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    Proxmox,
    Vmware,
    Netbox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Synchronize VMs from a hypervisor manager into NetBox
#[derive(Parser, Debug)]
#[command(name = "vmsync", version, about)]
pub struct Args {
    /// NetBox URL of the registry (e.g., https://netbox.example.com)
    #[arg(long, env = "NETBOX_URL")]
    pub netbox_url: String,

    /// NetBox API token of the registry
    #[arg(long, env = "NETBOX_TOKEN", hide_env_values = true)]
    pub netbox_token: String,

    /// VM source
    #[arg(long, env = "PROVIDER", value_enum, default_value = "vmware", ignore_case = true)]
    pub provider: ProviderKind,

    /// Provider API URL
    #[arg(long, env = "PROVIDER_URL")]
    pub provider_url: String,

    /// Provider user (vCenter user, Proxmox token ID such as root@pam!vmsync)
    #[arg(long, env = "PROVIDER_USER", default_value = "")]
    pub provider_user: String,

    /// Provider password or token secret
    #[arg(long, env = "PROVIDER_TOKEN", hide_env_values = true)]
    pub provider_token: String,

    /// NetBox query filter when NetBox is the source (e.g., tag=prod&site=fra1)
    #[arg(long, env = "PROVIDER_FILTER")]
    pub provider_filter: Option<String>,

    /// Days a VM stays decommissioning before it is deleted
    #[arg(long, env = "PRUNE_GRACE_DAYS", default_value_t = DEFAULT_GRACE_PERIOD_DAYS,
          value_parser = clap::value_parser!(i64).range(0..=MAX_GRACE_PERIOD_DAYS))]
    pub prune_grace_days: i64,

    /// Accept invalid provider TLS certificates
    #[arg(long, env = "INSECURE_TLS", default_value_t = true, action = clap::ArgAction::Set)]
    pub insecure_tls: bool,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,
}

impl Args {
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            grace_period: chrono::Duration::days(self.prune_grace_days),
        }
    }
}
