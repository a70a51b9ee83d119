//! vmsync: one-shot synchronization of hypervisor VMs into NetBox.
//!
//! Each run:
//! - Ensures the `vmid`/`vmprovider` custom fields and the provider's cluster type
//! - Mirrors datacenters and clusters as NetBox cluster groups and clusters
//! - Creates, updates and retags VMs, interfaces and IP addresses
//! - Decommissions VMs gone from the provider and deletes them after the grace period

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vmsync_engine::{Provider, SyncService};
use vmsync_netbox::{NetBoxClient, NetBoxProvider};
use vmsync_proxmox::ProxmoxProvider;
use vmsync_vmware::VmwareProvider;

mod config;

use config::{Args, LogFormat, ProviderKind};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // A missing .env is fine
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    init_logging(args.log_format);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Sync failed");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "vmsync=info,vmsync_engine=info,vmsync_netbox=info,vmsync_proxmox=info,vmsync_vmware=info,reqwest=warn,hyper=warn"
            .into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

async fn connect_provider(args: &Args) -> Result<Arc<dyn Provider>> {
    let provider: Arc<dyn Provider> = match args.provider {
        ProviderKind::Proxmox => Arc::new(
            ProxmoxProvider::connect(
                &args.provider_url,
                &args.provider_user,
                &args.provider_token,
                args.insecure_tls,
            )
            .await
            .context("Failed to connect to Proxmox")?,
        ),
        ProviderKind::Vmware => Arc::new(
            VmwareProvider::connect(
                &args.provider_url,
                &args.provider_user,
                &args.provider_token,
                args.insecure_tls,
            )
            .await
            .context("Failed to connect to vCenter")?,
        ),
        ProviderKind::Netbox => {
            let client = NetBoxClient::new(&args.provider_url, &args.provider_token)
                .context("Invalid source NetBox configuration")?;
            Arc::new(
                NetBoxProvider::new(client, args.provider_filter.as_deref())
                    .await
                    .context("Failed to load source NetBox")?,
            )
        }
    };
    Ok(provider)
}

async fn run(args: Args) -> Result<()> {
    info!(
        provider = ?args.provider,
        provider_url = %args.provider_url,
        netbox_url = %args.netbox_url,
        grace_days = args.prune_grace_days,
        "Starting vmsync"
    );

    let registry = NetBoxClient::new(&args.netbox_url, &args.netbox_token)
        .context("Invalid NetBox configuration")?;
    let provider = connect_provider(&args).await?;

    let service = SyncService::new(Arc::new(registry), provider, args.sync_config());
    let report = service.run().await.context("Sync pass aborted")?;

    info!(
        clusters = report.clusters,
        vms = report.vms_seen,
        created = report.created,
        updated = report.updated,
        unchanged = report.unchanged,
        failed = report.failed,
        decommissioned = report.decommissioned,
        deleted = report.deleted,
        prune_failed = report.prune_failed,
        "Sync complete: {}",
        report
    );
    Ok(())
}
