use crate::api::ApiState;
use crate::app_config::AppConfig;
use crate::bootstrap::BootstrapLibrary;
use crate::credentials::{CredentialIssuer, CustomTokenSigner, TailscaleClient};
use crate::provisioning::ProvisioningOrchestrator;
use crate::rate_limit::{MemoryRateLimitStore, RateLimiter};
use crate::registry::{DeviceRegistry, MemoryDeviceStore};
use crate::script::ScriptGenerator;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

mod api;
mod app_config;
mod bootstrap;
mod credentials;
mod domain;
mod provisioning;
mod rate_limit;
mod registry;
mod script;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    tracing_subscriber::fmt().with_max_level(config.core().log_level()).init();

    info!("🪵 Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    info!("✅  Loaded configuration");

    let tailscale_client = credentials::new_client(config.tailscale())?;
    let credentials = CredentialIssuer::new(
        Arc::new(CustomTokenSigner::from_config(config.identity())),
        Arc::new(TailscaleClient::new(tailscale_client, config.tailscale())),
    );
    info!("✅  Initialized credential issuers");

    let scripts = ScriptGenerator::from_config(config.script(), config.status().device_update_token())?;
    info!("✅  Loaded provisioning script template");

    let orchestrator = ProvisioningOrchestrator::new(
        DeviceRegistry::new(Arc::new(MemoryDeviceStore::new())),
        RateLimiter::new(
            Arc::new(MemoryRateLimitStore::new()),
            config.rate_limit().ip_interval(),
            config.rate_limit().device_interval(),
        ),
        credentials,
        scripts,
        config.server().public_url(),
    );

    let bootstrap_scripts = bootstrap::load_scripts_from(config.bootstrap().scripts_dir()).await?;
    let bootstrap = BootstrapLibrary::new(Arc::new(bootstrap_scripts));

    let state = Arc::new(ApiState::new(orchestrator, bootstrap, &config));
    let listener = TcpListener::bind(config.server().bind_address()).await?;
    info!("🔥 {} is up and running on {}", env!("CARGO_PKG_NAME"), listener.local_addr()?);

    axum::serve(listener, api::router(state).into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
