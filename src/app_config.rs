use config::Config;
use serde::Deserialize;
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    core: Core,
    server: Server,
    #[serde(default)]
    rate_limit: RateLimit,
    tailscale: Tailscale,
    identity: Identity,
    script: Script,
    status: Status,
    #[serde(default)]
    bootstrap: Bootstrap,
}

impl AppConfig {
    pub fn load() -> Result<Self, AppConfigError> {
        let config: AppConfig = Config::builder()
            .add_source(config::File::with_name("config").required(true))
            .add_source(config::File::with_name("config_local").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Checks the settings every script request depends on. The signing key is left to the
    /// token signer, which reports it per request.
    pub fn validate(&self) -> Result<(), AppConfigError> {
        let required = [
            ("tailscale.tailnet", self.tailscale.tailnet.as_str()),
            ("tailscale.api_key", self.tailscale.api_key.expose()),
            ("script.docker_image", self.script.docker_image.as_str()),
            ("script.update_status_url", self.script.update_status_url.as_str()),
            ("status.device_update_token", self.status.device_update_token.expose()),
            ("status.admin_token", self.status.admin_token.expose()),
        ];

        match required.iter().find(|(_, value)| value.trim().is_empty()) {
            Some((key, _)) => Err(AppConfigError::Missing(*key)),
            None => Ok(()),
        }
    }

    pub fn core(&self) -> &Core {
        &self.core
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn rate_limit(&self) -> &RateLimit {
        &self.rate_limit
    }

    pub fn tailscale(&self) -> &Tailscale {
        &self.tailscale
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn bootstrap(&self) -> &Bootstrap {
        &self.bootstrap
    }
}

#[derive(Error, Debug)]
pub enum AppConfigError {
    #[error("unable to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("missing required configuration value '{0}'")]
    Missing(&'static str),
}

#[derive(Clone, Deserialize, Default)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Debug for Secret {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Deserialize)]
pub struct Core {
    #[serde(default = "default_log_level")]
    log_level: String,
}

impl Core {
    pub fn log_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }
}

impl Default for Core {
    fn default() -> Self {
        Core {
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Server {
    #[serde(default = "default_bind_address")]
    bind_address: String,
    public_url: String,
    #[serde(default)]
    trust_forwarded_for: bool,
}

impl Server {
    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }

    pub fn public_url(&self) -> &str {
        self.public_url.trim_end_matches('/')
    }

    pub fn trust_forwarded_for(&self) -> bool {
        self.trust_forwarded_for
    }
}

#[derive(Debug, Deserialize)]
pub struct RateLimit {
    #[serde(with = "humantime_serde", default = "default_ip_interval")]
    ip_interval: Duration,
    #[serde(with = "humantime_serde", default = "default_device_interval")]
    device_interval: Duration,
}

impl RateLimit {
    pub fn ip_interval(&self) -> Duration {
        self.ip_interval
    }

    pub fn device_interval(&self) -> Duration {
        self.device_interval
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        RateLimit {
            ip_interval: default_ip_interval(),
            device_interval: default_device_interval(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Tailscale {
    #[serde(default = "default_tailscale_api_url")]
    api_url: String,
    tailnet: String,
    api_key: Secret,
    #[serde(default = "default_tailscale_tag")]
    tag: String,
    #[serde(with = "humantime_serde", default = "default_key_expiry")]
    key_expiry: Duration,
    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    request_timeout: Duration,
}

impl Tailscale {
    pub fn api_url(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }

    pub fn tailnet(&self) -> &str {
        &self.tailnet
    }

    pub fn api_key(&self) -> &Secret {
        &self.api_key
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn key_expiry(&self) -> Duration {
        self.key_expiry
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

#[derive(Debug, Deserialize)]
pub struct Identity {
    #[serde(default)]
    service_account_email: String,
    private_key_pem: Option<Secret>,
    #[serde(with = "humantime_serde", default = "default_token_ttl")]
    token_ttl: Duration,
    #[serde(default = "default_audience")]
    audience: String,
}

impl Identity {
    pub fn service_account_email(&self) -> &str {
        &self.service_account_email
    }

    pub fn private_key_pem(&self) -> Option<&Secret> {
        self.private_key_pem.as_ref()
    }

    pub fn token_ttl(&self) -> Duration {
        self.token_ttl
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }
}

#[derive(Debug, Deserialize)]
pub struct Script {
    docker_image: String,
    update_status_url: String,
    #[serde(default)]
    api_key: String,
    #[serde(default)]
    project_id: String,
    auth_domain: Option<String>,
    #[serde(default = "default_container_name")]
    container_name: String,
}

impl Script {
    pub fn docker_image(&self) -> &str {
        &self.docker_image
    }

    pub fn update_status_url(&self) -> &str {
        &self.update_status_url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn auth_domain(&self) -> String {
        self.auth_domain.clone().unwrap_or_else(|| format!("{}.firebaseapp.com", self.project_id))
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }
}

#[derive(Debug, Deserialize)]
pub struct Status {
    device_update_token: Secret,
    admin_token: Secret,
}

impl Status {
    pub fn device_update_token(&self) -> &Secret {
        &self.device_update_token
    }

    pub fn admin_token(&self) -> &Secret {
        &self.admin_token
    }
}

#[derive(Debug, Deserialize)]
pub struct Bootstrap {
    #[serde(default = "default_scripts_dir")]
    scripts_dir: PathBuf,
}

impl Bootstrap {
    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }
}

impl Default for Bootstrap {
    fn default() -> Self {
        Bootstrap {
            scripts_dir: default_scripts_dir(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_ip_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_device_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_tailscale_api_url() -> String {
    "https://api.tailscale.com".to_string()
}

fn default_tailscale_tag() -> String {
    "tag:provisioned".to_string()
}

fn default_key_expiry() -> Duration {
    Duration::from_secs(600)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_token_ttl() -> Duration {
    Duration::from_secs(3600)
}

fn default_audience() -> String {
    "https://identitytoolkit.googleapis.com/google.identity.identitytoolkit.v1.IdentityToolkit".to_string()
}

fn default_container_name() -> String {
    "bacnet-service".to_string()
}

fn default_scripts_dir() -> PathBuf {
    PathBuf::from("bootstrap")
}

#[cfg(test)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

#[cfg(test)]
impl AppConfigBuilder {
    pub fn new() -> Self {
        AppConfigBuilder {
            config: AppConfig {
                core: Core::default(),
                server: Server {
                    bind_address: default_bind_address(),
                    public_url: "https://provision.example.com".to_string(),
                    trust_forwarded_for: false,
                },
                rate_limit: RateLimit::default(),
                tailscale: Tailscale {
                    api_url: "https://api.tailscale.test".to_string(),
                    tailnet: "example.ts.net".to_string(),
                    api_key: Secret::new("tskey-api-test"),
                    tag: default_tailscale_tag(),
                    key_expiry: default_key_expiry(),
                    request_timeout: Duration::from_secs(2),
                },
                identity: Identity {
                    service_account_email: "provisioner@example.iam.gserviceaccount.com".to_string(),
                    private_key_pem: Some(Secret::new(include_str!("../tests/resources/identity_test_key.pem"))),
                    token_ttl: default_token_ttl(),
                    audience: default_audience(),
                },
                script: Script {
                    docker_image: "registry.example.com/fleet/bacnet:1.4.2".to_string(),
                    update_status_url: "https://provision.example.com/status".to_string(),
                    api_key: "web-api-key".to_string(),
                    project_id: "fleet-monitor".to_string(),
                    auth_domain: None,
                    container_name: default_container_name(),
                },
                status: Status {
                    device_update_token: Secret::new("device-update-token"),
                    admin_token: Secret::new("admin-token"),
                },
                bootstrap: Bootstrap::default(),
            },
        }
    }

    pub fn tailscale_url(mut self, url: String) -> Self {
        self.config.tailscale.api_url = url;
        self
    }

    pub fn tailnet(mut self, tailnet: &str) -> Self {
        self.config.tailscale.tailnet = tailnet.to_string();
        self
    }

    pub fn private_key_pem(mut self, pem: Option<&str>) -> Self {
        self.config.identity.private_key_pem = pem.map(Secret::new);
        self
    }

    pub fn trust_forwarded_for(mut self, trust: bool) -> Self {
        self.config.server.trust_forwarded_for = trust;
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}
