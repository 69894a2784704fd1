//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `COLABCTL_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `COLABCTL_` override YAML values
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `COLABCTL_SESSIONS__BOOT_DELAY=10s` sets the `sessions.boot_delay` field.
//!
//! ## Configuration Structure
//!
//! - **Server**: `host`, `port` - HTTP server binding configuration
//! - **Features**: `enable_metrics`, `enable_otel_export` - Optional feature toggles
//! - **CORS**: `cors.allowed_origins`, `cors.allow_credentials` - Browser client access
//! - **GPUs**: `gpus.device_ids` - Physical GPU ids handed out to sessions
//! - **Bookings**: `bookings.max_gpus_per_booking` - Calendar booking limits
//! - **Sessions**: `sessions.*` - Notebook container parameters
//! - **Container runtime**: `container_runtime` - `simulated` or `docker`
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! COLABCTL_PORT=8080
//! COLABCTL_GPUS__DEVICE_IDS=[0,1]
//! COLABCTL_CONTAINER_RUNTIME=simulated
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, path::PathBuf, time::Duration};
use url::Url;

use crate::types::GpuId;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "COLABCTL_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// All fields have defaults defined in the `Default` implementation, so an empty or missing
/// config file yields a working development setup with the simulated runtime.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Expose Prometheus metrics at `/internal/metrics`
    pub enable_metrics: bool,
    /// Export traces over OTLP, configured through the standard `OTEL_*` environment variables
    pub enable_otel_export: bool,
    /// CORS configuration for browser clients
    pub cors: CorsConfig,
    /// Physical GPUs available to notebook sessions
    pub gpus: GpuConfig,
    /// Calendar booking limits
    pub bookings: BookingsConfig,
    /// Notebook session and container parameters
    pub sessions: SessionsConfig,
    /// How notebook containers are run
    pub container_runtime: ContainerRuntimeConfig,
}

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Allow credentials (cookies) in CORS requests
    pub allow_credentials: bool,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

/// GPU pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct GpuConfig {
    /// Device indices handed out to sessions, lowest first
    pub device_ids: Vec<GpuId>,
}

/// Calendar booking configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BookingsConfig {
    /// Largest `gpuCount` a single booking may request
    pub max_gpus_per_booking: u32,
}

/// Notebook session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionsConfig {
    /// Time between container launch and the session being reported as running
    #[serde(with = "humantime_serde")]
    pub boot_delay: Duration,
    /// First host port available for notebook containers
    pub port_base: u16,
    /// Number of host ports, starting at `port_base`, that sessions may use
    pub port_span: u16,
    /// Host directory under which per-session workspaces live (`{root}/{user}/{session}`)
    pub workspace_root: PathBuf,
    /// Prefix for container names; the session id is appended
    pub container_name_prefix: String,
    /// Notebook container image
    pub image: String,
    /// Container memory limit
    pub memory_limit_bytes: u64,
    /// Container CPU limit
    pub cpus: u32,
}

/// Container runtime selection.
///
/// ```yaml
/// container_runtime: simulated
/// # or
/// container_runtime:
///   docker:
///     binary: /usr/bin/docker
///     docker_host: unix:///var/run/docker.sock
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerRuntimeConfig {
    /// In-process fake runtime, no containers are started
    #[default]
    Simulated,
    /// Drive the Docker CLI on this host
    Docker(DockerRuntimeConfig),
}

/// Docker CLI runtime configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DockerRuntimeConfig {
    /// Path or name of the docker binary
    pub binary: String,
    /// Value for `DOCKER_HOST`; the CLI default is used when unset
    pub docker_host: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            enable_metrics: true,
            enable_otel_export: false,
            cors: CorsConfig::default(),
            gpus: GpuConfig::default(),
            bookings: BookingsConfig::default(),
            sessions: SessionsConfig::default(),
            container_runtime: ContainerRuntimeConfig::default(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            // Development frontend
            allowed_origins: Url::parse("http://localhost:3000").map(CorsOrigin::Url).into_iter().collect(),
            allow_credentials: true,
            max_age: Some(3600),
        }
    }
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            device_ids: vec![0, 1, 2, 3],
        }
    }
}

impl Default for BookingsConfig {
    fn default() -> Self {
        Self { max_gpus_per_booking: 4 }
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            boot_delay: Duration::from_secs(5),
            port_base: 8000,
            port_span: 1000,
            workspace_root: PathBuf::from("/data/workspaces"),
            container_name_prefix: "colab-session-".to_string(),
            image: "jupyter/tensorflow-notebook:latest".to_string(),
            memory_limit_bytes: 8 * 1024 * 1024 * 1024,
            cpus: 4,
        }
    }
}

impl Default for DockerRuntimeConfig {
    fn default() -> Self {
        Self {
            binary: "docker".to_string(),
            docker_host: None,
        }
    }
}

/// A configuration that deserialized but cannot be run.
#[derive(Debug, thiserror::Error)]
#[error("Config validation: {0}")]
pub struct ConfigError(String);

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let config: Self = Self::figment(args).extract()?;
        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gpus.device_ids.is_empty() {
            return Err(ConfigError("gpus.device_ids cannot be empty".to_string()));
        }

        let mut seen = HashSet::new();
        if let Some(duplicate) = self.gpus.device_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(ConfigError(format!("gpus.device_ids contains GPU {duplicate} more than once")));
        }

        if self.bookings.max_gpus_per_booking == 0 {
            return Err(ConfigError("bookings.max_gpus_per_booking must be at least 1".to_string()));
        }

        if self.sessions.port_span == 0 {
            return Err(ConfigError("sessions.port_span must be at least 1".to_string()));
        }

        if u32::from(self.sessions.port_base) + u32::from(self.sessions.port_span) > u32::from(u16::MAX) + 1 {
            return Err(ConfigError(format!(
                "session port range {}..{} exceeds 65535",
                self.sessions.port_base,
                u32::from(self.sessions.port_base) + u32::from(self.sessions.port_span)
            )));
        }

        // Validate CORS configuration
        if self.cors.allowed_origins.is_empty() {
            return Err(ConfigError(
                "CORS allowed_origins cannot be empty. Add at least one allowed origin.".to_string(),
            ));
        }

        let has_wildcard = self.cors.allowed_origins.iter().any(|origin| matches!(origin, CorsOrigin::Wildcard));
        if has_wildcard && self.cors.allow_credentials {
            return Err(ConfigError(
                "CORS cannot use wildcard origin '*' with allow_credentials=true. Specify explicit origins.".to_string(),
            ));
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            .merge(Env::prefixed("COLABCTL_").split("__"))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn args(path: &str) -> Args {
        Args {
            config: path.to_string(),
            validate: false,
        }
    }

    #[test]
    fn test_defaults_without_file() {
        Jail::expect_with(|_jail| {
            let config = Config::load(&args("missing.yaml"))?;

            assert_eq!(config.port, 5000);
            assert_eq!(config.gpus.device_ids, vec![0, 1, 2, 3]);
            assert_eq!(config.bookings.max_gpus_per_booking, 4);
            assert_eq!(config.sessions.boot_delay, Duration::from_secs(5));
            assert_eq!(config.sessions.port_base, 8000);
            assert_eq!(config.sessions.port_span, 1000);
            assert_eq!(config.sessions.memory_limit_bytes, 8 * 1024 * 1024 * 1024);
            assert!(matches!(config.container_runtime, ContainerRuntimeConfig::Simulated));

            Ok(())
        });
    }

    #[test]
    fn test_yaml_sections() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
port: 7000
gpus:
  device_ids: [4, 5]
bookings:
  max_gpus_per_booking: 2
sessions:
  boot_delay: 250ms
  workspace_root: /srv/notebooks
container_runtime:
  docker:
    docker_host: unix:///run/docker.sock
"#,
            )?;

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.port, 7000);
            assert_eq!(config.gpus.device_ids, vec![4, 5]);
            assert_eq!(config.bookings.max_gpus_per_booking, 2);
            assert_eq!(config.sessions.boot_delay, Duration::from_millis(250));
            assert_eq!(config.sessions.workspace_root, PathBuf::from("/srv/notebooks"));
            // Untouched fields keep their defaults
            assert_eq!(config.sessions.cpus, 4);

            match config.container_runtime {
                ContainerRuntimeConfig::Docker(docker) => {
                    assert_eq!(docker.binary, "docker");
                    assert_eq!(docker.docker_host.as_deref(), Some("unix:///run/docker.sock"));
                }
                other => panic!("expected docker runtime, got {other:?}"),
            }

            Ok(())
        });
    }

    #[test]
    fn test_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "port: 7000\n")?;

            jail.set_env("COLABCTL_HOST", "127.0.0.1");
            jail.set_env("COLABCTL_PORT", "8080");
            jail.set_env("COLABCTL_SESSIONS__BOOT_DELAY", "10s");

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.host, "127.0.0.1");
            assert_eq!(config.port, 8080);
            assert_eq!(config.sessions.boot_delay, Duration::from_secs(10));
            assert_eq!(config.bind_address(), "127.0.0.1:8080");

            Ok(())
        });
    }

    #[test]
    fn test_unknown_field_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "sessions:\n  boot_dealy: 5s\n")?;
            assert!(Config::load(&args("test.yaml")).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_validation_rejects_bad_gpu_pool() {
        Jail::expect_with(|jail| {
            jail.create_file("empty.yaml", "gpus:\n  device_ids: []\n")?;
            let err = Config::load(&args("empty.yaml")).unwrap_err();
            assert!(err.to_string().contains("device_ids cannot be empty"), "{err}");

            jail.create_file("dupes.yaml", "gpus:\n  device_ids: [0, 1, 1]\n")?;
            let err = Config::load(&args("dupes.yaml")).unwrap_err();
            assert!(err.to_string().contains("GPU 1 more than once"), "{err}");

            Ok(())
        });
    }

    #[test]
    fn test_validation_rejects_zero_limits() {
        let mut config = Config::default();
        config.bookings.max_gpus_per_booking = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.sessions.port_span = 0;
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "Config validation: sessions.port_span must be at least 1");

        let mut config = Config::default();
        config.sessions.port_base = 65_000;
        config.sessions.port_span = 1000;
        assert!(config.validate().is_err());

        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_cors_wildcard_with_credentials_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
cors:
  allowed_origins: ["*"]
  allow_credentials: true
"#,
            )?;
            let err = Config::load(&args("test.yaml")).unwrap_err();
            assert!(err.to_string().contains("wildcard"), "{err}");

            jail.create_file(
                "ok.yaml",
                r#"
cors:
  allowed_origins: ["*", "https://app.example.com"]
  allow_credentials: false
"#,
            )?;
            let config = Config::load(&args("ok.yaml"))?;
            assert!(matches!(config.cors.allowed_origins[0], CorsOrigin::Wildcard));
            assert!(matches!(config.cors.allowed_origins[1], CorsOrigin::Url(_)));

            Ok(())
        });
    }
}
