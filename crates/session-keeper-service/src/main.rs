//! # Session-Keeper Service
//!
//! Binary entry point for the Session-Keeper HTTP service.
//!
//! This executable:
//! - Loads service configuration from files and environment
//! - Loads secret rotation settings from the environment
//! - Initializes logging
//! - Builds the secret store, scheduler and validation gateway explicitly
//! - Restores the secret backup and starts automatic rotation
//! - Runs the HTTP server until SIGINT/SIGTERM, then persists final state

use session_keeper_api::{shutdown_signal, start_server, AppState, ServiceConfig, ServiceError};
use session_keeper_core::{
    HmacCookieSigner, NotificationHub, RotationScheduler, SecretRotationConfig, SecretStore,
    SecretValidationGateway,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable naming an explicit configuration file
const CONFIG_FILE_ENV: &str = "SK_CONFIG_FILE";

/// Prefix of configuration environment variables (`SK__SERVER__PORT`)
const CONFIG_ENV_PREFIX: &str = "SK";

const EXIT_BIND_FAILED: i32 = 1;
const EXIT_SERVER_FAILED: i32 = 2;
const EXIT_CONFIGURATION: i32 = 3;
const EXIT_SECRET_UNAVAILABLE: i32 = 4;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "session_keeper_service=info,session_keeper_api=info,session_keeper_core=info,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Session-Keeper Service");

    let explicit_path = std::env::var(CONFIG_FILE_ENV).ok();
    let service_config = match load_service_config(explicit_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load service configuration; aborting");
            std::process::exit(EXIT_CONFIGURATION);
        }
    };

    if let Err(e) = service_config.validate() {
        error!(error = %e, "Service configuration is invalid; aborting");
        std::process::exit(EXIT_CONFIGURATION);
    }

    let rotation_config = match SecretRotationConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Secret rotation configuration is invalid; aborting");
            std::process::exit(EXIT_CONFIGURATION);
        }
    };

    if rotation_config.base_secret.is_none() {
        warn!("SESSION_SECRET is not set; a random secret is generated at startup");
    }

    // -------------------------------------------------------------------------
    // Build the secret lifecycle components
    //
    // The store is the single owner of secret state. The scheduler, gateway
    // and HTTP layer all receive it by reference. The backup is restored
    // before the cookie issuer is registered so the issuer starts with the
    // restored current secret.
    // -------------------------------------------------------------------------
    let hub = Arc::new(NotificationHub::new());
    let store = match SecretStore::from_config(rotation_config.clone(), hub) {
        Ok(store) => Arc::new(store),
        Err(e) if e.is_fatal() => {
            error!(error = %e, "Cannot create secret store; aborting");
            std::process::exit(EXIT_SECRET_UNAVAILABLE);
        }
        Err(e) => {
            error!(error = %e, "Cannot create secret store; aborting");
            std::process::exit(EXIT_CONFIGURATION);
        }
    };

    let restored = store.initialize().await;
    info!(
        restored_from_backup = restored,
        backup_enabled = rotation_config.file_backup_enabled,
        "Secret store initialized"
    );

    let scheduler = Arc::new(RotationScheduler::new(store.clone()));
    let gateway = Arc::new(SecretValidationGateway::new(
        store.clone(),
        Arc::new(HmacCookieSigner::new()),
    ));

    if rotation_config.auto_rotation_enabled {
        if let Err(e) = scheduler.start(rotation_config.rotation_interval()).await {
            error!(error = %e, "Failed to start automatic rotation; aborting");
            std::process::exit(EXIT_CONFIGURATION);
        }
    } else {
        info!("Automatic secret rotation disabled");
    }

    let state = AppState::new(service_config, store.clone(), scheduler.clone(), gateway);

    let result = start_server(state, shutdown_signal()).await;

    scheduler.stop().await;
    store.shutdown().await;

    if let Err(e) = result {
        error!("HTTP server failed: {}", e);

        let exit_code = match e {
            ServiceError::BindFailed { .. } => EXIT_BIND_FAILED,
            ServiceError::ServerFailed { .. } => EXIT_SERVER_FAILED,
            ServiceError::Configuration(_) => EXIT_CONFIGURATION,
        };

        std::process::exit(exit_code);
    }

    info!("Session-Keeper Service stopped");
}

/// Load layered service configuration
///
/// Sources, later ones overriding earlier ones:
///  1. `/etc/session-keeper/service.yaml`: system-wide defaults
///  2. `./config/service.yaml`: deployment-local override
///  3. `explicit_path` (from `SK_CONFIG_FILE`): operator-specified file, required
///  4. Environment variables prefixed `SK__` with `__` as separator,
///     e.g. `SK__SERVER__PORT=9090` sets `server.port`
///
/// Every field has a serde default, so no sources at all yields the built-in
/// defaults. A malformed file or a value of the wrong type is an error.
fn load_service_config(explicit_path: Option<&str>) -> Result<ServiceConfig, config::ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(
            config::File::with_name("/etc/session-keeper/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        )
        .add_source(
            config::File::with_name("config/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        );

    if let Some(path) = explicit_path.filter(|p| !p.is_empty()) {
        info!(path = %path, "Loading configuration from explicit path");
        builder = builder.add_source(
            config::File::with_name(path)
                .required(true)
                .format(config::FileFormat::Yaml),
        );
    }

    builder
        .add_source(
            config::Environment::with_prefix(CONFIG_ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
