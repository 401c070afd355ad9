//! # Session-Keeper CLI
//!
//! Operator commands for session signing secrets.
//!
//! This module provides CLI commands for:
//! - Generating a fresh secret suitable for `SESSION_SECRET`
//! - Inspecting a secret backup file (previews only, never raw values)
//! - Rotating a backup file offline while the service is stopped
//! - Validating the rotation configuration taken from the environment
//! - Generating shell completions

use clap::{CommandFactory, Parser, Subcommand};
use serde::Serialize;
use session_keeper_core::{
    generate_secret, ConfigError, FileSecretPersistence, InMemorySecretPersistence,
    NotificationHub, PersistedSecretState, PersistenceError, SecretError, SecretPersistence,
    SecretPreview, SecretRotationConfig, SecretStore, SecretStoreError, SecretValue, Timestamp,
    DEFAULT_SECRET_BYTES,
};
use std::{io::Write, path::PathBuf, sync::Arc, time::Duration};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

// ============================================================================
// CLI Structure
// ============================================================================

/// Session-Keeper CLI - Secret management for signed session cookies
#[derive(Parser)]
#[command(name = "session-keeper")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Secret management for signed session cookies")]
#[command(
    long_about = "Session-Keeper generates, inspects and rotates the secrets that sign session cookies"
)]
pub struct Cli {
    /// Logging level
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Generate a random secret and print it as hex
    Generate {
        /// Number of random bytes
        #[arg(short, long, default_value_t = DEFAULT_SECRET_BYTES)]
        bytes: usize,
    },

    /// Show a redacted summary of a secret backup file
    Inspect {
        /// Backup file to read
        #[arg(short = 'F', long, env = "SECRET_BACKUP_PATH")]
        file: PathBuf,

        /// Graceful window in minutes used to classify history entries
        #[arg(short, long, default_value = "120")]
        grace_minutes: u64,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Rotate the secrets held in a backup file
    ///
    /// Only run this while the service is stopped; a running service
    /// overwrites the file with its own state on the next rotation.
    Rotate {
        /// Backup file to rotate
        #[arg(short = 'F', long, env = "SECRET_BACKUP_PATH")]
        file: PathBuf,

        /// Maximum number of history entries to keep
        #[arg(long, default_value = "5")]
        history: usize,

        /// Number of random bytes in the new secret
        #[arg(short, long, default_value_t = DEFAULT_SECRET_BYTES)]
        bytes: usize,
    },

    /// Validate rotation configuration from the environment
    Config {
        /// Show the resolved configuration
        #[arg(short, long)]
        show: bool,

        /// Output format for the resolved configuration
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum, Serialize)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON output
    Json,
}

// ============================================================================
// Reports
// ============================================================================

/// Redacted view of a backup file
#[derive(Debug, Clone, Serialize)]
pub struct BackupSummary {
    pub path: PathBuf,
    pub current_preview: SecretPreview,
    pub previous_preview: Option<SecretPreview>,
    pub history: Vec<HistorySummary>,
    pub last_updated: Timestamp,
    pub graceful_window_seconds: u64,
}

/// Redacted view of one history entry
#[derive(Debug, Clone, Serialize)]
pub struct HistorySummary {
    pub preview: SecretPreview,
    pub rotated_at: Timestamp,
    pub within_graceful_window: bool,
}

impl BackupSummary {
    /// Summarize persisted state as of `now`
    pub fn from_state(
        path: PathBuf,
        state: &PersistedSecretState,
        graceful_window: Duration,
        now: Timestamp,
    ) -> Self {
        let history = state
            .secret_history
            .iter()
            .map(|entry| HistorySummary {
                preview: preview_of(&entry.secret),
                rotated_at: entry.rotated_at,
                within_graceful_window: now.duration_since(entry.rotated_at) < graceful_window,
            })
            .collect();

        Self {
            path,
            current_preview: preview_of(&state.current_secret),
            previous_preview: state.previous_secret.as_deref().map(preview_of),
            history,
            last_updated: state.last_updated,
            graceful_window_seconds: graceful_window.as_secs(),
        }
    }

    fn write_text(&self, out: &mut dyn Write) -> Result<(), CliError> {
        writeln!(out, "Backup file:      {}", self.path.display())?;
        writeln!(out, "Last updated:     {}", self.last_updated)?;
        writeln!(out, "Current secret:   {}", self.current_preview)?;
        match &self.previous_preview {
            Some(preview) => writeln!(out, "Previous secret:  {}", preview)?,
            None => writeln!(out, "Previous secret:  (none)")?,
        }
        writeln!(
            out,
            "History:          {} entries (window {}s)",
            self.history.len(),
            self.graceful_window_seconds
        )?;
        for entry in &self.history {
            let status = if entry.within_graceful_window {
                "valid"
            } else {
                "expired"
            };
            writeln!(out, "  {}  {}  {}", entry.preview, entry.rotated_at, status)?;
        }
        Ok(())
    }
}

/// Result of an offline rotation
#[derive(Debug, Clone, Serialize)]
pub struct RotationReport {
    pub path: PathBuf,
    pub new_current_preview: SecretPreview,
    pub previous_preview: Option<SecretPreview>,
    pub history_len: usize,
}

fn preview_of(raw: &str) -> SecretPreview {
    SecretValue::from_string(raw.to_string()).preview()
}

// ============================================================================
// Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Secret error: {0}")]
    Secret(#[from] SecretError),

    #[error("Secret store error: {0}")]
    Store(#[from] SecretStoreError),

    #[error("Command failed: {message}")]
    CommandFailed { message: String },

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ============================================================================
// Entry Points
// ============================================================================

/// Main CLI entry point
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    initialize_logging(&cli)?;

    let mut stdout = std::io::stdout();
    execute(cli.command, &mut stdout).await
}

/// Run a parsed command, writing its output to `out`
pub async fn execute(command: Commands, out: &mut dyn Write) -> Result<(), CliError> {
    match command {
        Commands::Generate { bytes } => execute_generate_command(bytes, out),
        Commands::Inspect {
            file,
            grace_minutes,
            format,
        } => execute_inspect_command(file, grace_minutes, format, out).await,
        Commands::Rotate {
            file,
            history,
            bytes,
        } => execute_rotate_command(file, history, bytes, out).await,
        Commands::Config { show, format } => execute_config_command(show, format, out),
        Commands::Completions { shell } => execute_completions_command(shell, out),
    }
}

/// Initialize logging based on CLI arguments
///
/// Logs go to stderr so command output on stdout stays machine-readable.
fn initialize_logging(cli: &Cli) -> Result<(), CliError> {
    let filter = EnvFilter::try_new(&cli.log_level).map_err(|e| CliError::InvalidArgument {
        arg: "log-level".to_string(),
        message: e.to_string(),
    })?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let result = if cli.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| CliError::CommandFailed {
        message: format!("cannot initialize logging: {}", e),
    })
}

// ============================================================================
// Command Implementations
// ============================================================================

fn execute_generate_command(bytes: usize, out: &mut dyn Write) -> Result<(), CliError> {
    let secret = generate_secret(bytes)?;
    debug!(bytes = bytes, preview = %secret.preview(), "Generated secret");

    writeln!(out, "{}", secret.expose_secret())?;
    Ok(())
}

async fn execute_inspect_command(
    file: PathBuf,
    grace_minutes: u64,
    format: OutputFormat,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let window_seconds = grace_minutes
        .checked_mul(60)
        .ok_or_else(|| CliError::InvalidArgument {
            arg: "grace-minutes".to_string(),
            message: format!("{} minutes is out of range", grace_minutes),
        })?;

    let state = load_backup(&file).await?;
    let summary = BackupSummary::from_state(
        file,
        &state,
        Duration::from_secs(window_seconds),
        Timestamp::now(),
    );

    match format {
        OutputFormat::Text => summary.write_text(out)?,
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, &summary)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

async fn execute_rotate_command(
    file: PathBuf,
    history: usize,
    bytes: usize,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let file_persistence = FileSecretPersistence::new(file.clone());
    let state = load_backup(&file).await?;

    let config = SecretRotationConfig {
        history_max_count: history,
        secret_bytes: bytes,
        auto_rotation_enabled: false,
        file_backup_enabled: false,
        ..SecretRotationConfig::default()
    };

    // The store works against an in-memory copy; the file is written once,
    // after the rotation succeeded, so write failures surface here.
    let staging: Arc<dyn SecretPersistence> = Arc::new(InMemorySecretPersistence::with_state(state));
    let store = SecretStore::new(config, Arc::new(NotificationHub::new()), Some(staging))?;

    if !store.initialize().await {
        return Err(CliError::CommandFailed {
            message: format!("backup at {} could not be loaded", file.display()),
        });
    }

    let new_current = store.rotate().await?;
    file_persistence.save(&store.export_state()).await?;

    let statistics = store.statistics();
    info!(
        path = %file.display(),
        secret_preview = %new_current.preview(),
        "Rotated backup file"
    );

    let report = RotationReport {
        path: file,
        new_current_preview: new_current.preview(),
        previous_preview: statistics.previous_preview,
        history_len: statistics.history.len(),
    };

    writeln!(out, "Rotated secrets in {}", report.path.display())?;
    writeln!(out, "New current secret: {}", report.new_current_preview)?;
    if let Some(previous) = &report.previous_preview {
        writeln!(out, "Previous secret:    {}", previous)?;
    }
    writeln!(out, "History entries:    {}", report.history_len)?;
    Ok(())
}

fn execute_config_command(
    show: bool,
    format: OutputFormat,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let config = SecretRotationConfig::from_env()?;
    config.validate()?;

    if !show {
        writeln!(out, "Configuration is valid")?;
        return Ok(());
    }

    match format {
        OutputFormat::Text => {
            let base_secret = if config.base_secret.is_some() {
                "set"
            } else {
                "not set (generated at startup)"
            };
            writeln!(out, "Base secret:           {}", base_secret)?;
            writeln!(out, "Rotation interval:     {}h", config.rotation_interval_hours)?;
            writeln!(out, "Automatic rotation:    {}", config.auto_rotation_enabled)?;
            writeln!(out, "History size:          {}", config.history_max_count)?;
            writeln!(out, "Graceful window:       {}s", config.graceful_window_seconds)?;
            writeln!(out, "File backup:           {}", config.file_backup_enabled)?;
            writeln!(out, "Backup path:           {}", config.backup_path.display())?;
            writeln!(out, "Secret bytes:          {}", config.secret_bytes)?;
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, &config)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

fn execute_completions_command(
    shell: clap_complete::Shell,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let mut command = Cli::command();
    let name = command.get_name().to_string();
    clap_complete::generate(shell, &mut command, name, out);
    Ok(())
}

async fn load_backup(file: &std::path::Path) -> Result<PersistedSecretState, CliError> {
    let persistence = FileSecretPersistence::new(file.to_path_buf());
    persistence
        .load()
        .await?
        .ok_or_else(|| CliError::CommandFailed {
            message: format!("no secret backup found at {}", file.display()),
        })
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
