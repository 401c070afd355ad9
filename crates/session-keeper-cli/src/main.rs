use session_keeper_cli::{run_cli, CliError};
use tracing::error;

#[tokio::main]
async fn main() {
    if let Err(e) = run_cli().await {
        error!("CLI error: {}", e);
        eprintln!("error: {}", e);

        let exit_code = match e {
            CliError::Configuration(_) => 1,
            CliError::Persistence(_) => 2,
            CliError::Secret(_) | CliError::Store(_) => 3,
            CliError::InvalidArgument { .. } => 4,
            CliError::Io(_) => 5,
            CliError::Serialization(_) => 6,
            CliError::CommandFailed { .. } => 7,
        };

        std::process::exit(exit_code);
    }
}
