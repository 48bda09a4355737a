use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use conreald::config::AppConfig;
use conreald::core::Coordinator;
use conreald::logging::{self, LogConfig};
use conreald::rpc::MasterService;
use conreald::{discovery, signals};

#[derive(Parser)]
#[command(name = "conreald")]
#[command(about = "Conreality Master", long_about = None)]
#[command(disable_version_flag = true)]
struct Cli {
    /// Set config file (default: $HOME/.conreality/config.yaml)
    #[arg(short = 'C', long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable debugging
    #[arg(short, long)]
    debug: bool,

    /// Be verbose
    #[arg(short, long)]
    verbose: bool,

    /// Print version
    #[arg(long)]
    version: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("{} {}", conreald::PRODUCT_NAME, conreald::VERSION);
        return Ok(());
    }

    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    logging::init(LogConfig::from_flags(config.log_json, cli.debug, cli.verbose));

    if cli.debug {
        if let Some(path) = &config.config_file {
            println!("Using config file: {}", path.display());
        }
    }

    run_daemon(Arc::new(config)).await.context("Daemon failed")
}

async fn run_daemon(config: Arc<AppConfig>) -> conreald::Result<()> {
    let service = Arc::new(MasterService::new(config.clone()));
    let backend = discovery::get_backend(config.simulation);
    let signals = signals::listen();

    Coordinator::new(config, service, backend).run(signals).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn short_flags() {
        let cli = Cli::parse_from(["conreald", "-C", "/etc/conreality.toml", "-d", "-v"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/conreality.toml")));
        assert!(cli.debug);
        assert!(cli.verbose);
        assert!(!cli.version);
    }

    #[test]
    fn version_has_no_short_flag() {
        let cli = Cli::parse_from(["conreald", "--version"]);
        assert!(cli.version);
    }
}
