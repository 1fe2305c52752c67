use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cadence_gateway::config::file::config_file_path;
use cadence_gateway::plugins::PluginManager;
use cadence_gateway::{Config, Daemon};

/// Cadence - full-duplex voice assistant gateway
#[derive(Parser)]
#[command(name = "cadence", version, about)]
struct Cli {
    /// Port to listen on (overrides the config file)
    #[arg(long, env = "CADENCE_PORT")]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable voice features (text-only sessions)
    #[arg(long, env = "CADENCE_DISABLE_VOICE")]
    disable_voice: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List registered tools
    Tools,
    /// List discovered plugins
    Plugins,
    /// Print the config file path
    ConfigPath,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,cadence_gateway=info",
        1 => "info,cadence_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(Command::ConfigPath) = cli.command {
        match config_file_path() {
            Some(path) => println!("{}", path.display()),
            None => anyhow::bail!("no config directory available on this platform"),
        }
        return Ok(());
    }

    let mut config = Config::load_with_options(cli.disable_voice)?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    tracing::debug!(?config, "loaded configuration");

    match cli.command {
        Some(Command::Tools) => {
            let (registry, _) = Daemon::build_registry(&config);
            for info in registry.list() {
                println!("{:<32} {}", info.name, info.description);
            }
            Ok(())
        }
        Some(Command::Plugins) => {
            let mut plugins = PluginManager::new();
            plugins.load_all(&config.plugin_dirs);
            if plugins.is_empty() {
                println!("no plugins found");
            }
            for plugin in plugins.summaries() {
                println!("{plugin}");
            }
            Ok(())
        }
        Some(Command::ConfigPath) | None => {
            tracing::info!(
                port = config.server.port,
                voice = config.voice.enabled,
                "starting cadence gateway"
            );
            Daemon::new(config).run().await?;
            Ok(())
        }
    }
}
