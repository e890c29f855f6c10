//! `tvlink-agent`: TV control agent.
//!
//! # Env vars
//!
//! | Variable              | Description                         | Default        |
//! |-----------------------|-------------------------------------|----------------|
//! | `TVLINK_CONFIG`       | Config file path                    | `tvlink.toml`  |
//! | `TVLINK_WS_URL`       | Overrides `server.ws_url`           | (config)       |
//! | `TVLINK_REGISTER_URL` | Overrides `server.register_url`     | (config)       |
//! | `TVLINK_DEVICE_ID`    | Overrides `device.id`               | (config)       |
//! | `RUST_LOG`            | Log filter                          | `tl_link=info,tl_agent=info` |

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tl_agent::cli::{self, Cli, Command, ConfigCommand};
use tl_agent::config::{load_config, LoggingConfig};

const DEFAULT_FILTER: &str = "tl_link=info,tl_agent=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (config, config_path) = load_config(cli.config.as_deref())?;

    match cli.command {
        None | Some(Command::Run) => {
            init_tracing(&config.logging, cli.json);
            tl_agent::app::run(config).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            if !cli::validate(&config, &config_path.display().to_string()) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => cli::show(&config),
    }
}

fn init_tracing(logging: &LoggingConfig, force_json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(logging.filter.as_deref().unwrap_or(DEFAULT_FILTER))
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json || force_json {
        builder.json().init();
    } else {
        builder.init();
    }
}
