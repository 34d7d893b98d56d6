mod api;
mod gateway;
mod linking;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use nudge_channels::telegram::TelegramChannel;
use nudge_core::{
    clock::{Clock, FixedClock, SystemClock},
    config::{self, Config},
    shellexpand,
    traits::Channel,
};
use nudge_store::Store;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    name = "nudge",
    version,
    about = "Nudge — habit, task and goal reminders"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, env = "NUDGE_CONFIG", default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway: HTTP API, sessions and the optional sweep loop.
    Start,
    /// Run one sweep over all linked users and print the report.
    Sweep {
        /// Evaluate as if it were this instant (RFC 3339).
        #[arg(long)]
        at: Option<String>,
    },
    /// Show configuration and ledger size.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(&cli.config)?;

    let log_dir = matches!(cli.command, Commands::Start)
        .then(|| PathBuf::from(shellexpand(&cfg.nudge.data_dir)).join("logs"));
    let _guard = init_tracing(&cfg.nudge.log_level, log_dir)?;

    match cli.command {
        Commands::Start => {
            let (telegram, bot_username) = build_telegram(&cfg).await?;
            let store = Store::new(&cfg.store).await?;
            let notifier = gateway::build_notifier(
                store,
                Arc::new(SystemClock),
                cfg.delivery.send_timeout_secs,
            );

            println!("Nudge — starting gateway...");
            let gw = gateway::Gateway::new(cfg, notifier, telegram, bot_username);
            gw.run().await?;
        }
        Commands::Sweep { at } => {
            let clock: Arc<dyn Clock> = match at {
                Some(at) => {
                    let at: DateTime<Utc> = DateTime::parse_from_rfc3339(&at)
                        .map_err(|e| anyhow::anyhow!("invalid --at {at:?}: {e}"))?
                        .with_timezone(&Utc);
                    Arc::new(FixedClock(at))
                }
                None => Arc::new(SystemClock),
            };
            let (telegram, _) = build_telegram(&cfg).await?;
            let store = Store::new(&cfg.store).await?;
            let notifier = gateway::build_notifier(store, clock, cfg.delivery.send_timeout_secs);

            let report =
                gateway::sweep(&notifier, telegram.as_ref(), cfg.sweep.window_minutes).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Status => {
            println!("Nudge — Status Check\n");
            println!("Config: {}", cli.config);
            println!("Database: {}", shellexpand(&cfg.store.db_path));
            println!();

            println!(
                "  telegram: {}",
                if cfg.telegram.enabled && !cfg.telegram.bot_token.is_empty() {
                    "configured"
                } else if cfg.telegram.enabled {
                    "enabled but missing bot_token"
                } else {
                    "disabled"
                }
            );
            println!(
                "  api: {}",
                if cfg.api.enabled {
                    format!("{}:{}", cfg.api.host, cfg.api.port)
                } else {
                    "disabled".to_string()
                }
            );
            println!(
                "  sweep: {}",
                if cfg.sweep.enabled {
                    format!(
                        "every {}s, window {} min",
                        cfg.sweep.interval_secs, cfg.sweep.window_minutes
                    )
                } else {
                    "external trigger only".to_string()
                }
            );
            println!(
                "  cron secret: {}",
                if cfg.cron.secret.is_empty() {
                    "not set"
                } else {
                    "set"
                }
            );
            println!();

            let store = Store::new(&cfg.store).await?;
            println!("  sent events: {}", store.event_count(None).await?);
        }
    }

    Ok(())
}

/// Console logging always; a daily-rolling file too when `log_dir` is given.
fn init_tracing(level: &str, log_dir: Option<PathBuf>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            let appender = tracing_appender::rolling::daily(dir, "nudge.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
            Ok(None)
        }
    }
}

/// The Telegram transport and bot username, if Telegram is enabled.
async fn build_telegram(
    cfg: &Config,
) -> anyhow::Result<(Option<Arc<dyn Channel>>, Option<String>)> {
    if !cfg.telegram.enabled {
        return Ok((None, None));
    }
    if cfg.telegram.bot_token.is_empty() {
        anyhow::bail!(
            "Telegram is enabled but bot_token is empty. \
             Set it in config.toml or TELEGRAM_BOT_TOKEN env var."
        );
    }

    let channel = TelegramChannel::new(cfg.telegram.clone());
    let bot_username = match channel.bot_username().await {
        Ok(name) => {
            info!("Telegram bot: @{name}");
            Some(name)
        }
        Err(e) => {
            warn!("could not resolve telegram bot username: {e}");
            None
        }
    };
    let channel: Arc<dyn Channel> = Arc::new(channel);
    Ok((Some(channel), bot_username))
}
