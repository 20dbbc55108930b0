use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use sweetnest::config::Config;
use sweetnest::resources::Backend;
use sweetnest::{app, cli, logging};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "sweetnest")]
#[command(about = "Terminal admin dashboard for the SweetNest bakery API")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/sweetnest/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// API base URL, overrides the config file
  #[arg(long, global = true)]
  api_url: Option<String>,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Open the dashboard (default)
  Dashboard {
    /// Open straight into this cake's reviews
    #[arg(long)]
    cake: Option<String>,
  },
  /// Work with the notification feed
  #[command(subcommand)]
  Notifications(cli::NotificationsCommand),
  /// Work with cake reviews
  #[command(subcommand)]
  Reviews(cli::ReviewsCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let config = Config::load(args.config.as_deref(), args.api_url.as_deref())?;

  let _log_guard = match logging::init() {
    Ok(guard) => Some(guard),
    Err(e) => {
      eprintln!("warning: logging disabled: {}", e);
      None
    }
  };
  info!(api = %config.api.url, "starting");

  let backend = Backend::connect(&config, Config::get_api_token())?;

  match args.command.unwrap_or(Command::Dashboard { cake: None }) {
    Command::Dashboard { cake } => {
      let mut app = app::App::new(config, backend, cake);
      app.run().await?;
    }
    Command::Notifications(command) => cli::notifications(&backend, command).await?,
    Command::Reviews(command) => {
      let page_size = config.ui.page_size;
      cli::reviews(&backend, command, page_size).await?
    }
  }

  Ok(())
}
