use anyhow::Result;
use clap::Parser;
use tonalhub::app::{self, AppStartupOptions};
use tonalhub::model::Settings;
use tonalhub::{config, logging};
use tracing::info;

#[derive(Debug, Parser)]
#[command(
    name = "tonalhub",
    version,
    about = "Play a GitHub repository's commit activity as music"
)]
struct Args {
    /// GitHub user or organisation to start with.
    #[arg(long)]
    user: Option<String>,
    /// Repository under that user.
    #[arg(long)]
    repository: Option<String>,
    /// Share link carrying `user` and `repository` parameters.
    #[arg(long)]
    link: Option<String>,
    /// Milliseconds between played weeks.
    #[arg(long = "tick-ms")]
    tick_ms: Option<u64>,
    /// Base URL of the GitHub REST API.
    #[arg(long = "api-base")]
    api_base: Option<String>,
    /// Layer a low drone under the playback.
    #[arg(long)]
    background: bool,
    /// Write the effective settings to the config file and exit.
    #[arg(long = "init-config")]
    init_config: bool,
}

impl Args {
    fn apply(&self, settings: &mut Settings) {
        if let Some(tick_ms) = self.tick_ms {
            settings.tick_interval_ms = tick_ms.max(1);
        }
        if let Some(api_base) = &self.api_base {
            settings.api_base_url = api_base.clone();
        }
        if self.background {
            settings.background_accompaniment = true;
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = config::load_settings()?;
    args.apply(&mut settings);

    if args.init_config {
        let path = config::save_settings(&settings)?;
        println!("wrote {}", path.display());
        return Ok(());
    }

    let config_dir = config::ensure_config_dir()?;
    if let Err(err) = logging::init(&config_dir) {
        eprintln!("logging disabled: {err:#}");
    }
    info!(api = %settings.api_base_url, tick_ms = settings.tick_interval_ms, "starting");

    let location = app::startup_location(
        args.link.as_deref(),
        args.user.as_deref(),
        args.repository.as_deref(),
        &settings,
    );
    app::run_with_startup(AppStartupOptions { settings, location })
}
