use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::sync::oneshot;

use aiimg::config::{self, Config};
use aiimg::constants::{DEFAULT_EDIT_TASK_TYPE, EDIT_TASK_TYPES};
use aiimg::host::console::{ConsoleHost, StdoutSink};
use aiimg::logging::{init_subscriber, LogFormat};
use aiimg::metrics;
use aiimg::reload::ReloadManager;
use aiimg::ImagePlugin;

/// aiimg - image generation and editing for chat bots
#[derive(Parser, Debug)]
#[command(name = "aiimg")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log output format (text or json)
    #[arg(long, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate one image from a prompt
    Generate {
        prompt: String,
        /// Aspect ratio, e.g. 16:9
        #[arg(long)]
        ratio: Option<String>,
    },
    /// Edit one or more local images
    Edit {
        prompt: String,
        /// Input image files, sent in order
        #[arg(long = "image", required = true)]
        images: Vec<PathBuf>,
        /// Comma-separated edit task types
        #[arg(long, value_delimiter = ',', default_value = DEFAULT_EDIT_TASK_TYPE)]
        task_types: Vec<String>,
    },
    /// Show cache statistics
    Stats,
    /// Delete every cached image
    Clean,
    /// Run one retention sweep
    Sweep,
    /// Print Prometheus metrics
    Metrics,
    /// Interactive chat session on stdin/stdout
    Console {
        /// Sender id used for every line
        #[arg(long, default_value = "console")]
        user: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging subsystem
    init_subscriber(args.log_format)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging subsystem: {}", e))?;

    let config = if args.config.exists() {
        Config::from_file(&args.config).map_err(anyhow::Error::msg)?
    } else {
        tracing::warn!(config_file = %args.config.display(), "Config file not found, using defaults");
        Config::default()
    };
    config.validate().map_err(anyhow::Error::msg)?;

    tracing::info!(
        config_file = %args.config.display(),
        model = %config.model,
        generation_keys = config.generation_keys().len(),
        edit_keys = config.edit_keys().len(),
        cache_cleanup = config.cache_cleanup_enabled,
        "Configuration loaded successfully"
    );

    let shared = config::shared(config);
    let plugin = Arc::new(ImagePlugin::new(shared.clone())?);

    match args.command {
        Command::Generate { prompt, ratio } => {
            let path = plugin.generate_direct(&prompt, ratio.as_deref()).await?;
            println!("{}", path.display());
        }
        Command::Edit {
            prompt,
            images,
            task_types,
        } => {
            if let Some(unknown) = task_types
                .iter()
                .find(|t| !EDIT_TASK_TYPES.contains(&t.as_str()))
            {
                bail!(
                    "unknown task type '{}' (expected one of {})",
                    unknown,
                    EDIT_TASK_TYPES.join(", ")
                );
            }
            let mut data = Vec::with_capacity(images.len());
            for path in &images {
                let bytes = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                data.push(bytes);
            }
            let path = plugin.edit_direct(&prompt, data, &task_types).await?;
            println!("{}", path.display());
        }
        Command::Stats => print_replies(plugin.cmd_stats().await),
        Command::Clean => print_replies(plugin.cmd_clean().await),
        Command::Sweep => {
            let report = plugin.sweep_now().await?;
            println!(
                "Deleted {} images, freed {:.2} MB, {} remaining",
                report.deleted,
                report.freed_mb(),
                report.remaining
            );
        }
        Command::Metrics => print!("{}", metrics::export_text()),
        Command::Console { user } => {
            run_console(&args.config, shared, Arc::clone(&plugin), user).await?;
        }
    }

    plugin.terminate().await;
    Ok(())
}

async fn run_console(
    config_path: &std::path::Path,
    shared: config::SharedConfig,
    plugin: Arc<ImagePlugin>,
    user: String,
) -> anyhow::Result<()> {
    let reload = Arc::new(ReloadManager::new(config_path.to_path_buf(), shared));
    #[cfg(unix)]
    reload
        .register_signal_handler()
        .map_err(anyhow::Error::msg)?;
    let (reload_tx, reload_rx) = oneshot::channel();
    let watcher = Arc::clone(&reload).spawn_watch_task(Duration::from_secs(1), reload_rx);

    plugin.start();
    tracing::info!(user = %user, "Console ready; type a prompt or a /command");

    let host = ConsoleHost::new(plugin, Arc::new(StdoutSink), user);
    let result = host.run().await;

    let _ = reload_tx.send(());
    let _ = watcher.await;
    result.map_err(Into::into)
}

fn print_replies(replies: Vec<aiimg::host::Reply>) {
    for reply in &replies {
        print!("{}", aiimg::host::console::render(reply));
    }
}
