//! `pdfpages` command line front end
//!
//! ```bash
//! pdfpages info report.pdf
//! pdfpages pages report.pdf
//! pdfpages render report.pdf --page 1 --margins 0.1,0,0.1,0 --size 800x600 --output page.png
//! ```

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode, WriteLogger};

use pdfpages::panic_handler;
use pdfpages::settings::{self, Settings};

/// Open PDF documents and render their pages
#[derive(Parser, Debug)]
#[command(name = "pdfpages")]
#[command(version, about, long_about = None)]
struct Args {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Render threads (overrides settings; 0 = one per core)
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print file name, page count, size and metadata as JSON
    Info {
        file: PathBuf,
    },

    /// Print the page listing as JSON
    Pages {
        file: PathBuf,
    },

    /// Render one page to a PNG file
    Render {
        file: PathBuf,

        /// Zero-based page index
        #[arg(short, long)]
        page: usize,

        /// Fractional crop margins `left,top,right,bottom`
        #[arg(short, long)]
        margins: Option<pdfpages::pdf::Margins>,

        /// Output size in pixels, e.g. `800x600`
        #[arg(short, long)]
        size: pdfpages::pdf::Size,

        /// Output PNG file
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn init_logging(level: LevelFilter, log_file: Option<&Path>) -> Result<()> {
    match log_file {
        Some(path) => WriteLogger::init(level, Config::default(), File::create(path)?)?,
        None => TermLogger::init(
            level,
            Config::default(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        )?,
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Settings are read before the logger exists, so their own log lines
    // only show up on a second run.
    let mut settings = settings::load_settings(args.config.as_deref());
    if let Some(workers) = args.workers {
        settings.workers = workers;
    }

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        settings.level_filter()
    };
    init_logging(level, args.log_file.as_deref())?;
    panic_handler::initialize_panic_handler();

    log::debug!("Settings: {settings:?}");
    run(&args.command, &settings)
}

#[cfg(feature = "pdf")]
fn run(command: &Command, settings: &Settings) -> Result<()> {
    cli::run(command, settings)
}

#[cfg(not(feature = "pdf"))]
fn run(_command: &Command, _settings: &Settings) -> Result<()> {
    anyhow::bail!("pdfpages was built without the `pdf` feature")
}

#[cfg(feature = "pdf")]
mod cli {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use anyhow::{Context, Result, anyhow, bail};
    use log::info;
    use serde_json::json;

    use pdfpages::pdf::{DocumentId, MupdfBackend, PageBroker, RequestKey};
    use pdfpages::settings::Settings;

    use super::Command;

    pub fn run(command: &Command, settings: &Settings) -> Result<()> {
        let backend = Arc::new(MupdfBackend::new(settings.render_annotations));
        let broker = PageBroker::from_settings(backend, settings)
            .context("Failed to start render workers")?;
        info!("Page broker running with {} workers", broker.num_workers());

        let timeout = Duration::from_secs(settings.load_timeout_secs);

        match command {
            Command::Info { file } => {
                let id = open_ready(&broker, file, timeout)?;
                let registry = broker.registry();
                let info = json!({
                    "id": id,
                    "file_name": registry.file_name(id),
                    "page_count": registry.page_count(id),
                    "bytes": registry.bytes_count(id),
                    "metadata": registry.metadata(id),
                });
                println!("{}", serde_json::to_string_pretty(&info)?);
            }

            Command::Pages { file } => {
                let id = open_ready(&broker, file, timeout)?;
                let pages = broker.gateway().list_pages(id);
                println!("{}", serde_json::to_string_pretty(&pages)?);
            }

            Command::Render {
                file,
                page,
                margins,
                size,
                output,
            } => {
                let id = open_ready(&broker, file, timeout)?;
                let page = i32::try_from(*page).context("Page index too large")?;
                let doc = i32::try_from(id.get()).context("Document id too large")?;
                let key = RequestKey::new(doc, page, *margins).to_string();

                let started = Instant::now();
                let bitmap = broker
                    .gateway()
                    .request_render(&key, *size)
                    .wait()
                    .with_context(|| format!("Failed to render {key}"))?;
                info!(
                    "Rendered {key} to {}x{} in {:?}",
                    bitmap.width(),
                    bitmap.height(),
                    started.elapsed()
                );

                bitmap
                    .save(output)
                    .with_context(|| format!("Failed to write {}", output.display()))?;
                println!("{}", output.display());
            }
        }

        Ok(())
    }

    /// Open `file` and block until its load finishes
    fn open_ready(broker: &PageBroker, file: &Path, timeout: Duration) -> Result<DocumentId> {
        let registry = broker.registry();
        let ready = registry.subscribe();

        let uri = file.to_string_lossy();
        let id = registry
            .open(&uri)
            .with_context(|| format!("Cannot open {}", file.display()))?;

        let deadline = Instant::now() + timeout;
        while !registry.is_ready(id) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                bail!(
                    "{} did not finish loading within {timeout:?} (see log for decoder errors)",
                    file.display()
                );
            }
            match ready.recv_timeout(remaining) {
                Ok(_) => {}
                Err(flume::RecvTimeoutError::Timeout) => {}
                Err(flume::RecvTimeoutError::Disconnected) => {
                    return Err(anyhow!("Registry stopped while loading {}", file.display()));
                }
            }
        }
        Ok(id)
    }
}
