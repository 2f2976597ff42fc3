mod browser;
mod cache;
mod config;
mod error;
mod markdown;
mod model;
mod orchestrator;
mod parser;
mod paths;
mod pipeline;
mod resume;
mod scraper;
mod shutdown;
mod writer;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::browser::{ChromeFactory, SessionFactory};
use crate::config::{LayoutSetting, Settings};
use crate::parser::flatten;
use crate::parser::StructureParser;
use crate::pipeline::RunOptions;

#[derive(Parser)]
#[command(name = "apidoc_scraper", about = "Extract API reference pages from a JS-rendered doc portal into markdown")]
struct Cli {
    /// YAML/TOML/JSON config file (optional)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log filter, e.g. "debug" or "apidoc_scraper=trace" (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse the sidebar (or load the cache) and extract pending items
    Run {
        /// Documentation portal URL
        #[arg(long)]
        url: Option<String>,
        /// Output directory
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Max parallel browser sessions
        #[arg(short, long)]
        workers: Option<usize>,
        /// Always extract with a single session
        #[arg(long)]
        no_parallel: bool,
        /// Max items to extract this run
        #[arg(short = 'n', long)]
        max_items: Option<usize>,
        /// Extract only the item with this id
        #[arg(long)]
        item_id: Option<String>,
        /// Overwrite existing markdown files and re-read the sidebar
        #[arg(short, long)]
        force: bool,
        /// Ignore the structure cache and re-read the sidebar
        #[arg(long)]
        force_reparse: bool,
        /// Save the raw sidebar HTML here after a live parse
        #[arg(long)]
        save_html: Option<PathBuf>,
        #[arg(long, value_enum)]
        layout: Option<LayoutSetting>,
    },
    /// Report extraction progress from the structure cache (no browser)
    ResumeInfo {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Parse a saved sidebar HTML file and print the structure as JSON
    Parse {
        input: PathBuf,
        /// Print the flattened work items instead of the tree
        #[arg(long, alias = "items")]
        flat_list: bool,
        #[arg(long, value_enum)]
        layout: Option<LayoutSetting>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match &cli.log_level {
        Some(level) => tracing_subscriber::EnvFilter::new(level),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info".into()),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let t0 = Instant::now();
    let mut settings = Settings::load(&cli.config)
        .with_context(|| format!("Invalid configuration ({})", cli.config.display()))?;

    let result = match cli.command {
        Commands::Run {
            url,
            output,
            workers,
            no_parallel,
            max_items,
            item_id,
            force,
            force_reparse,
            save_html,
            layout,
        } => {
            if let Some(url) = url {
                settings.target_url = url;
            }
            if let Some(output) = output {
                settings.output_directory = output;
            }
            if let Some(workers) = workers {
                settings.concurrency.max_workers = workers;
            }
            if no_parallel {
                settings.concurrency.enabled = false;
            }
            if let Some(layout) = layout {
                settings.layout = layout;
            }
            settings.validate()?;
            settings.require_target_url()?;

            let (trigger, shutdown) = shutdown::channel();
            let ctrl_c = shutdown::listen_for_ctrl_c(trigger);
            let factory: Arc<dyn SessionFactory> = Arc::new(ChromeFactory::new(&settings));
            let opts = RunOptions {
                force,
                force_reparse,
                max_items,
                item_id,
                save_html,
            };

            let outcome = pipeline::run(&settings, factory, &opts, shutdown.clone()).await;
            ctrl_c.abort();
            let stats = outcome?;
            stats.print();
            if shutdown.is_triggered() {
                println!("Interrupted; rerun to pick up the remaining items.");
            }
            Ok(())
        }
        Commands::ResumeInfo { output } => {
            if let Some(output) = output {
                settings.output_directory = output;
            }
            pipeline::resume_info(&settings)?.print();
            Ok(())
        }
        Commands::Parse {
            input,
            flat_list,
            layout,
        } => {
            let html = std::fs::read_to_string(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let parser = StructureParser::new(&settings.selectors, layout.unwrap_or(settings.layout))?;
            let tree = parser.parse(&html);
            let json = if flat_list {
                serde_json::to_string_pretty(&flatten::flatten(&tree))?
            } else {
                serde_json::to_string_pretty(&tree)?
            };
            println!("{}", json);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
