use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::browser::SessionFactory;
use crate::cache::StructureCache;
use crate::config::{Delays, Settings};
use crate::model::{OutcomeStatus, RunStats};
use crate::orchestrator;
use crate::parser::flatten;
use crate::parser::StructureParser;
use crate::resume::{self, ResumeInfo};
use crate::scraper::JobSettings;
use crate::shutdown::Shutdown;
use crate::writer;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Overwrite existing output files and re-read the sidebar.
    pub force: bool,
    /// Re-read the sidebar but keep existing output files.
    pub force_reparse: bool,
    pub max_items: Option<usize>,
    pub item_id: Option<String>,
    /// Where to dump the raw sidebar HTML after a live parse.
    pub save_html: Option<PathBuf>,
}

/// Structure from cache when usable, otherwise one live session.
pub async fn obtain_structure(
    settings: &Settings,
    factory: &dyn SessionFactory,
    opts: &RunOptions,
) -> Result<StructureCache> {
    let cache_path = settings.structure_path();
    if let Some(cache) = StructureCache::load(&cache_path, opts.force || opts.force_reparse) {
        return Ok(cache);
    }

    let url = settings.require_target_url()?;
    let parser = StructureParser::new(&settings.selectors, settings.layout)?;

    let mut session = factory.create().await.context("Failed to start browser session")?;
    let html = fetch_sidebar(session.as_mut(), url, settings).await;
    if let Err(e) = session.close().await {
        warn!("Session teardown failed: {}", e);
    }
    let html = html?;

    if let Some(path) = &opts.save_html {
        let saved = writer::commit(&html, path, true);
        if saved.status == OutcomeStatus::Processed {
            info!("Saved raw sidebar HTML to {}", path.display());
        } else {
            warn!("Could not save raw sidebar HTML to {}", path.display());
        }
    }

    let tree = parser.parse(&html);
    if tree.is_empty() {
        bail!("No navigation structure found at {}", url);
    }
    let items = flatten::flatten(&tree);
    let cache = StructureCache::new(url, tree, items);
    if cache.processable_count() == 0 {
        bail!("Navigation at {} has no extractable items", url);
    }
    cache
        .save(&cache_path)
        .with_context(|| format!("Failed to write {}", cache_path.display()))?;
    Ok(cache)
}

async fn fetch_sidebar(
    session: &mut dyn crate::browser::BrowserSession,
    url: &str,
    settings: &Settings,
) -> Result<String> {
    let d = &settings.delays;
    session.navigate(url).await?;
    session.wait_for_sidebar(Delays::secs(d.sidebar_wait)).await?;
    session
        .expand_all(settings.behavior.max_expand_attempts, Delays::secs(d.expand_menu))
        .await?;
    Ok(session.sidebar_html().await?)
}

/// Full run: structure, selection, mode choice, extraction.
pub async fn run(
    settings: &Settings,
    factory: Arc<dyn SessionFactory>,
    opts: &RunOptions,
    shutdown: Shutdown,
) -> Result<RunStats> {
    let structure = obtain_structure(settings, factory.as_ref(), opts).await?;
    let valid = flatten::valid_items(&structure.items);
    info!("{} extractable items in structure", valid.len());

    let selection = resume::select(
        &valid,
        opts.max_items,
        opts.item_id.as_deref(),
        &settings.output_directory,
        opts.force,
    );
    let already_done = if opts.force { 0 } else { selection.already_existing.len() };

    if selection.is_noop() {
        println!(
            "Nothing to do: {} items already extracted in {}.",
            already_done,
            settings.output_directory.display()
        );
        return Ok(RunStats {
            skipped: already_done,
            ..RunStats::default()
        });
    }

    let target_url = match settings.require_target_url() {
        Ok(url) => url.to_string(),
        Err(_) => structure.source_url.clone(),
    };
    let job = Arc::new(JobSettings {
        target_url,
        output_dir: settings.output_directory.clone(),
        force: opts.force,
        delays: settings.delays.clone(),
        behavior: settings.behavior.clone(),
    });

    println!(
        "Extracting {} items ({} already done)...",
        selection.to_process.len(),
        already_done
    );
    let mut stats = orchestrator::run_extraction(
        factory,
        selection.to_process,
        job,
        &settings.concurrency,
        shutdown,
    )
    .await
    .context("Extraction failed")?;
    stats.skipped += already_done;
    Ok(stats)
}

/// Cache-only report; never opens a browser.
pub fn resume_info(settings: &Settings) -> Result<ResumeInfo> {
    let cache_path = settings.structure_path();
    let Some(structure) = StructureCache::load(&cache_path, false) else {
        bail!(
            "No usable structure cache at {}; run `run` first",
            cache_path.display()
        );
    };
    let valid = flatten::valid_items(&structure.items);
    Ok(ResumeInfo::from_items(&valid, &settings.output_directory))
}

// ── Tests ──
