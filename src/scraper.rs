use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::browser::{BrowserSession, SessionFactory};
use crate::config::{Behavior, Delays};
use crate::error::{Result, ScrapeError};
use crate::model::{ExtractionOutcome, OutcomeStatus, RunStats, WorkItem};
use crate::resume;
use crate::shutdown::Shutdown;
use crate::writer;

/// What every extraction job needs besides its item.
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub target_url: String,
    pub output_dir: PathBuf,
    pub force: bool,
    pub delays: Delays,
    pub behavior: Behavior,
}

/// Per-run state of the sequential runner.
#[derive(Debug, Default)]
pub struct RunContext {
    pub fully_expanded: bool,
    pub stats: RunStats,
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) =
        ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
    {
        pb.set_style(style.progress_chars("=> "));
    }
    pb
}

/// Existing output and no force: done without touching the browser.
fn precheck(item: &WorkItem, job: &JobSettings) -> Option<ExtractionOutcome> {
    if job.force {
        return None;
    }
    let path = resume::item_output_path(item, &job.output_dir);
    path.exists()
        .then(|| ExtractionOutcome::new(item, OutcomeStatus::Skipped).at(path))
}

/// Reveal, activate, wait, extract, write. The session is already on the site.
pub async fn extract_item(
    session: &mut dyn BrowserSession,
    item: &WorkItem,
    job: &JobSettings,
) -> Result<ExtractionOutcome> {
    let id = item
        .id
        .as_deref()
        .ok_or_else(|| ScrapeError::Validation(format!("item {:?} has no id", item.text)))?;
    let path = resume::item_output_path(item, &job.output_dir);

    let chain = item.reveal_chain();
    if !chain.is_empty() {
        if let Err(e) = session.reveal_path(&chain).await {
            warn!(item = id, "Could not reveal ancestors: {}", e);
        }
    }

    session.activate(id).await?;

    let timeout = Delays::secs(job.delays.content_wait);
    let ready = session
        .wait_content_ready(timeout, Delays::secs(job.delays.content_poll))
        .await?;
    if !ready {
        warn!(item = id, "{}", ScrapeError::ContentTimeout(timeout.as_secs_f64()));
    }

    let Some(markdown) = session.extract_markdown().await? else {
        warn!(item = id, "No content extracted for {:?}", item.text);
        return Ok(ExtractionOutcome::new(item, OutcomeStatus::NoContent).at(path));
    };

    let committed = writer::commit(&markdown, &path, job.force);
    debug!(item = id, status = ?committed.status, "Committed {}", path.display());
    Ok(ExtractionOutcome::new(item, committed.status)
        .at(path)
        .with_checksum(Some(committed.checksum)))
}

async fn open_site(session: &mut dyn BrowserSession, job: &JobSettings) -> Result<()> {
    session.navigate(&job.target_url).await?;
    session
        .wait_for_sidebar(Delays::secs(job.delays.sidebar_wait))
        .await
}

fn failed(item: &WorkItem, reason: &ScrapeError) -> ExtractionOutcome {
    warn!(item = item.id_or_placeholder(), "Failed: {}", reason);
    ExtractionOutcome::new(item, OutcomeStatus::Failed)
}

// ── Parallel ──

struct TaskResult {
    outcome: ExtractionOutcome,
    session_failed: bool,
}

/// Bounded-concurrency extraction, one exclusive session per item.
pub struct WorkerPool {
    factory: Arc<dyn SessionFactory>,
    max_workers: usize,
    task_start_delay: Duration,
    shutdown: Shutdown,
}

impl WorkerPool {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        max_workers: usize,
        task_start_delay: Duration,
        shutdown: Shutdown,
    ) -> Self {
        WorkerPool {
            factory,
            max_workers,
            task_start_delay,
            shutdown,
        }
    }

    /// Task failures are outcomes; an `Err` means the stage itself broke.
    pub async fn run_parallel(&self, items: Vec<WorkItem>, job: Arc<JobSettings>) -> Result<RunStats> {
        if self.max_workers == 0 {
            return Err(ScrapeError::Pool("max_workers must be at least 1".into()));
        }
        let total = items.len();
        info!("Parallel extraction of {} items with {} workers", total, self.max_workers);

        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let pb = progress_bar(total);
        let mut tasks = JoinSet::new();

        for (index, item) in items.into_iter().enumerate() {
            let factory = Arc::clone(&self.factory);
            let sem = Arc::clone(&semaphore);
            let job = Arc::clone(&job);
            let shutdown = self.shutdown.clone();
            let stagger = stagger_for(self.task_start_delay, index);
            tasks.spawn(run_task(item, factory, sem, job, stagger, shutdown));
        }

        let mut stats = RunStats::default();
        let mut dispatched = 0usize;
        let mut session_failures = 0usize;
        while let Some(joined) = tasks.join_next().await {
            let status = match joined {
                Ok(result) => {
                    if result.session_failed {
                        session_failures += 1;
                    }
                    if result.outcome.status != OutcomeStatus::Skipped {
                        dispatched += 1;
                    }
                    result.outcome.status
                }
                Err(e) => {
                    warn!("Extraction task aborted: {}", e);
                    dispatched += 1;
                    OutcomeStatus::Failed
                }
            };
            stats = stats.record(status);
            pb.inc(1);
        }
        pb.finish_and_clear();

        if dispatched > 0 && session_failures == dispatched {
            return Err(ScrapeError::Pool(format!(
                "no browser session could be created for {} items",
                dispatched
            )));
        }

        info!(
            "Parallel stage done: {} processed, {} skipped, {} failed, {} no content",
            stats.processed, stats.skipped, stats.failed, stats.no_content
        );
        Ok(stats)
    }
}

/// `delay * index`, saturating instead of overflowing.
fn stagger_for(delay: Duration, index: usize) -> Duration {
    let factor = u32::try_from(index).unwrap_or(u32::MAX);
    delay.checked_mul(factor).unwrap_or(Duration::MAX)
}

async fn run_task(
    item: WorkItem,
    factory: Arc<dyn SessionFactory>,
    sem: Arc<Semaphore>,
    job: Arc<JobSettings>,
    stagger: Duration,
    mut shutdown: Shutdown,
) -> TaskResult {
    let done = |outcome| TaskResult {
        outcome,
        session_failed: false,
    };

    if let Some(skipped) = precheck(&item, &job) {
        return done(skipped);
    }

    tokio::select! {
        biased;
        _ = shutdown.wait() => return done(failed(&item, &ScrapeError::Interrupted)),
        _ = tokio::time::sleep(stagger) => {}
    }

    let _permit = match sem.acquire().await {
        Ok(permit) => permit,
        Err(_) => return done(failed(&item, &ScrapeError::Pool("semaphore closed".into()))),
    };
    if shutdown.is_triggered() {
        return done(failed(&item, &ScrapeError::Interrupted));
    }

    let mut session = match factory.create().await {
        Ok(session) => session,
        Err(e) => {
            return TaskResult {
                outcome: failed(&item, &e),
                session_failed: true,
            }
        }
    };

    let result = tokio::select! {
        biased;
        _ = shutdown.wait() => Err(ScrapeError::Interrupted),
        r = navigate_and_extract(session.as_mut(), &item, &job) => r,
    };

    if let Err(e) = session.close().await {
        warn!(item = item.id_or_placeholder(), "Session teardown failed: {}", e);
    }

    done(match result {
        Ok(outcome) => outcome,
        Err(e) => failed(&item, &e),
    })
}

async fn navigate_and_extract(
    session: &mut dyn BrowserSession,
    item: &WorkItem,
    job: &JobSettings,
) -> Result<ExtractionOutcome> {
    open_site(session, job).await?;
    extract_item(session, item, job).await
}

// ── Sequential ──

/// One session for the whole batch. Only session setup errors escape.
pub async fn run_sequential(
    factory: &dyn SessionFactory,
    items: &[WorkItem],
    job: &JobSettings,
    shutdown: &Shutdown,
) -> Result<RunStats> {
    info!("Sequential extraction of {} items", items.len());
    let mut session = factory.create().await?;
    let mut ctx = RunContext::default();

    let result = sequential_loop(session.as_mut(), items, job, shutdown, &mut ctx).await;
    if let Err(e) = session.close().await {
        warn!("Session teardown failed: {}", e);
    }
    result.map(|()| ctx.stats)
}

async fn sequential_loop(
    session: &mut dyn BrowserSession,
    items: &[WorkItem],
    job: &JobSettings,
    shutdown: &Shutdown,
    ctx: &mut RunContext,
) -> Result<()> {
    let pending = items.iter().any(|item| precheck(item, job).is_none());
    if pending {
        open_site(session, job).await?;
    }

    let pb = progress_bar(items.len());
    for item in items {
        let outcome = if shutdown.is_triggered() {
            failed(item, &ScrapeError::Interrupted)
        } else if let Some(skipped) = precheck(item, job) {
            skipped
        } else {
            if !ctx.fully_expanded {
                let expanded = session
                    .expand_all(job.behavior.max_expand_attempts, Delays::secs(job.delays.expand_menu))
                    .await;
                if let Err(e) = expanded {
                    warn!("Full sidebar expansion failed: {}", e);
                }
                ctx.fully_expanded = true;
            }
            match extract_item(session, item, job).await {
                Ok(outcome) => outcome,
                Err(e) => failed(item, &e),
            }
        };
        ctx.stats = ctx.stats.record(outcome.status);
        pb.inc(1);
    }
    pb.finish_and_clear();
    Ok(())
}

// ── Tests ──
