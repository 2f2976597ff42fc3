use std::sync::Arc;

use tracing::{error, info, warn};

use crate::browser::SessionFactory;
use crate::config::{ConcurrencyConfig, Delays};
use crate::error::{Result, ScrapeError};
use crate::model::{RunStats, WorkItem};
use crate::scraper::{self, JobSettings, WorkerPool};
use crate::shutdown::Shutdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Sequential,
    Parallel,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeDecision {
    pub mode: ExecutionMode,
    /// Only computed once the cheap checks pass.
    pub estimated_speedup: Option<f64>,
    pub reason: &'static str,
}

/// Modelled sequential time over modelled parallel time.
pub fn estimate_speedup(n: usize, cfg: &ConcurrencyConfig) -> f64 {
    let n = n as f64;
    let workers = cfg.max_workers.max(1) as f64;
    let sequential = n * cfg.avg_item_secs;
    let parallel = (n / workers) * cfg.avg_item_secs / cfg.efficiency_factor
        + n * cfg.task_start_delay
        + workers * cfg.worker_startup_secs;
    if parallel <= 0.0 {
        return 1.0;
    }
    sequential / parallel
}

pub fn choose_mode(candidate_count: usize, cfg: &ConcurrencyConfig) -> ModeDecision {
    let sequential = |reason, estimated_speedup| ModeDecision {
        mode: ExecutionMode::Sequential,
        estimated_speedup,
        reason,
    };

    if !cfg.enabled {
        return sequential("parallel extraction disabled", None);
    }
    if candidate_count < cfg.min_items_threshold {
        return sequential("below minimum item threshold", None);
    }
    let speedup = estimate_speedup(candidate_count, cfg);
    if speedup < cfg.min_speedup_factor {
        return sequential("estimated speedup too small", Some(speedup));
    }
    ModeDecision {
        mode: ExecutionMode::Parallel,
        estimated_speedup: Some(speedup),
        reason: "estimated speedup worth it",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackDecision {
    /// Re-run the whole batch sequentially.
    Fallback,
    Fatal,
}

/// Policy for a broken parallel stage.
pub struct ErrorManager {
    max_fallback_retries: u32,
}

impl ErrorManager {
    pub fn new(max_fallback_retries: u32) -> Self {
        ErrorManager { max_fallback_retries }
    }

    pub fn decide(&self, err: &ScrapeError) -> FallbackDecision {
        match err {
            ScrapeError::Interrupted => FallbackDecision::Fatal,
            _ if self.max_fallback_retries > 0 => FallbackDecision::Fallback,
            _ => FallbackDecision::Fatal,
        }
    }
}

/// Pick a mode, run it, fall back to sequential when the parallel stage breaks.
pub async fn run_extraction(
    factory: Arc<dyn SessionFactory>,
    items: Vec<WorkItem>,
    job: Arc<JobSettings>,
    cfg: &ConcurrencyConfig,
    shutdown: Shutdown,
) -> Result<RunStats> {
    let decision = choose_mode(items.len(), cfg);
    match decision.estimated_speedup {
        Some(speedup) => info!(
            "Execution mode {:?} for {} items ({}, estimated speedup {:.2}x)",
            decision.mode,
            items.len(),
            decision.reason,
            speedup
        ),
        None => info!(
            "Execution mode {:?} for {} items ({})",
            decision.mode,
            items.len(),
            decision.reason
        ),
    }

    if decision.mode == ExecutionMode::Sequential {
        return scraper::run_sequential(factory.as_ref(), &items, &job, &shutdown).await;
    }

    let pool = WorkerPool::new(
        Arc::clone(&factory),
        cfg.max_workers,
        Delays::secs(cfg.task_start_delay),
        shutdown.clone(),
    );
    match pool.run_parallel(items.clone(), Arc::clone(&job)).await {
        Ok(stats) => Ok(stats),
        Err(e) => match ErrorManager::new(cfg.max_fallback_retries).decide(&e) {
            FallbackDecision::Fallback => {
                warn!("Parallel stage failed ({}), re-running sequentially", e);
                scraper::run_sequential(factory.as_ref(), &items, &job, &shutdown).await
            }
            FallbackDecision::Fatal => {
                error!("Parallel stage failed: {}", e);
                Err(e)
            }
        },
    }
}

// ── Tests ──
