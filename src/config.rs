use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Result, ScrapeError};

const ENV_PREFIX: &str = "APIDOC";

/// Which raw sidebar layout the parser should assume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LayoutSetting {
    #[default]
    Auto,
    Hierarchical,
    Flat,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub target_url: String,
    pub output_directory: PathBuf,
    pub structure_file: String,
    pub layout: LayoutSetting,
    pub browser: BrowserSettings,
    pub delays: Delays,
    pub behavior: Behavior,
    pub concurrency: ConcurrencyConfig,
    pub selectors: Selectors,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            target_url: String::new(),
            output_directory: PathBuf::from("output"),
            structure_file: "sidebar_structure.json".to_string(),
            layout: LayoutSetting::Auto,
            browser: BrowserSettings::default(),
            delays: Delays::default(),
            behavior: Behavior::default(),
            concurrency: ConcurrencyConfig::default(),
            selectors: Selectors::default(),
        }
    }
}

/// How each Chrome instance is launched.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    pub sandbox: bool,
    /// Chrome binary; auto-detected when unset.
    pub chrome_path: Option<PathBuf>,
    pub window_width: u32,
    pub window_height: u32,
    /// Seconds without DevTools traffic before the browser is considered dead.
    pub idle_timeout: f64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        BrowserSettings {
            headless: true,
            sandbox: true,
            chrome_path: None,
            window_width: 1920,
            window_height: 1080,
            idle_timeout: 300.0,
        }
    }
}

/// Timeouts and pauses, in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Delays {
    pub navigation: f64,
    pub sidebar_wait: f64,
    pub expand_menu: f64,
    pub post_expand_settle: f64,
    pub post_click: f64,
    pub content_wait: f64,
    pub content_poll: f64,
    pub response_tab: f64,
}

impl Default for Delays {
    fn default() -> Self {
        Delays {
            navigation: 10.0,
            sidebar_wait: 15.0,
            expand_menu: 0.5,
            post_expand_settle: 1.0,
            post_click: 1.0,
            content_wait: 15.0,
            content_poll: 0.25,
            response_tab: 0.5,
        }
    }
}

impl Delays {
    pub fn secs(value: f64) -> Duration {
        Duration::from_secs_f64(value.max(0.0))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Behavior {
    pub max_expand_attempts: u32,
}

impl Default for Behavior {
    fn default() -> Self {
        Behavior {
            max_expand_attempts: 10,
        }
    }
}

/// Parallel extraction tuning.
///
/// `avg_item_secs`, `efficiency_factor` and `worker_startup_secs` feed the
/// speedup estimate only; they are fixed tunables, never measured at runtime.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub enabled: bool,
    pub max_workers: usize,
    pub min_items_threshold: usize,
    pub task_start_delay: f64,
    pub min_speedup_factor: f64,
    pub max_fallback_retries: u32,
    pub avg_item_secs: f64,
    pub efficiency_factor: f64,
    pub worker_startup_secs: f64,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        ConcurrencyConfig {
            enabled: true,
            max_workers: 3,
            min_items_threshold: 5,
            task_start_delay: 0.5,
            min_speedup_factor: 1.3,
            max_fallback_retries: 2,
            avg_item_secs: 8.0,
            efficiency_factor: 1.0,
            worker_startup_secs: 10.0,
        }
    }
}

/// CSS selectors describing the navigation widget and the content pane.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Selectors {
    pub sidebar_container: String,
    pub entry_tag: String,
    pub header_marker: String,
    pub header_text: String,
    pub clickable_entry: String,
    pub expander_icon: String,
    pub collapsed_icon: String,
    pub item_text: Vec<String>,
    pub menu_text: Vec<String>,
    pub content_pane: String,
    pub loader: String,
    pub response_tab: String,
    pub active_tab_panel: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Selectors {
            sidebar_container: "div.filter-api-sidebar-wrapper".to_string(),
            entry_tag: "app-api-doc-item".to_string(),
            header_marker: "li.toc-item-divider".to_string(),
            header_text: "a".to_string(),
            clickable_entry: "li.toc-item-highlight".to_string(),
            expander_icon: "i.dds__icon--chevron-right, i.dds__icon--chevron-down".to_string(),
            collapsed_icon: "i.dds__icon--chevron-right".to_string(),
            item_text: vec![
                "span[id$='-sp']".to_string(),
                "span".to_string(),
                "a".to_string(),
                "div".to_string(),
            ],
            menu_text: vec![
                "div.align-middle.dds__text-truncate.dds__position-relative".to_string(),
                "div.align-middle.dds__text-truncate".to_string(),
                "div.align-middle".to_string(),
                "span".to_string(),
                "div".to_string(),
            ],
            content_pane: "#documentation".to_string(),
            loader: "#loaderActive".to_string(),
            response_tab: "app-api-doc-response button[role=tab]".to_string(),
            active_tab_panel: "app-api-doc-response [role=tabpanel]:not([hidden])".to_string(),
        }
    }
}

impl Selectors {
    /// The list directly under the sidebar container, with or without the
    /// intermediate sidebar component.
    pub fn sidebar_root(&self) -> String {
        format!(
            "{c} > app-api-doc-sidebar > ul, {c} > ul",
            c = self.sidebar_container
        )
    }
}

impl Settings {
    /// Layered load: optional config file, then `APIDOC__SECTION__KEY` env vars.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
        } else {
            debug!("No config file at {}, using defaults", path.display());
        }
        let raw = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let settings: Settings = raw.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let c = &self.concurrency;
        if c.max_workers == 0 {
            return Err(ScrapeError::Config("concurrency.max_workers must be at least 1".into()));
        }
        if c.min_speedup_factor <= 0.0 || c.efficiency_factor <= 0.0 || c.avg_item_secs <= 0.0 {
            return Err(ScrapeError::Config(
                "concurrency speedup tunables must be positive".into(),
            ));
        }
        if c.task_start_delay < 0.0 || c.worker_startup_secs < 0.0 {
            return Err(ScrapeError::Config("concurrency delays must be non-negative".into()));
        }
        let b = &self.browser;
        if b.window_width == 0 || b.window_height == 0 || b.idle_timeout <= 0.0 {
            return Err(ScrapeError::Config(
                "browser window size and idle_timeout must be positive".into(),
            ));
        }
        if let Some(path) = &b.chrome_path {
            if !path.exists() {
                return Err(ScrapeError::Config(format!(
                    "browser.chrome_path {} does not exist",
                    path.display()
                )));
            }
        }
        if self.structure_file.trim().is_empty() {
            return Err(ScrapeError::Config("structure_file cannot be empty".into()));
        }
        Ok(())
    }

    /// Only runs that touch the site need a target.
    pub fn require_target_url(&self) -> Result<&str> {
        let url = self.target_url.trim();
        if url.is_empty() {
            return Err(ScrapeError::Config(
                "target_url is required (config file, APIDOC__TARGET_URL or --url)".into(),
            ));
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ScrapeError::Config(format!(
                "target_url must start with http:// or https://, got {}",
                url
            )));
        }
        Ok(url)
    }

    pub fn structure_path(&self) -> PathBuf {
        self.output_directory.join(&self.structure_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let s = Settings::default();
        assert!(s.validate().is_ok());
        assert_eq!(s.concurrency.min_items_threshold, 5);
        assert_eq!(s.concurrency.max_fallback_retries, 2);
        assert!((s.concurrency.min_speedup_factor - 1.3).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_workers_rejected() {
        let mut s = Settings::default();
        s.concurrency.max_workers = 0;
        assert!(matches!(s.validate(), Err(ScrapeError::Config(_))));
    }

    #[test]
    fn bad_browser_settings_rejected() {
        let mut s = Settings::default();
        s.browser.window_width = 0;
        assert!(s.validate().is_err());

        let mut s = Settings::default();
        s.browser.chrome_path = Some(PathBuf::from("/nonexistent/chrome-binary"));
        assert!(matches!(s.validate(), Err(ScrapeError::Config(_))));
    }

    #[test]
    fn target_url_must_be_http() {
        let mut s = Settings::default();
        assert!(s.require_target_url().is_err());
        s.target_url = "ftp://example.com".into();
        assert!(s.require_target_url().is_err());
        s.target_url = "https://developer.example.com/apis/4.0".into();
        assert_eq!(s.require_target_url().unwrap(), "https://developer.example.com/apis/4.0");
    }

    #[test]
    fn loads_yaml_file_with_partial_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "target_url: https://developer.example.com/apis\noutput_directory: docs\nconcurrency:\n  max_workers: 6\n",
        )
        .unwrap();
        let s = Settings::load(&path).unwrap();
        assert_eq!(s.target_url, "https://developer.example.com/apis");
        assert_eq!(s.output_directory, PathBuf::from("docs"));
        assert_eq!(s.concurrency.max_workers, 6);
        assert_eq!(s.concurrency.min_items_threshold, 5);
        assert_eq!(s.structure_path(), PathBuf::from("docs/sidebar_structure.json"));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = Settings::load(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(s.output_directory, PathBuf::from("output"));
    }
}
