pub mod chrome;

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::Result;
use crate::markdown::{self, ResponseTab};

pub use chrome::ChromeFactory;

/// Snapshot of the content pane, polled until ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContentState {
    pub loading: bool,
    pub content_present: bool,
}

impl ContentState {
    pub fn is_ready(&self) -> bool {
        !self.loading && self.content_present
    }
}

/// One exclusive browser session. Never shared between workers.
#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<()>;

    async fn wait_for_sidebar(&mut self, timeout: Duration) -> Result<()>;

    /// Click collapsed expanders until none are left or `max_attempts`
    /// rounds have run. Returns how many were clicked.
    async fn expand_all(&mut self, max_attempts: u32, delay: Duration) -> Result<usize>;

    async fn sidebar_html(&mut self) -> Result<String>;

    /// Expand each menu in order, outermost first.
    async fn reveal_path(&mut self, menu_texts: &[String]) -> Result<()>;

    async fn activate(&mut self, item_id: &str) -> Result<()>;

    async fn content_state(&mut self) -> Result<ContentState>;

    /// Poll `content_state` until ready. `false` on timeout.
    async fn wait_content_ready(&mut self, timeout: Duration, poll: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.content_state().await?.is_ready() {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Inner HTML of the content pane, if there is one.
    async fn content_html(&mut self) -> Result<Option<String>>;

    /// Labels of the response status tabs on the current page.
    async fn response_tabs(&mut self) -> Result<Vec<String>>;

    /// Click the tab at `index` and return the active panel's HTML.
    async fn open_response_tab(&mut self, index: usize) -> Result<Option<String>>;

    /// Content pane as markdown. With more than one response tab, every tab
    /// is opened in turn and rendered as its own section.
    async fn extract_markdown(&mut self) -> Result<Option<String>> {
        let Some(html) = self.content_html().await? else {
            return Ok(None);
        };
        let labels = self.response_tabs().await?;
        let mut tabs = Vec::new();
        if labels.len() > 1 {
            debug!(count = labels.len(), "Reading response tabs");
            for (index, status) in labels.into_iter().enumerate() {
                match self.open_response_tab(index).await {
                    Ok(Some(html)) => tabs.push(ResponseTab { status, html }),
                    Ok(None) => debug!(status = %status, "Response tab has no active panel"),
                    Err(e) => warn!(status = %status, "Failed to read response tab: {}", e),
                }
            }
        }
        Ok(markdown::html_to_markdown_with_responses(&html, &tabs))
    }

    async fn close(&mut self) -> Result<()>;
}

#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(&self) -> Result<Box<dyn BrowserSession>>;
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::testing::FakeFactory;
    use super::*;

    #[test]
    fn ready_needs_content_and_no_loader() {
        assert!(ContentState { loading: false, content_present: true }.is_ready());
        assert!(!ContentState { loading: true, content_present: true }.is_ready());
        assert!(!ContentState::default().is_ready());
    }

    #[tokio::test]
    async fn wait_times_out_without_content() {
        let mut factory = FakeFactory::default();
        factory.empty.insert("n1".into());
        let mut session = factory.create().await.unwrap();
        session.activate("n1").await.unwrap();
        let ready = session
            .wait_content_ready(Duration::from_millis(30), Duration::from_millis(5))
            .await
            .unwrap();
        assert!(!ready);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn extract_reads_every_response_tab() {
        let factory = FakeFactory {
            responses: vec![
                ("200".into(), "<p>Volume list.</p>".into()),
                ("broken".into(), String::new()),
                ("404".into(), "<p>No such volume.</p>".into()),
            ],
            ..Default::default()
        };
        let mut session = factory.create().await.unwrap();
        session.activate("docs-node-4").await.unwrap();
        let md = session.extract_markdown().await.unwrap().unwrap();

        assert_eq!(factory.stats.tabs_opened.load(Ordering::SeqCst), 3);
        assert_eq!(
            md,
            "# docs-node-4\n\nBody of docs-node-4.\n\n### Response 200\n\nVolume list.\n\n### Response 404\n\nNo such volume.\n"
        );
    }

    #[tokio::test]
    async fn single_response_tab_is_not_clicked() {
        let factory = FakeFactory {
            responses: vec![("200".into(), "<p>Volume list.</p>".into())],
            ..Default::default()
        };
        let mut session = factory.create().await.unwrap();
        session.activate("docs-node-4").await.unwrap();
        let md = session.extract_markdown().await.unwrap().unwrap();

        assert_eq!(factory.stats.tabs_opened.load(Ordering::SeqCst), 0);
        assert!(md.contains("Default panel"));
        assert!(!md.contains("### Response"));
    }

    #[tokio::test]
    async fn wait_returns_once_ready() {
        let factory = FakeFactory::default();
        let mut session = factory.create().await.unwrap();
        session.activate("n2").await.unwrap();
        assert!(session
            .wait_content_ready(Duration::from_secs(1), Duration::from_millis(5))
            .await
            .unwrap());
    }
}
