use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{BrowserSession, ContentState, SessionFactory};
use crate::config::{BrowserSettings, Delays, Selectors, Settings};
use crate::error::{Result, ScrapeError};

const SIDEBAR_POLL: Duration = Duration::from_millis(250);

// Every snippet is a function of JSON arguments returning a JSON string.

const JS_EXISTS: &str = "(sel) => JSON.stringify(document.querySelector(sel) !== null)";

const JS_OUTER_HTML: &str = r#"(sel) => {
  const el = document.querySelector(sel);
  return JSON.stringify(el ? el.outerHTML : null);
}"#;

const JS_EXPAND_COLLAPSED: &str = r#"(container, collapsed) => {
  let clicked = 0;
  for (const icon of document.querySelectorAll(container + ' ' + collapsed)) {
    const target = icon.closest('li') || icon;
    try { target.scrollIntoView({block: 'center'}); target.click(); clicked++; } catch (e) {}
  }
  return JSON.stringify(clicked);
}"#;

const JS_EXPAND_MENU: &str = r#"(container, clickable, collapsed, expander, text) => {
  const clean = s => (s || '').replace(/\s+/g, ' ').trim();
  for (const li of document.querySelectorAll(container + ' ' + clickable)) {
    if (!li.querySelector(expander)) continue;
    const label = li.querySelector('div.align-middle') || li;
    if (clean(label.textContent) !== text) continue;
    if (li.querySelector(collapsed)) {
      li.scrollIntoView({block: 'center'});
      li.click();
      return JSON.stringify('expanded');
    }
    return JSON.stringify('open');
  }
  return JSON.stringify('missing');
}"#;

const JS_ACTIVATE: &str = r#"(id) => {
  const el = document.getElementById(id);
  if (!el) return JSON.stringify(false);
  el.scrollIntoView({block: 'center'});
  el.click();
  return JSON.stringify(true);
}"#;

const JS_CONTENT_STATE: &str = r#"(loader, pane) => {
  const spinner = document.querySelector(loader);
  const content = document.querySelector(pane);
  return JSON.stringify({
    loading: !!spinner && spinner.offsetParent !== null,
    content: !!content && content.textContent.trim().length > 0,
  });
}"#;

const JS_INNER_HTML: &str = r#"(sel) => {
  const el = document.querySelector(sel);
  return JSON.stringify(el ? el.innerHTML : null);
}"#;

const JS_TAB_LABELS: &str = r#"(pane, tab) => {
  const root = document.querySelector(pane) || document;
  return JSON.stringify(
    Array.from(root.querySelectorAll(tab)).map(b => b.textContent.replace(/\s+/g, ' ').trim())
  );
}"#;

const JS_CLICK_TAB: &str = r#"(pane, tab, index) => {
  const root = document.querySelector(pane) || document;
  const button = root.querySelectorAll(tab)[index];
  if (!button) return JSON.stringify(false);
  button.click();
  return JSON.stringify(true);
}"#;

#[derive(Deserialize)]
struct WireContentState {
    loading: bool,
    content: bool,
}

/// `(function)(arg, ...)` with every argument JSON-encoded.
pub fn invocation(function: &str, args: &[Value]) -> String {
    let args: Vec<String> = args.iter().map(Value::to_string).collect();
    format!("({})({})", function.trim(), args.join(", "))
}

pub fn launch_options(settings: &BrowserSettings) -> LaunchOptions<'static> {
    LaunchOptions {
        headless: settings.headless,
        sandbox: settings.sandbox,
        window_size: Some((settings.window_width, settings.window_height)),
        path: settings.chrome_path.clone(),
        idle_browser_timeout: Delays::secs(settings.idle_timeout),
        ..Default::default()
    }
}

/// Run a blocking DevTools call off the async workers.
async fn blocking<T, F>(call: F) -> Result<T>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| ScrapeError::Session(format!("browser call aborted: {}", e)))?
        .map_err(|e| ScrapeError::Session(format!("{:#}", e)))
}

/// Launches one Chrome per session.
pub struct ChromeFactory {
    browser: BrowserSettings,
    selectors: Selectors,
    delays: Delays,
}

impl ChromeFactory {
    pub fn new(settings: &Settings) -> Self {
        ChromeFactory {
            browser: settings.browser.clone(),
            selectors: settings.selectors.clone(),
            delays: settings.delays.clone(),
        }
    }
}

#[async_trait]
impl SessionFactory for ChromeFactory {
    async fn create(&self) -> Result<Box<dyn BrowserSession>> {
        let options = self.browser.clone();
        let timeout = Delays::secs(self.delays.navigation);
        let (browser, tab) = blocking(move || {
            let browser = Browser::new(launch_options(&options))?;
            let tab = browser.new_tab()?;
            tab.set_default_timeout(timeout);
            Ok((browser, tab))
        })
        .await?;
        debug!("Launched Chrome session");

        Ok(Box::new(ChromeSession {
            browser: Some(browser),
            tab,
            selectors: self.selectors.clone(),
            delays: self.delays.clone(),
        }))
    }
}

pub struct ChromeSession {
    /// Dropping the browser kills the Chrome process.
    browser: Option<Browser>,
    tab: Arc<Tab>,
    selectors: Selectors,
    delays: Delays,
}

impl ChromeSession {
    /// The returned future owns its tab handle, so no borrow of the session
    /// is held across the await.
    fn eval<T>(&self, function: &str, args: Vec<Value>) -> impl Future<Output = Result<T>> + Send
    where
        T: DeserializeOwned,
    {
        let tab = Arc::clone(&self.tab);
        let expression = invocation(function, &args);
        async move {
            let value = blocking(move || Ok(tab.evaluate(&expression, false)?.value)).await?;
            let raw = value
                .as_ref()
                .and_then(Value::as_str)
                .ok_or_else(|| ScrapeError::Session("script returned no value".into()))?;
            Ok(serde_json::from_str(raw)?)
        }
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        info!("Navigating to {}", url);
        let tab = Arc::clone(&self.tab);
        let target = url.to_string();
        blocking(move || {
            tab.navigate_to(&target)?.wait_until_navigated()?;
            Ok(())
        })
        .await
        .map_err(|e| ScrapeError::Navigation(format!("{}: {}", url, e)))
    }

    async fn wait_for_sidebar(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let container = self.selectors.sidebar_container.clone();
        loop {
            if self.eval::<bool>(JS_EXISTS, vec![json!(container)]).await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ScrapeError::Navigation(format!(
                    "sidebar {} not found within {:.1}s",
                    container,
                    timeout.as_secs_f64()
                )));
            }
            tokio::time::sleep(SIDEBAR_POLL).await;
        }
    }

    async fn expand_all(&mut self, max_attempts: u32, delay: Duration) -> Result<usize> {
        let mut total = 0;
        for attempt in 1..=max_attempts {
            let clicked: usize = self
                .eval(
                    JS_EXPAND_COLLAPSED,
                    vec![
                        json!(self.selectors.sidebar_container),
                        json!(self.selectors.collapsed_icon),
                    ],
                )
                .await?;
            debug!(attempt, clicked, "Expand pass");
            if clicked == 0 {
                break;
            }
            total += clicked;
            tokio::time::sleep(delay).await;
        }
        tokio::time::sleep(Delays::secs(self.delays.post_expand_settle)).await;
        info!("Expanded {} sidebar menus", total);
        Ok(total)
    }

    async fn sidebar_html(&mut self) -> Result<String> {
        let html: Option<String> = self
            .eval(JS_OUTER_HTML, vec![json!(self.selectors.sidebar_container)])
            .await?;
        html.ok_or_else(|| ScrapeError::Navigation("sidebar container disappeared".into()))
    }

    async fn reveal_path(&mut self, menu_texts: &[String]) -> Result<()> {
        for text in menu_texts {
            let s = &self.selectors;
            let args = vec![
                json!(s.sidebar_container),
                json!(s.clickable_entry),
                json!(s.collapsed_icon),
                json!(s.expander_icon),
                json!(text),
            ];
            let state: String = self.eval(JS_EXPAND_MENU, args).await?;
            match state.as_str() {
                "expanded" => tokio::time::sleep(Delays::secs(self.delays.expand_menu)).await,
                "open" => {}
                _ => {
                    warn!("Menu {:?} not found in sidebar", text);
                    return Err(ScrapeError::Navigation(format!("menu {:?} not found", text)));
                }
            }
        }
        Ok(())
    }

    async fn activate(&mut self, item_id: &str) -> Result<()> {
        let found: bool = self.eval(JS_ACTIVATE, vec![json!(item_id)]).await?;
        if !found {
            return Err(ScrapeError::Navigation(format!("item {} not in sidebar", item_id)));
        }
        tokio::time::sleep(Delays::secs(self.delays.post_click)).await;
        Ok(())
    }

    async fn content_state(&mut self) -> Result<ContentState> {
        let wire: WireContentState = self
            .eval(
                JS_CONTENT_STATE,
                vec![json!(self.selectors.loader), json!(self.selectors.content_pane)],
            )
            .await?;
        Ok(ContentState {
            loading: wire.loading,
            content_present: wire.content,
        })
    }

    async fn content_html(&mut self) -> Result<Option<String>> {
        self.eval(JS_INNER_HTML, vec![json!(self.selectors.content_pane)])
            .await
    }

    async fn response_tabs(&mut self) -> Result<Vec<String>> {
        self.eval(
            JS_TAB_LABELS,
            vec![json!(self.selectors.content_pane), json!(self.selectors.response_tab)],
        )
        .await
    }

    async fn open_response_tab(&mut self, index: usize) -> Result<Option<String>> {
        let clicked: bool = self
            .eval(
                JS_CLICK_TAB,
                vec![
                    json!(self.selectors.content_pane),
                    json!(self.selectors.response_tab),
                    json!(index),
                ],
            )
            .await?;
        if !clicked {
            return Ok(None);
        }
        tokio::time::sleep(Delays::secs(self.delays.response_tab)).await;
        self.eval(JS_INNER_HTML, vec![json!(self.selectors.active_tab_panel)])
            .await
    }

    async fn close(&mut self) -> Result<()> {
        let Some(browser) = self.browser.take() else {
            return Ok(());
        };
        let tab = Arc::clone(&self.tab);
        blocking(move || {
            let closed = tab.close(false).map(|_| ());
            drop(browser);
            closed
        })
        .await?;
        debug!("Closed Chrome session");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocation_encodes_arguments() {
        let expr = invocation("(a, b) => a + b", &[json!("it's \"quoted\""), json!(3)]);
        assert_eq!(expr, r#"((a, b) => a + b)("it's \"quoted\"", 3)"#);
        assert_eq!(invocation(" () => 1 ", &[]), "(() => 1)()");
    }

    #[test]
    fn launch_options_follow_settings() {
        let settings = BrowserSettings {
            headless: false,
            window_width: 1280,
            window_height: 800,
            idle_timeout: 90.0,
            ..Default::default()
        };
        let opts = launch_options(&settings);
        assert!(!opts.headless);
        assert!(opts.sandbox);
        assert_eq!(opts.window_size, Some((1280, 800)));
        assert_eq!(opts.idle_browser_timeout, Duration::from_secs(90));
        assert!(opts.path.is_none());
    }

    #[test]
    fn content_state_wire_shape() {
        let wire: WireContentState =
            serde_json::from_str(r#"{"loading":false,"content":true}"#).unwrap();
        assert!(!wire.loading);
        assert!(wire.content);
    }
}
