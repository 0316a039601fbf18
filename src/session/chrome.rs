use crate::errors::{Result, ScrapeError};
use crate::scrapers::locator::Strategy;
use crate::session::{ElementHandle, RenderSession, SessionFactory};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptionsBuilder, Tab};
use log::{debug, info, warn};
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

const BROWSER_FLAGS: &[&str] = &[
    "--start-maximized",
    "--disable-popup-blocking",
    "--disable-notifications",
    "--disable-infobars",
    "--disable-extensions",
];

const FIRST_POLL: Duration = Duration::from_millis(100);
const MAX_POLL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ChromeOptions {
    pub headless: bool,
    pub window_size: (u32, u32),
    /// How long the browser may sit without commands before it shuts itself down.
    pub idle_timeout: Duration,
}

impl Default for ChromeOptions {
    fn default() -> Self {
        Self {
            headless: true,
            window_size: (1920, 1080),
            idle_timeout: Duration::from_secs(120),
        }
    }
}

fn session_err(e: impl std::fmt::Display) -> ScrapeError {
    ScrapeError::SessionError(e.to_string())
}

/// JavaScript expression that evaluates to the element or `null`.
fn js_lookup(strategy: &Strategy) -> Result<String> {
    let literal = serde_json::to_string(strategy.pattern())?;
    let expr = match strategy {
        Strategy::ElementId(_) => format!("document.getElementById({})", literal),
        Strategy::Css(_) => format!("document.querySelector({})", literal),
        Strategy::LinkText(_) => format!(
            "(Array.from(document.querySelectorAll('a')).find(a => a.textContent.includes({})) || null)",
            literal
        ),
        Strategy::LinkLabel(_) => format!(
            "(Array.from(document.querySelectorAll('a')).find(a => a.textContent.trim() === {}) || null)",
            literal
        ),
        Strategy::LinkTitle(_) => format!(
            "(Array.from(document.querySelectorAll('a')).find(a => a.getAttribute('title') === {}) || null)",
            literal
        ),
    };
    Ok(expr)
}

/// Wrap an action on the located element; the script yields `false` when
/// the element is gone.
fn js_on_element(strategy: &Strategy, action: &str) -> Result<String> {
    Ok(format!(
        "(() => {{ const el = {}; if (!el) {{ return false; }} {} return true; }})()",
        js_lookup(strategy)?,
        action
    ))
}

/// One headless Chrome process with a single tab.
pub struct ChromeSession {
    browser: Option<Browser>,
    tab: Option<Arc<Tab>>,
}

impl ChromeSession {
    pub async fn launch(options: ChromeOptions) -> Result<Self> {
        tokio::task::spawn_blocking(move || Self::launch_blocking(&options)).await?
    }

    fn launch_blocking(options: &ChromeOptions) -> Result<Self> {
        let args: Vec<&OsStr> = BROWSER_FLAGS.iter().map(OsStr::new).collect();
        let launch_opts = LaunchOptionsBuilder::default()
            .headless(options.headless)
            .window_size(Some(options.window_size))
            .idle_browser_timeout(options.idle_timeout)
            .args(args)
            .build()
            .map_err(|e| ScrapeError::ConfigError(format!("invalid browser launch options: {}", e)))?;

        let browser = Browser::new(launch_opts).map_err(session_err)?;
        let tab = browser.new_tab().map_err(session_err)?;
        info!("Launched Chrome (headless: {})", options.headless);

        Ok(Self {
            browser: Some(browser),
            tab: Some(tab),
        })
    }

    fn tab(&self) -> Result<Arc<Tab>> {
        self.tab.clone().ok_or(ScrapeError::SessionClosed)
    }
}

/// Run a blocking tab call on the blocking pool.
async fn on_tab<T, F>(tab: Arc<Tab>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Tab) -> anyhow::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&tab).map_err(session_err)).await?
}

async fn evaluate_bool(tab: Arc<Tab>, script: String) -> Result<bool> {
    on_tab(tab, move |tab| {
        let result = tab.evaluate(&script, false)?;
        Ok(result.value.and_then(|v| v.as_bool()).unwrap_or(false))
    })
    .await
}

async fn act_on(tab: Arc<Tab>, element: &ElementHandle, action: &str) -> Result<()> {
    let script = js_on_element(element.strategy(), action)?;
    if evaluate_bool(tab, script).await? {
        Ok(())
    } else {
        Err(ScrapeError::ElementGone(element.strategy().to_string()))
    }
}

#[async_trait]
impl RenderSession for ChromeSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        let url = url.to_string();
        debug!("Navigating to {}", url);
        on_tab(self.tab()?, move |tab| {
            tab.navigate_to(&url)?.wait_until_navigated()?;
            Ok(())
        })
        .await
    }

    async fn wait_for_element(
        &mut self,
        strategy: &Strategy,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>> {
        let tab = self.tab()?;
        let script = js_on_element(strategy, "")?;
        let start = Instant::now();
        let mut interval = FIRST_POLL;

        loop {
            if evaluate_bool(tab.clone(), script.clone()).await? {
                return Ok(Some(ElementHandle::new(strategy.clone())));
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                debug!("{} not present after {:?}", strategy, timeout);
                return Ok(None);
            }

            tokio::time::sleep(interval.min(timeout - elapsed)).await;
            interval = (interval * 2).min(MAX_POLL);
        }
    }

    async fn scroll_into_view(&mut self, element: &ElementHandle) -> Result<()> {
        act_on(self.tab()?, element, "el.scrollIntoView(true);").await
    }

    async fn click(&mut self, element: &ElementHandle) -> Result<()> {
        act_on(self.tab()?, element, "el.click();").await
    }

    async fn current_markup(&mut self) -> Result<String> {
        on_tab(self.tab()?, |tab| tab.get_content()).await
    }

    async fn close(&mut self) -> Result<()> {
        let Some(tab) = self.tab.take() else {
            return Ok(());
        };
        let browser = self.browser.take();

        tokio::task::spawn_blocking(move || {
            if let Err(e) = tab.close(true) {
                warn!("Failed to close tab cleanly: {}", e);
            }
            // Dropping the browser terminates the Chrome process.
            drop(browser);
        })
        .await?;

        info!("Chrome session closed");
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChromeFactory {
    options: ChromeOptions,
}

impl ChromeFactory {
    pub fn new(options: ChromeOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl SessionFactory for ChromeFactory {
    async fn open(&self) -> Result<Box<dyn RenderSession>> {
        let session = ChromeSession::launch(self.options.clone()).await?;
        Ok(Box::new(session))
    }
}
