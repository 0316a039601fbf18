//! A render session that replays captured markup instead of driving a
//! browser. The first document is the landing page; every click moves to
//! the next captured page.

use crate::errors::{Result, ScrapeError};
use crate::scrapers::locator::Strategy;
use crate::session::{ElementHandle, RenderSession, SessionFactory};
use async_trait::async_trait;
use log::{debug, info};
use scraper::Html;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Counters shared between a replay session and whoever created it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub closes: usize,
    pub clicks: usize,
    pub scrolls: usize,
    pub navigations: Vec<String>,
    pub lookups: Vec<Strategy>,
}

#[derive(Debug, Clone, Default)]
pub struct ReplayStatsHandle(Arc<Mutex<ReplayStats>>);

impl ReplayStatsHandle {
    pub fn snapshot(&self) -> ReplayStats {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, ReplayStats> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct ReplaySession {
    documents: Arc<Vec<String>>,
    current: usize,
    closed: bool,
    fail_on_click: Option<usize>,
    clicks: usize,
    stats: ReplayStatsHandle,
}

impl ReplaySession {
    pub fn new<I, S>(landing: &str, pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut documents = vec![landing.to_string()];
        documents.extend(pages.into_iter().map(Into::into));
        Self::from_documents(Arc::new(documents), None, ReplayStatsHandle::default())
    }

    fn from_documents(
        documents: Arc<Vec<String>>,
        fail_on_click: Option<usize>,
        stats: ReplayStatsHandle,
    ) -> Self {
        Self {
            documents,
            current: 0,
            closed: false,
            fail_on_click,
            clicks: 0,
            stats,
        }
    }

    /// Make the `n`-th click (1-based) fail as if the browser crashed.
    pub fn fail_on_click(mut self, n: usize) -> Self {
        self.fail_on_click = Some(n);
        self
    }

    pub fn stats(&self) -> ReplayStatsHandle {
        self.stats.clone()
    }

    pub fn scrolls(&self) -> usize {
        self.stats.lock().scrolls
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(ScrapeError::SessionClosed)
        } else {
            Ok(())
        }
    }

    fn document(&self) -> &str {
        &self.documents[self.current]
    }
}

#[async_trait]
impl RenderSession for ReplaySession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.ensure_open()?;
        debug!("Replaying landing page for {}", url);
        self.current = 0;
        self.stats.lock().navigations.push(url.to_string());
        Ok(())
    }

    async fn wait_for_element(
        &mut self,
        strategy: &Strategy,
        _timeout: Duration,
    ) -> Result<Option<ElementHandle>> {
        self.ensure_open()?;
        self.stats.lock().lookups.push(strategy.clone());
        let document = Html::parse_document(self.document());
        if strategy.matches_document(&document)? {
            Ok(Some(ElementHandle::new(strategy.clone())))
        } else {
            Ok(None)
        }
    }

    async fn scroll_into_view(&mut self, _element: &ElementHandle) -> Result<()> {
        self.ensure_open()?;
        self.stats.lock().scrolls += 1;
        Ok(())
    }

    async fn click(&mut self, element: &ElementHandle) -> Result<()> {
        self.ensure_open()?;
        self.clicks += 1;
        self.stats.lock().clicks += 1;
        if self.fail_on_click == Some(self.clicks) {
            return Err(ScrapeError::SessionError(format!(
                "replay session crashed while clicking {}",
                element.strategy()
            )));
        }
        if self.current + 1 < self.documents.len() {
            self.current += 1;
        }
        Ok(())
    }

    async fn current_markup(&mut self) -> Result<String> {
        self.ensure_open()?;
        Ok(self.document().to_string())
    }

    async fn close(&mut self) -> Result<()> {
        self.stats.lock().closes += 1;
        self.closed = true;
        Ok(())
    }
}

/// Hands out fresh replay sessions over the same captured pages.
#[derive(Debug, Clone)]
pub struct ReplayFactory {
    documents: Arc<Vec<String>>,
    fail_on_click: Option<usize>,
    stats: ReplayStatsHandle,
}

impl ReplayFactory {
    pub fn new<I, S>(landing: &str, pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut documents = vec![landing.to_string()];
        documents.extend(pages.into_iter().map(Into::into));
        Self {
            documents: Arc::new(documents),
            fail_on_click: None,
            stats: ReplayStatsHandle::default(),
        }
    }

    /// Load `landing.html` and `page_<n>.html` files, ordered by `n`.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let landing = std::fs::read_to_string(dir.join("landing.html"))?;

        let mut pages = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let number = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix("page_"))
                .and_then(|n| n.strip_suffix(".html"))
                .and_then(|n| n.parse::<u32>().ok());
            if let Some(number) = number {
                pages.push((number, path));
            }
        }
        pages.sort_by_key(|(number, _)| *number);

        let mut markup = Vec::with_capacity(pages.len());
        for (_, path) in &pages {
            markup.push(std::fs::read_to_string(path)?);
        }
        info!("Loaded replay of {} pages from {}", markup.len(), dir.display());

        Ok(Self::new(&landing, markup))
    }

    pub fn fail_on_click(mut self, n: usize) -> Self {
        self.fail_on_click = Some(n);
        self
    }

    pub fn stats(&self) -> ReplayStatsHandle {
        self.stats.clone()
    }
}

#[async_trait]
impl SessionFactory for ReplayFactory {
    async fn open(&self) -> Result<Box<dyn RenderSession>> {
        Ok(Box::new(ReplaySession::from_documents(
            self.documents.clone(),
            self.fail_on_click,
            self.stats.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clicks_advance_through_pages() {
        let mut session = ReplaySession::new("<p>landing</p>", ["<p>one</p>", "<p>two</p>"]);
        let handle = ElementHandle::new(Strategy::Css("p".into()));

        session.navigate("https://example.test").await.unwrap();
        assert!(session.current_markup().await.unwrap().contains("landing"));
        session.click(&handle).await.unwrap();
        assert!(session.current_markup().await.unwrap().contains("one"));
        session.click(&handle).await.unwrap();
        session.click(&handle).await.unwrap();
        assert!(session.current_markup().await.unwrap().contains("two"));

        let stats = session.stats().snapshot();
        assert_eq!(stats.clicks, 3);
        assert_eq!(stats.navigations, vec!["https://example.test".to_string()]);
    }

    #[tokio::test]
    async fn injected_click_failure_is_a_session_error() {
        let mut session = ReplaySession::new("<p>x</p>", ["<p>y</p>"]).fail_on_click(1);
        let handle = ElementHandle::new(Strategy::Css("p".into()));
        let err = session.click(&handle).await.unwrap_err();
        assert!(err.is_session_failure());
    }

    #[tokio::test]
    async fn closed_sessions_refuse_work_but_count_every_close() {
        let mut session = ReplaySession::new("<p>x</p>", Vec::<String>::new());
        session.close().await.unwrap();
        session.close().await.unwrap();
        assert!(matches!(session.current_markup().await, Err(ScrapeError::SessionClosed)));
        assert_eq!(session.stats().snapshot().closes, 2);
    }

    #[test]
    fn loads_pages_from_a_directory_in_numeric_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("landing.html"), "<p>landing</p>").unwrap();
        std::fs::write(dir.path().join("page_10.html"), "<p>ten</p>").unwrap();
        std::fs::write(dir.path().join("page_2.html"), "<p>two</p>").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let factory = ReplayFactory::from_dir(dir.path()).unwrap();
        assert_eq!(factory.documents.len(), 3);
        assert!(factory.documents[1].contains("two"));
        assert!(factory.documents[2].contains("ten"));
    }
}
