pub mod chrome;
pub mod replay;

use crate::errors::Result;
use crate::scrapers::locator::Strategy;
use async_trait::async_trait;
use std::time::Duration;

/// A located element. Backends re-resolve it from the strategy that
/// matched, so the handle stays valid only while the page is unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    strategy: Strategy,
}

impl ElementHandle {
    pub fn new(strategy: Strategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }
}

/// The capabilities the extraction core needs from a browser.
///
/// `wait_for_element` returns `Ok(None)` when nothing matched within the
/// timeout. `Err` is reserved for the session itself failing.
#[async_trait]
pub trait RenderSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<()>;

    async fn wait_for_element(
        &mut self,
        strategy: &Strategy,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>>;

    async fn scroll_into_view(&mut self, element: &ElementHandle) -> Result<()>;

    async fn click(&mut self, element: &ElementHandle) -> Result<()>;

    async fn current_markup(&mut self) -> Result<String>;

    /// Release the session. Safe to call more than once.
    async fn close(&mut self) -> Result<()>;
}

/// Opens one independent session per extraction run.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn RenderSession>>;
}
