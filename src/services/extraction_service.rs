use crate::config::Config;
use crate::control::{CancelFlag, NullProgress, ProgressSink};
use crate::errors::{Result, ScrapeError};
use crate::models::outcome::{FailureReason, Outcome};
use crate::models::request::ExtractionRequest;
use crate::scrapers::locator::ElementLocator;
use crate::scrapers::pagination::PaginationController;
use crate::scrapers::parser::PageParser;
use crate::session::{RenderSession, SessionFactory};
use log::{info, warn};
use std::sync::Arc;

/// Entry point of an extraction: opens a session, activates the history
/// view and hands over to pagination. Holds no per-run state, so one
/// engine can serve many concurrent runs.
pub struct ExtractionEngine {
    config: Config,
    parser: PageParser,
    factory: Arc<dyn SessionFactory>,
}

impl ExtractionEngine {
    pub fn new(config: Config, factory: Arc<dyn SessionFactory>) -> Result<Self> {
        config.validate()?;
        let parser = PageParser::new(&config.table_selector, config.record_width)?;
        Ok(Self {
            config,
            parser,
            factory,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn run(&self, request: &ExtractionRequest) -> Outcome {
        self.run_with(request, Arc::new(NullProgress), CancelFlag::new())
            .await
    }

    /// Run one extraction. Always yields an outcome, and the session is
    /// closed on every path that returns.
    pub async fn run_with(
        &self,
        request: &ExtractionRequest,
        progress: Arc<dyn ProgressSink>,
        cancel: CancelFlag,
    ) -> Outcome {
        info!(
            "Extracting {} rows of price history for {}",
            request.target_rows(),
            request.symbol()
        );

        let mut session = match self.factory.open().await {
            Ok(session) => session,
            Err(e) => {
                warn!("Could not open a render session for {}: {}", request.symbol(), e);
                return Outcome::Failure {
                    records: Vec::new(),
                    reason: FailureReason::Setup(e.to_string()),
                };
            }
        };

        let outcome = self
            .drive(session.as_mut(), request, progress, cancel)
            .await;

        if let Err(e) = session.close().await {
            warn!("Failed to close render session for {}: {}", request.symbol(), e);
        }

        match &outcome {
            Outcome::Success(records) => {
                info!("{}: collected all {} rows", request.symbol(), records.len())
            }
            Outcome::PartialSuccess { records, reason } => info!(
                "{}: collected {} of {} rows ({})",
                request.symbol(),
                records.len(),
                request.target_rows(),
                reason
            ),
            Outcome::Failure { records, reason } => warn!(
                "{}: failed after {} rows: {}",
                request.symbol(),
                records.len(),
                reason
            ),
        }
        outcome
    }

    async fn drive(
        &self,
        session: &mut dyn RenderSession,
        request: &ExtractionRequest,
        progress: Arc<dyn ProgressSink>,
        cancel: CancelFlag,
    ) -> Outcome {
        match self.open_history(session, request).await {
            Ok(true) => {}
            Ok(false) => {
                return Outcome::Failure {
                    records: Vec::new(),
                    reason: FailureReason::HistoryControlNotFound,
                }
            }
            Err(ScrapeError::ElementGone(what)) => {
                warn!("History control {} vanished before the click", what);
                return Outcome::Failure {
                    records: Vec::new(),
                    reason: FailureReason::HistoryControlNotFound,
                };
            }
            Err(e) => {
                warn!("Session failed while opening history for {}: {}", request.symbol(), e);
                return Outcome::Failure {
                    records: Vec::new(),
                    reason: FailureReason::Setup(e.to_string()),
                };
            }
        }

        PaginationController::new(&self.config, &self.parser, request.target_rows())
            .with_cancel(cancel)
            .with_progress(progress)
            .run(session)
            .await
    }

    /// Load the company page and click the history control. `Ok(false)`
    /// when no configured strategy finds the control.
    async fn open_history(
        &self,
        session: &mut dyn RenderSession,
        request: &ExtractionRequest,
    ) -> Result<bool> {
        let url = self.config.url_for(request.symbol());
        info!("Loading {}", url);
        session.navigate(&url).await?;

        let locator = ElementLocator::new(self.config.locate_timeout, self.config.scroll_settle);
        let Some(control) = locator.locate(session, &self.config.history_control).await? else {
            return Ok(false);
        };
        session.click(&control).await?;
        // The history view swaps in without any signal to wait on.
        if !self.config.click_settle.is_zero() {
            tokio::time::sleep(self.config.click_settle).await;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::replay::ReplayFactory;
    use async_trait::async_trait;
    use std::time::Duration;

    struct BrokenFactory;

    #[async_trait]
    impl SessionFactory for BrokenFactory {
        async fn open(&self) -> Result<Box<dyn RenderSession>> {
            Err(ScrapeError::SessionError("chrome not installed".into()))
        }
    }

    #[tokio::test]
    async fn unopenable_sessions_fail_without_rows() {
        let engine = ExtractionEngine::new(Config::new(), Arc::new(BrokenFactory)).unwrap();
        let request = ExtractionRequest::new("NTC", 5).unwrap();

        let outcome = engine.run(&request).await;
        assert!(outcome.is_failure());
        assert!(outcome.records().is_empty());
        assert_eq!(
            outcome.reason().as_deref(),
            Some("session failure before pagination: Render session failure: chrome not installed")
        );
    }

    #[test]
    fn rejects_invalid_configuration() {
        let config = Config::new().with_table_selector("table[");
        assert!(ExtractionEngine::new(config, Arc::new(BrokenFactory)).is_err());
    }

    const LANDING: &str = "<a id=\"lnkHistoryTab\" href=\"\">Price History</a>";

    fn history_page(first: usize, next_page: Option<u32>) -> String {
        let mut html = String::from("<table class=\"table table-bordered\"><tr><th>#</th></tr>");
        for n in first..first + 3 {
            html.push_str(&format!("<tr><td>{}</td>{}</tr>", n, "<td>x</td>".repeat(8)));
        }
        html.push_str("</table>");
        if let Some(page) = next_page {
            html.push_str(&format!("<a title=\"Page {}\" href=\"\">{}</a>", page, page));
        }
        html
    }

    fn settling_engine(factory: &ReplayFactory) -> ExtractionEngine {
        let config = Config::new()
            .without_waits()
            .with_scroll_settle(Duration::from_secs(1))
            .with_click_settle(Duration::from_secs(2));
        ExtractionEngine::new(config, Arc::new(factory.clone())).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn waits_after_locating_and_clicking_the_history_control() {
        let factory = ReplayFactory::new(LANDING, [history_page(1, None)]);
        let request = ExtractionRequest::new("NTC", 3).unwrap();

        let started = tokio::time::Instant::now();
        let outcome = settling_engine(&factory).run(&request).await;

        assert_eq!(outcome.status(), "success");
        // One scroll settle after the locate, one click settle after the click.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4), "{:?}", elapsed);
        let stats = factory.stats().snapshot();
        assert_eq!((stats.scrolls, stats.clicks), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn waits_after_every_page_control_click() {
        let factory = ReplayFactory::new(LANDING, [history_page(1, Some(2)), history_page(4, None)]);
        let request = ExtractionRequest::new("NTC", 6).unwrap();

        let started = tokio::time::Instant::now();
        let outcome = settling_engine(&factory).run(&request).await;

        assert_eq!(outcome.records().len(), 6);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(6) && elapsed < Duration::from_secs(7), "{:?}", elapsed);
        let stats = factory.stats().snapshot();
        assert_eq!((stats.scrolls, stats.clicks), (2, 2));
    }

    #[tokio::test]
    async fn history_control_vanishing_before_the_click_is_not_found() {
        struct VanishingFactory(ReplayFactory);

        struct Vanishing(Box<dyn RenderSession>);

        #[async_trait]
        impl RenderSession for Vanishing {
            async fn navigate(&mut self, url: &str) -> Result<()> {
                self.0.navigate(url).await
            }

            async fn wait_for_element(
                &mut self,
                strategy: &crate::scrapers::locator::Strategy,
                timeout: Duration,
            ) -> Result<Option<crate::session::ElementHandle>> {
                self.0.wait_for_element(strategy, timeout).await
            }

            async fn scroll_into_view(&mut self, element: &crate::session::ElementHandle) -> Result<()> {
                self.0.scroll_into_view(element).await
            }

            async fn click(&mut self, element: &crate::session::ElementHandle) -> Result<()> {
                Err(ScrapeError::ElementGone(element.strategy().to_string()))
            }

            async fn current_markup(&mut self) -> Result<String> {
                self.0.current_markup().await
            }

            async fn close(&mut self) -> Result<()> {
                self.0.close().await
            }
        }

        #[async_trait]
        impl SessionFactory for VanishingFactory {
            async fn open(&self) -> Result<Box<dyn RenderSession>> {
                Ok(Box::new(Vanishing(self.0.open().await?)))
            }
        }

        let replay = ReplayFactory::new(LANDING, [history_page(1, None)]);
        let engine = ExtractionEngine::new(
            Config::new().without_waits(),
            Arc::new(VanishingFactory(replay.clone())),
        )
        .unwrap();

        let outcome = engine.run(&ExtractionRequest::new("NTC", 3).unwrap()).await;

        assert_eq!(outcome.reason().as_deref(), Some("history control not found"));
        assert_eq!(replay.stats().snapshot().closes, 1);
    }
}
