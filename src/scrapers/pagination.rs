use crate::config::Config;
use crate::control::{CancelFlag, NullProgress, ProgressSink};
use crate::errors::Result;
use crate::models::outcome::{ExhaustReason, FailureReason, Outcome};
use crate::models::record::Record;
use crate::scrapers::locator::{ElementLocator, Strategy};
use crate::scrapers::parser::PageParser;
use crate::session::RenderSession;
use log::{debug, info, warn};
use std::sync::Arc;

/// Pagination progress for one run.
///
/// `Init -> FetchingPage(1) -> Accumulating -> Continuing(2) -> FetchingPage(2) -> ...`
/// until one of the terminal states is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageState {
    Init,
    FetchingPage(u32),
    Accumulating { page: u32, rows: Vec<Record> },
    Continuing(u32),
    QuotaReached,
    Exhausted(ExhaustReason),
    Aborted(FailureReason),
}

impl PageState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PageState::QuotaReached | PageState::Exhausted(_) | PageState::Aborted(_)
        )
    }
}

enum Fetched {
    Rows(Vec<Record>),
    Empty,
    NoControl,
}

/// Walks the history pages of one already-opened history view, collecting
/// rows until the quota is met or the source runs out.
pub struct PaginationController<'a> {
    config: &'a Config,
    parser: &'a PageParser,
    locator: ElementLocator,
    quota: usize,
    state: PageState,
    records: Vec<Record>,
    cancel: CancelFlag,
    progress: Arc<dyn ProgressSink>,
}

impl<'a> PaginationController<'a> {
    pub fn new(config: &'a Config, parser: &'a PageParser, quota: usize) -> Self {
        Self {
            config,
            parser,
            locator: ElementLocator::new(config.locate_timeout, config.scroll_settle),
            quota,
            state: PageState::Init,
            records: Vec::new(),
            cancel: CancelFlag::new(),
            progress: Arc::new(NullProgress),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn state(&self) -> &PageState {
        &self.state
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Perform one transition and return the new state. Terminal states
    /// are left unchanged.
    pub async fn step(&mut self, session: &mut dyn RenderSession) -> &PageState {
        let current = std::mem::replace(&mut self.state, PageState::Init);
        let next = match current {
            PageState::Init => PageState::FetchingPage(1),
            PageState::FetchingPage(page) => self.fetching(session, page).await,
            PageState::Accumulating { page, rows } => self.accumulate(page, rows),
            PageState::Continuing(page) => PageState::FetchingPage(page),
            terminal => terminal,
        };
        debug!("Pagination state: {:?}", DebugState(&next));
        self.state = next;
        &self.state
    }

    /// Step until a terminal state and turn it into an outcome.
    pub async fn run(mut self, session: &mut dyn RenderSession) -> Outcome {
        while !self.state.is_terminal() {
            self.step(session).await;
        }
        self.into_outcome()
    }

    /// The outcome for the current state. A run stopped before reaching a
    /// terminal state reads as exhausted at the page it was on.
    pub fn into_outcome(self) -> Outcome {
        let records = self.records;
        match self.state {
            PageState::QuotaReached => Outcome::Success(records),
            PageState::Exhausted(reason) => Outcome::PartialSuccess { records, reason },
            PageState::Aborted(reason) => Outcome::Failure { records, reason },
            PageState::Init => Outcome::PartialSuccess {
                records,
                reason: ExhaustReason::EmptyPage(1),
            },
            PageState::FetchingPage(page)
            | PageState::Continuing(page)
            | PageState::Accumulating { page, .. } => Outcome::PartialSuccess {
                records,
                reason: ExhaustReason::EmptyPage(page),
            },
        }
    }

    async fn fetching(&mut self, session: &mut dyn RenderSession, page: u32) -> PageState {
        if self.cancel.is_cancelled() {
            warn!("Cancelled before page {} with {} rows", page, self.records.len());
            return PageState::Aborted(FailureReason::Cancelled(page));
        }

        debug!("Fetching page {}", page);
        self.progress.page_started(page);

        match self.fetch_page(session, page).await {
            Ok(Fetched::Rows(rows)) => PageState::Accumulating { page, rows },
            Ok(Fetched::Empty) => PageState::Exhausted(ExhaustReason::EmptyPage(page)),
            Ok(Fetched::NoControl) => PageState::Exhausted(ExhaustReason::NoPageControl(page)),
            Err(e) if e.is_session_failure() => {
                warn!("Aborting on page {}: {}", page, e);
                PageState::Aborted(FailureReason::Session {
                    page,
                    message: e.to_string(),
                })
            }
            Err(e) => {
                warn!("Could not reach page {}: {}", page, e);
                PageState::Exhausted(ExhaustReason::NoPageControl(page))
            }
        }
    }

    async fn fetch_page(&self, session: &mut dyn RenderSession, page: u32) -> Result<Fetched> {
        // Page 1 is already showing once the history view is open.
        if page > 1 {
            let spec = self.config.page_control_for(page);
            let Some(control) = self.locator.locate(session, &spec).await? else {
                return Ok(Fetched::NoControl);
            };
            session.click(&control).await?;
            if !self.config.click_settle.is_zero() {
                tokio::time::sleep(self.config.click_settle).await;
            }
        }

        let table = Strategy::Css(self.config.table_selector.clone());
        if session
            .wait_for_element(&table, self.config.table_timeout)
            .await?
            .is_none()
        {
            debug!("Table not rendered on page {} within {:?}", page, self.config.table_timeout);
        }

        let markup = session.current_markup().await?;
        let rows = self.parser.parse(&markup);
        info!("Page {} yielded {} rows", page, rows.len());

        if rows.is_empty() {
            Ok(Fetched::Empty)
        } else {
            Ok(Fetched::Rows(rows))
        }
    }

    fn accumulate(&mut self, page: u32, rows: Vec<Record>) -> PageState {
        let room = self.quota.saturating_sub(self.records.len());
        let taken = rows.len().min(room);
        if taken < rows.len() {
            debug!("Page {}: keeping {} of {} rows", page, taken, rows.len());
        }
        self.records.extend(rows.into_iter().take(taken));
        self.progress.page_done(self.records.len(), self.quota);

        if self.records.len() >= self.quota {
            info!("Quota of {} rows reached on page {}", self.quota, page);
            PageState::QuotaReached
        } else if taken > 0 {
            PageState::Continuing(page + 1)
        } else {
            PageState::Exhausted(ExhaustReason::EmptyPage(page))
        }
    }
}

/// Logs states without dumping every row.
struct DebugState<'s>(&'s PageState);

impl std::fmt::Debug for DebugState<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            PageState::Accumulating { page, rows } => {
                write!(f, "Accumulating {{ page: {}, rows: {} }}", page, rows.len())
            }
            other => write!(f, "{:?}", other),
        }
    }
}
