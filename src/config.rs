use crate::errors::{Result, ScrapeError};
use crate::models::record::RECORD_WIDTH;
use crate::scrapers::locator::{parse_selector, LocatorSpec, Strategy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub url_template: String,  // {symbol} is replaced by the requested symbol
    pub history_control: LocatorSpec,
    pub page_control: LocatorSpec,  // {page} is replaced by the page number
    pub table_selector: String,
    pub record_width: usize,
    #[serde(with = "millis", rename = "locate_timeout_ms")]
    pub locate_timeout: Duration,
    #[serde(with = "millis", rename = "table_timeout_ms")]
    pub table_timeout: Duration,
    #[serde(with = "millis", rename = "scroll_settle_ms")]
    pub scroll_settle: Duration,
    #[serde(with = "millis", rename = "click_settle_ms")]
    pub click_settle: Duration,
}

impl Config {
    pub fn new() -> Self {
        Self {
            url_template: "https://merolagani.com/CompanyDetail.aspx?symbol={symbol}".to_string(),
            history_control: LocatorSpec::new(
                "history control",
                vec![
                    Strategy::ElementId(
                        "ctl00_ContentPlaceHolder1_CompanyDetail1_lnkHistoryTab".to_string(),
                    ),
                    Strategy::LinkText("Price History".to_string()),
                ],
            ),
            page_control: LocatorSpec::new(
                "page {page} control",
                vec![
                    Strategy::LinkTitle("Page {page}".to_string()),
                    Strategy::LinkLabel("{page}".to_string()),
                ],
            ),
            table_selector: "table.table-bordered".to_string(),
            record_width: RECORD_WIDTH,
            locate_timeout: Duration::from_secs(10),
            table_timeout: Duration::from_secs(10),
            scroll_settle: Duration::from_secs(1),
            click_settle: Duration::from_secs(2),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.url_template.contains("{symbol}") {
            return Err(ScrapeError::ConfigError(format!(
                "url_template '{}' has no {{symbol}} placeholder",
                self.url_template
            )));
        }
        if self.history_control.candidates.is_empty() {
            return Err(ScrapeError::ConfigError(
                "history_control needs at least one strategy".to_string(),
            ));
        }
        if self.page_control.candidates.is_empty()
            || !self
                .page_control
                .candidates
                .iter()
                .all(|c| c.pattern().contains("{page}"))
        {
            return Err(ScrapeError::ConfigError(
                "every page_control strategy needs a {page} placeholder".to_string(),
            ));
        }
        // Substring matching would take "12" for page 2
        if let Some(loose) = self
            .page_control
            .candidates
            .iter()
            .find(|c| matches!(c, Strategy::LinkText(_)))
        {
            return Err(ScrapeError::ConfigError(format!(
                "page_control cannot use {}, use link_label for an exact match",
                loose
            )));
        }
        if self.record_width == 0 {
            return Err(ScrapeError::ConfigError("record_width must be positive".to_string()));
        }
        for strategy in self
            .history_control
            .candidates
            .iter()
            .chain(&self.page_control.candidates)
        {
            strategy.validate()?;
        }
        parse_selector(&self.table_selector)?;
        Ok(())
    }

    pub fn url_for(&self, symbol: &str) -> String {
        self.url_template.replace("{symbol}", symbol)
    }

    pub fn page_control_for(&self, page: u32) -> LocatorSpec {
        self.page_control.fill("page", &page.to_string())
    }

    pub fn with_url_template(mut self, template: &str) -> Self {
        self.url_template = template.to_string();
        self
    }

    pub fn with_history_control(mut self, spec: LocatorSpec) -> Self {
        self.history_control = spec;
        self
    }

    pub fn with_page_control(mut self, spec: LocatorSpec) -> Self {
        self.page_control = spec;
        self
    }

    pub fn with_table_selector(mut self, selector: &str) -> Self {
        self.table_selector = selector.to_string();
        self
    }

    pub fn with_record_width(mut self, width: usize) -> Self {
        self.record_width = width;
        self
    }

    pub fn with_locate_timeout(mut self, timeout: Duration) -> Self {
        self.locate_timeout = timeout;
        self
    }

    pub fn with_table_timeout(mut self, timeout: Duration) -> Self {
        self.table_timeout = timeout;
        self
    }

    pub fn with_scroll_settle(mut self, settle: Duration) -> Self {
        self.scroll_settle = settle;
        self
    }

    pub fn with_click_settle(mut self, settle: Duration) -> Self {
        self.click_settle = settle;
        self
    }

    // Replayed pages never need to settle
    pub fn without_waits(self) -> Self {
        self.with_locate_timeout(Duration::ZERO)
            .with_table_timeout(Duration::ZERO)
            .with_scroll_settle(Duration::ZERO)
            .with_click_settle(Duration::ZERO)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
