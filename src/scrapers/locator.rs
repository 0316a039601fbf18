use crate::errors::{Result, ScrapeError};
use crate::session::{ElementHandle, RenderSession};
use log::{debug, info};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One way of identifying an element on a rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Element with this exact `id` attribute.
    ElementId(String),
    /// First element matching a CSS selector.
    Css(String),
    /// Anchor whose text contains this string.
    LinkText(String),
    /// Anchor whose trimmed text is exactly this string.
    LinkLabel(String),
    /// Anchor whose `title` attribute equals this string.
    LinkTitle(String),
}

impl Strategy {
    /// Replace `{key}` in the strategy's pattern.
    pub fn fill(&self, key: &str, value: &str) -> Self {
        let placeholder = format!("{{{}}}", key);
        let sub = |s: &String| s.replace(&placeholder, value);
        match self {
            Strategy::ElementId(s) => Strategy::ElementId(sub(s)),
            Strategy::Css(s) => Strategy::Css(sub(s)),
            Strategy::LinkText(s) => Strategy::LinkText(sub(s)),
            Strategy::LinkLabel(s) => Strategy::LinkLabel(sub(s)),
            Strategy::LinkTitle(s) => Strategy::LinkTitle(sub(s)),
        }
    }

    pub fn pattern(&self) -> &str {
        match self {
            Strategy::ElementId(s)
            | Strategy::Css(s)
            | Strategy::LinkText(s)
            | Strategy::LinkLabel(s)
            | Strategy::LinkTitle(s) => s,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.pattern().trim().is_empty() {
            return Err(ScrapeError::SelectorError(format!("empty pattern in {}", self)));
        }
        if let Strategy::Css(css) = self {
            parse_selector(css)?;
        }
        Ok(())
    }

    /// Whether a parsed document contains a matching element.
    pub fn matches_document(&self, document: &Html) -> Result<bool> {
        let found = match self {
            Strategy::ElementId(id) => document
                .root_element()
                .descendants()
                .filter_map(ElementRef::wrap)
                .any(|el| el.value().id() == Some(id.as_str())),
            Strategy::Css(css) => {
                let selector = parse_selector(css)?;
                document.select(&selector).next().is_some()
            }
            Strategy::LinkText(text) => {
                let anchors = parse_selector("a")?;
                document
                    .select(&anchors)
                    .any(|a| a.text().collect::<String>().contains(text.as_str()))
            }
            Strategy::LinkLabel(label) => {
                let anchors = parse_selector("a")?;
                document
                    .select(&anchors)
                    .any(|a| a.text().collect::<String>().trim() == label.as_str())
            }
            Strategy::LinkTitle(title) => {
                let anchors = parse_selector("a")?;
                document
                    .select(&anchors)
                    .any(|a| a.value().attr("title") == Some(title.as_str()))
            }
        };
        Ok(found)
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::ElementId(s) => write!(f, "id={}", s),
            Strategy::Css(s) => write!(f, "css={}", s),
            Strategy::LinkText(s) => write!(f, "link text~'{}'", s),
            Strategy::LinkLabel(s) => write!(f, "link label='{}'", s),
            Strategy::LinkTitle(s) => write!(f, "link title='{}'", s),
        }
    }
}

pub(crate) fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| ScrapeError::SelectorError(format!("invalid CSS selector '{}': {}", css, e)))
}

/// Ordered candidate strategies for one logical element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorSpec {
    pub name: String,
    pub candidates: Vec<Strategy>,
}

impl LocatorSpec {
    pub fn new(name: &str, candidates: Vec<Strategy>) -> Self {
        Self {
            name: name.to_string(),
            candidates,
        }
    }

    /// Substitute `{key}` in every candidate.
    pub fn fill(&self, key: &str, value: &str) -> Self {
        Self {
            name: self.name.replace(&format!("{{{}}}", key), value),
            candidates: self.candidates.iter().map(|c| c.fill(key, value)).collect(),
        }
    }
}

/// Tries locator candidates in order with a bounded wait for each.
#[derive(Debug, Clone, Copy)]
pub struct ElementLocator {
    timeout_per_candidate: Duration,
    settle: Duration,
}

impl ElementLocator {
    pub fn new(timeout_per_candidate: Duration, settle: Duration) -> Self {
        Self {
            timeout_per_candidate,
            settle,
        }
    }

    /// First matching candidate, scrolled into view, or `None` once every
    /// candidate has timed out. Only session failures are returned as `Err`.
    pub async fn locate(
        &self,
        session: &mut dyn RenderSession,
        spec: &LocatorSpec,
    ) -> Result<Option<ElementHandle>> {
        for (i, candidate) in spec.candidates.iter().enumerate() {
            debug!("Looking for {} via {} ({}/{})", spec.name, candidate, i + 1, spec.candidates.len());

            if let Some(element) = session
                .wait_for_element(candidate, self.timeout_per_candidate)
                .await?
            {
                info!("Located {} via {}", spec.name, candidate);
                session.scroll_into_view(&element).await?;
                if !self.settle.is_zero() {
                    tokio::time::sleep(self.settle).await;
                }
                return Ok(Some(element));
            }
        }

        info!("{} not found by any of {} strategies", spec.name, spec.candidates.len());
        Ok(None)
    }
}
