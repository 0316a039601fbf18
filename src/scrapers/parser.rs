use crate::errors::Result;
use crate::models::record::Record;
use crate::scrapers::locator::parse_selector;
use log::debug;
use scraper::{Html, Selector};

/// Extracts fixed-width rows from the price history table.
#[derive(Debug, Clone)]
pub struct PageParser {
    table: Selector,
    rows: Selector,
    cells: Selector,
    width: usize,
}

impl PageParser {
    pub fn new(table_selector: &str, width: usize) -> Result<Self> {
        Ok(Self {
            table: parse_selector(table_selector)?,
            rows: parse_selector("tr")?,
            cells: parse_selector("td")?,
            width,
        })
    }

    /// Rows of the first matching table, header skipped. No table means no
    /// rows; rows of the wrong width are dropped one by one.
    pub fn parse(&self, markup: &str) -> Vec<Record> {
        let document = Html::parse_document(markup);
        let Some(table) = document.select(&self.table).next() else {
            debug!("No price table in markup");
            return Vec::new();
        };

        let mut records = Vec::new();
        let mut dropped = 0usize;
        for row in table.select(&self.rows).skip(1) {
            let cells = row
                .select(&self.cells)
                .map(|cell| cell.text().collect::<String>());
            match Record::from_cells(cells, self.width) {
                Some(record) => records.push(record),
                None => dropped += 1,
            }
        }

        if dropped > 0 {
            debug!("Dropped {} malformed rows", dropped);
        }
        records
    }
}
