use crate::errors::{Result, ScrapeError};

/// What one extraction run is asked to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    symbol: String,
    target_rows: usize,
}

impl ExtractionRequest {
    pub fn new(symbol: &str, target_rows: usize) -> Result<Self> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(ScrapeError::RequestError("symbol must not be empty".to_string()));
        }
        if target_rows == 0 {
            return Err(ScrapeError::RequestError(format!(
                "target row count for {} must be at least 1",
                symbol
            )));
        }
        Ok(Self {
            symbol: symbol.to_string(),
            target_rows,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn target_rows(&self) -> usize {
        self.target_rows
    }
}
