use serde::Serialize;

/// Number of cells in one price history row.
pub const RECORD_WIDTH: usize = 9;

/// Column names of the price history table, in source order.
pub const COLUMN_HEADERS: [&str; RECORD_WIDTH] = [
    "#", "Date", "LTP", "% Change", "High", "Low", "Open", "Qty.", "Turnover",
];

/// One accepted table row. Fields are trimmed cell text, never parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Record {
    fields: Vec<String>,
}

impl Record {
    /// Build a record from raw cell texts, or `None` if the row does not
    /// have exactly `width` cells.
    pub fn from_cells<I, S>(cells: I, width: usize) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fields: Vec<String> = cells
            .into_iter()
            .map(|c| c.as_ref().trim().to_string())
            .collect();
        if fields.len() == width {
            Some(Self { fields })
        } else {
            None
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_fields(self) -> Vec<String> {
        self.fields
    }
}
