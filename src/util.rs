use crate::errors::{Result, ScrapeError};
use crate::models::record::{Record, COLUMN_HEADERS};
use log::info;
use std::path::Path;

pub fn default_csv_name(symbol: &str) -> String {
    format!("{}_price_history.csv", symbol)
}

pub fn column_names(width: usize) -> Vec<String> {
    if width == COLUMN_HEADERS.len() {
        COLUMN_HEADERS.iter().map(|h| h.to_string()).collect()
    } else {
        (1..=width).map(|i| format!("col_{}", i)).collect()
    }
}

// CSV persistence
pub mod csv_utils {
    use super::*;

    pub fn write_records(path: &Path, records: &[Record], headers: &[String]) -> Result<()> {
        info!("Writing {} rows to {}", records.len(), path.display());
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(headers)?;
        for record in records {
            writer.write_record(record.fields())?;
        }
        writer.flush()?;
        Ok(())
    }

    // Rows whose width differs from the header are skipped
    pub fn read_records(path: &Path) -> Result<(Vec<String>, Vec<Record>)> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row?;
            if let Some(record) = Record::from_cells(row.iter(), headers.len()) {
                records.push(record);
            }
        }
        Ok((headers, records))
    }
}

// Arrow IPC persistence
pub mod arrow_utils {
    use super::*;
    use arrow::array::{ArrayRef, StringBuilder};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::ipc::reader::FileReader;
    use arrow::ipc::writer::FileWriter;
    use arrow::record_batch::RecordBatch;
    use arrow_array::{Array, StringArray};
    use std::fs::File;
    use std::sync::Arc;

    fn arrow_err(e: impl std::fmt::Display) -> ScrapeError {
        ScrapeError::ArrowError(e.to_string())
    }

    // One symbol column, then one Utf8 column per field
    pub fn records_to_record_batch(symbol: &str, records: &[Record], width: usize) -> Result<RecordBatch> {
        let names = column_names(width);

        let mut symbol_builder = StringBuilder::new();
        let mut builders: Vec<StringBuilder> = names.iter().map(|_| StringBuilder::new()).collect();

        for record in records {
            if record.len() != width {
                return Err(ScrapeError::ArrowError(format!(
                    "record has {} fields, expected {}",
                    record.len(),
                    width
                )));
            }
            symbol_builder.append_value(symbol);
            for (builder, value) in builders.iter_mut().zip(record.fields()) {
                builder.append_value(value);
            }
        }

        let mut fields = vec![Field::new("symbol", DataType::Utf8, false)];
        fields.extend(names.iter().map(|n| Field::new(n, DataType::Utf8, false)));

        let mut columns: Vec<ArrayRef> = vec![Arc::new(symbol_builder.finish())];
        columns.extend(
            builders
                .iter_mut()
                .map(|b| Arc::new(b.finish()) as ArrayRef),
        );

        RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).map_err(arrow_err)
    }

    pub fn save_records_to_arrow(symbol: &str, records: &[Record], width: usize, path: &Path) -> Result<()> {
        info!("Saving {} rows for {} to {}", records.len(), symbol, path.display());

        let batch = records_to_record_batch(symbol, records, width)?;
        let file = File::create(path)?;
        let mut writer = FileWriter::try_new(file, &batch.schema()).map_err(arrow_err)?;
        writer.write(&batch).map_err(arrow_err)?;
        writer.finish().map_err(arrow_err)?;
        Ok(())
    }

    pub fn read_records_from_arrow(path: &Path) -> Result<(Vec<String>, Vec<(String, Record)>)> {
        let file = File::open(path)?;
        let reader = FileReader::try_new(file, None).map_err(arrow_err)?;
        let schema = reader.schema();
        if schema.fields().is_empty() || schema.field(0).name() != "symbol" {
            return Err(ScrapeError::ArrowError(format!(
                "{} is not a price history file",
                path.display()
            )));
        }
        let headers: Vec<String> = schema.fields().iter().skip(1).map(|f| f.name().clone()).collect();

        let mut rows = Vec::new();
        for batch in reader {
            let batch = batch.map_err(arrow_err)?;
            let columns = (0..batch.num_columns())
                .map(|i| {
                    batch
                        .column(i)
                        .as_any()
                        .downcast_ref::<StringArray>()
                        .ok_or_else(|| ScrapeError::ArrowError(format!("column {} is not Utf8", i)))
                })
                .collect::<Result<Vec<_>>>()?;

            for row in 0..batch.num_rows() {
                let symbol = columns[0].value(row).to_string();
                let cells = columns[1..].iter().map(|c| {
                    if c.is_null(row) {
                        ""
                    } else {
                        c.value(row)
                    }
                });
                if let Some(record) = Record::from_cells(cells, headers.len()) {
                    rows.push((symbol, record));
                }
            }
        }
        Ok((headers, rows))
    }
}
