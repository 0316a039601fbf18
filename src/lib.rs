// Public modules
pub mod config;
pub mod control;
pub mod errors;
pub mod models;
pub mod scrapers;
pub mod services;
pub mod session;

// Persistence is for callers, the engine itself never writes files
pub mod util;

// Re-export commonly used types
pub use config::Config;
pub use control::{CancelFlag, LogProgress, NullProgress, ProgressSink};
pub use errors::{Result, ScrapeError};
pub use models::outcome::{ExhaustReason, FailureReason, Outcome};
pub use models::record::{Record, COLUMN_HEADERS, RECORD_WIDTH};
pub use models::request::ExtractionRequest;
pub use services::batch_service::BatchService;
pub use services::extraction_service::ExtractionEngine;
