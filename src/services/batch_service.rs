use crate::control::{CancelFlag, LogProgress};
use crate::models::outcome::{FailureReason, Outcome};
use crate::models::request::ExtractionRequest;
use crate::services::extraction_service::ExtractionEngine;
use log::{error, info};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Runs extractions for several symbols at once, each on its own session.
pub struct BatchService {
    engine: Arc<ExtractionEngine>,
    concurrency: usize,
}

impl BatchService {
    pub fn new(engine: Arc<ExtractionEngine>, concurrency: usize) -> Self {
        Self {
            engine,
            concurrency: concurrency.max(1),
        }
    }

    /// Outcomes come back in request order.
    pub async fn run_all(
        &self,
        requests: Vec<ExtractionRequest>,
        cancel: CancelFlag,
    ) -> Vec<(ExtractionRequest, Outcome)> {
        info!(
            "Running {} extractions, at most {} at a time",
            requests.len(),
            self.concurrency
        );
        let permits = Arc::new(Semaphore::new(self.concurrency));

        let handles: Vec<_> = requests
            .iter()
            .cloned()
            .map(|request| {
                let engine = self.engine.clone();
                let permits = permits.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    // The semaphore is never closed, so acquiring only waits.
                    let _permit = permits.acquire_owned().await.ok();
                    let progress = Arc::new(LogProgress::new(request.symbol()));
                    engine.run_with(&request, progress, cancel).await
                })
            })
            .collect();

        let mut results = Vec::with_capacity(requests.len());
        for (request, handle) in requests.into_iter().zip(handles) {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Extraction task for {} died: {}", request.symbol(), e);
                    Outcome::Failure {
                        records: Vec::new(),
                        reason: FailureReason::Setup(format!("extraction task died: {}", e)),
                    }
                }
            };
            results.push((request, outcome));
        }
        results
    }
}
