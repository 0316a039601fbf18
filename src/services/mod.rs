pub mod batch_service;
pub mod extraction_service;
