pub mod locator;
pub mod pagination;
pub mod parser;
