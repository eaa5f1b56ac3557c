//! Recipe Ingest - multi-source recipe ingestion and normalization service.
//!
//! Turns unstructured recipe content (raw text, scanned documents via an
//! external OCR service, or web pages) into structured recipe records and
//! forwards them to a downstream recipe store.

pub mod config;
pub mod extractor;
pub mod inference;
pub mod normalize;
pub mod ocr;
pub mod router;
pub mod schema;
pub mod store;
pub mod validator;
pub mod web;
