//! emmo-ingest library
//!
//! Ingestion core for OCR-extracted supplier invoices: resolves every line to
//! a canonical product reference code, keeps one product-master row per code,
//! records an append-only price ledger, and flags or corrects implausible
//! unit prices.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod migrator;
pub mod models;
pub mod repositories;
pub mod services;

pub use config::{AppConfig, CorrectionMode, IngestConfig};
pub use errors::ServiceError;
pub use services::IngestionService;
