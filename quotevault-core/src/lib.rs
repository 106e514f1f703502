//! QuoteVault Core: domain types and the data layer of the fetch-and-cache engine.
//!
//! This crate contains everything below the batch orchestrator:
//! - Domain types (instruments, bars, series keys, cached series)
//! - Provider trait and the Eastmoney HTTP provider
//! - Validated column mapping from provider rows to bars
//! - Trading calendar, interval resolution and retry
//! - Parquet cache store, merge engine and derived fields

pub mod data;
pub mod domain;
