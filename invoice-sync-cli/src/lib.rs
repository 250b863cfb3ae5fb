//! Invoice spreadsheet to CRM synchronization
//!
//! Reads monthly invoice workbooks, groups rows into logical invoices
//! with stable external keys, diffs them against the links persisted
//! from earlier runs and applies the minimal create/update/remove set
//! to the remote CRM under bounded concurrency with retry. Each run is
//! a persisted job whose progress, log and result can be inspected.

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod ingest;
pub mod store;
pub mod sync;
