//! # loghopper - factory test-log ingestion
//!
//! loghopper watches a drop folder for text test logs written by factory
//! test stations. Each file is ingested once its size stops changing:
//! it is parsed into a typed record, fingerprinted, versioned against the
//! record already stored under the same key, and archived.
//!
//! ## Quick Start
//!
//! ```no_run
//! use loghopper::parser;
//!
//! # fn example() -> anyhow::Result<()> {
//! let raw = std::fs::read_to_string("SN123_0315.txt")?;
//! let record = parser::parse(&raw, "SN123_0315.txt")?;
//! println!("{} has {} signal blocks", record.key, record.signal_blocks.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Modules
//!
//! - [`parser`]: Test-log text to [`record::ParsedRecord`]
//! - [`identity`]: Record keys and content fingerprints
//! - [`versioning`]: Inserted / Updated / Duplicate decisions against a [`store`]
//! - [`archive`]: Moving processed files to success/error folders
//! - [`ingest`]: The per-file pipeline tying the above together
//! - [`watcher`]: Drop-folder source, stability tracking and the processing loop
//! - [`config`], [`logging`], [`error`]: Ambient plumbing
//!
//! ## Key Concepts
//!
//! ### Record key and fingerprint
//!
//! A record is identified by device serial, test date and test time
//! (`SN123-20240315-140509`). Its content fingerprint is the SHA-256 of the
//! raw text, so re-dropping an identical file is a no-op while any edit,
//! whitespace included, produces a new version.
//!
//! ### Optimistic versioning
//!
//! Stores expose a revision per key and reject writes made against a stale
//! revision. The resolver re-reads and re-decides on conflict, so two files
//! racing on one key never both report Inserted.

#![warn(clippy::all, rust_2018_idioms)]

pub mod archive;
pub mod config;
pub mod error;
pub mod identity;
pub mod ingest;
pub mod logging;
pub mod parser;
pub mod record;
pub mod store;
pub mod versioning;
pub mod watcher;
