//! Ingestion of one stable file.
//!
//! ```text
//! read (bounded retry) ─> size re-check ─> fingerprint ─> decode ─> parse ─> resolve ─> archive
//! ```
//!
//! Steps run strictly in sequence. Format and store failures are terminal
//! for the file and route it to the error archive. Archive failures are
//! logged and counted but never change the outcome.

use crate::archive::{Archiver, Outcome};
use crate::config::AppConfig;
use crate::error::{IngestError, Result};
use crate::identity;
use crate::parser::{self, ParseOptions};
use crate::record::ParsedRecord;
use crate::store::RecordStore;
use crate::versioning::{Resolution, VersionResolver};
use crate::watcher::events::{IngestEvent, RunStats};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument as _;

/// Retry policy for reading a file that is temporarily unreadable.
#[derive(Debug, Clone, Copy)]
pub struct ReadPolicy {
    pub retries: u32,
    pub backoff: Duration,
}

impl Default for ReadPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

/// What happened to a dispatched file.
#[derive(Debug, Clone)]
pub enum IngestReport {
    /// Terminal outcome reached (success or failure).
    Completed(IngestEvent),
    /// Size moved since the file was judged stable; nothing was parsed.
    Changed { expected: u64, actual: u64 },
    /// The file disappeared before it could be read.
    Vanished,
}

pub struct IngestPipeline {
    parse_options: ParseOptions,
    resolver: VersionResolver,
    archiver: Archiver,
    read_policy: ReadPolicy,
    stats: Arc<RunStats>,
}

impl IngestPipeline {
    pub fn new(
        parse_options: ParseOptions,
        resolver: VersionResolver,
        archiver: Archiver,
        read_policy: ReadPolicy,
        stats: Arc<RunStats>,
    ) -> Self {
        Self {
            parse_options,
            resolver,
            archiver,
            read_policy,
            stats,
        }
    }

    /// Build the pipeline described by `config` on top of `store`.
    pub fn from_config(
        config: &AppConfig,
        store: Arc<dyn RecordStore>,
        stats: Arc<RunStats>,
    ) -> Self {
        let resolver = VersionResolver::new(store).with_max_attempts(config.store.resolve_retries);
        let archiver = Archiver::new(config.archive.clone(), config.watch.root.clone());
        let read_policy = ReadPolicy {
            retries: config.watch.read_retries,
            backoff: config.watch.read_retry_backoff(),
        };
        Self::new(
            config.parser.clone(),
            resolver,
            archiver,
            read_policy,
            stats,
        )
    }

    pub fn stats(&self) -> &Arc<RunStats> {
        &self.stats
    }

    /// Ingest `path`. With `expected_size`, a file whose size no longer
    /// matches is reported as [`IngestReport::Changed`] instead of parsed.
    pub async fn ingest(&self, path: &Path, expected_size: Option<u64>) -> IngestReport {
        let span = tracing::info_span!(
            "ingest",
            id = %uuid::Uuid::new_v4(),
            path = %path.display()
        );
        self.ingest_inner(path, expected_size).instrument(span).await
    }

    async fn ingest_inner(&self, path: &Path, expected_size: Option<u64>) -> IngestReport {
        if let Some(expected) = expected_size {
            match tokio::fs::metadata(path).await {
                Ok(meta) if meta.len() != expected => {
                    return self.changed(expected, meta.len());
                }
                Err(e) if e.kind() == ErrorKind::NotFound => return IngestReport::Vanished,
                _ => {}
            }
        }

        let bytes = match self.read_bytes(path).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                tracing::debug!("File vanished before it could be read");
                return IngestReport::Vanished;
            }
            Err(e) => return self.fail(path, e).await,
        };

        if let Some(expected) = expected_size {
            let actual = bytes.len() as u64;
            if actual != expected {
                return self.changed(expected, actual);
            }
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match self.process(bytes, &file_name).await {
            Ok((resolution, fingerprint)) => {
                let event = IngestEvent::resolved(display(path), &resolution, fingerprint);
                self.finish(path, Outcome::Success, event).await
            }
            Err(e) => self.fail(path, e).await,
        }
    }

    async fn process(&self, bytes: Vec<u8>, file_name: &str) -> Result<(Resolution, String)> {
        let record = parse_bytes(bytes, file_name, &self.parse_options)?;
        let fingerprint = record.fingerprint.clone();
        tracing::debug!(key = %record.key, %fingerprint, blocks = record.signal_blocks.len(), "Parsed test log");

        let resolution = self.resolver.resolve(record).await?;
        Ok((resolution, fingerprint))
    }

    /// Read the whole file, retrying transient failures.
    /// `Ok(None)` means the file no longer exists.
    async fn read_bytes(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        let mut attempt = 0u32;
        loop {
            match tokio::fs::read(path).await {
                Ok(bytes) => return Ok(Some(bytes)),
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
                Err(e) if attempt < self.read_policy.retries => {
                    attempt += 1;
                    tracing::debug!(error = %e, attempt, "File not readable yet, retrying");
                    tokio::time::sleep(self.read_policy.backoff * attempt).await;
                }
                Err(e) => {
                    return Err(IngestError::IoTransient {
                        path: path.to_path_buf(),
                        source: e,
                    });
                }
            }
        }
    }

    fn changed(&self, expected: u64, actual: u64) -> IngestReport {
        tracing::info!(expected, actual, "File changed after it was judged stable, re-queueing");
        self.stats.record_requeue();
        IngestReport::Changed { expected, actual }
    }

    async fn fail(&self, path: &Path, err: IngestError) -> IngestReport {
        tracing::warn!(kind = %err.kind(), error = %err, "Ingestion failed");
        let event = IngestEvent::Failed {
            path: display(path),
            kind: err.kind(),
            error: err.to_string(),
        };
        self.finish(path, Outcome::Error, event).await
    }

    async fn finish(&self, path: &Path, outcome: Outcome, event: IngestEvent) -> IngestReport {
        match self.archiver.archive(path, outcome).await {
            Ok(Some(target)) => {
                tracing::debug!(target = %target.display(), "Source archived");
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Archiving failed; outcome unchanged");
                self.stats.record_archive_failure();
            }
        }

        event.emit();
        self.stats.record(&event);
        IngestReport::Completed(event)
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

/// Decode and parse a log read from disk. The fingerprint covers `bytes`
/// as read, not the decoded text.
///
/// # Errors
///
/// Returns `IngestError::Format` when the text is not a valid test log.
pub fn parse_bytes(bytes: Vec<u8>, file_name: &str, options: &ParseOptions) -> Result<ParsedRecord> {
    let fingerprint = identity::fingerprint(&bytes);
    let text = decode_text(bytes);
    let mut record = parser::parse_with(&text, file_name, options)?;
    record.fingerprint = fingerprint;
    Ok(record)
}

/// UTF-8 when valid, otherwise each byte as a Latin-1 character.
pub fn decode_text(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes)
        .unwrap_or_else(|e| e.into_bytes().iter().map(|&b| char::from(b)).collect())
}
