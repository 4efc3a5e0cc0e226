//! Resilient reader for messy delimited exports.
//!
//! Walks the candidate encodings in order. For each one the body is decoded
//! strictly, then tokenized strictly; a tokenization failure retries the same
//! encoding with a permissive tokenizer that accepts ragged rows and warns
//! about each of them. When every candidate has been tried, a final Latin-1
//! pass repairs cells that were really UTF-8 and replaces whatever cannot be
//! recovered with U+FFFD. That pass always yields a table unless the body
//! has no header row at all, which is a property of the file rather than of
//! its encoding and ends the read with [`RefineryError::ReadExhausted`].

use crate::config::ParseOptions;
use crate::error::{RefineryError, Result};
use crate::ingest::encoding::{self, TextEncoding};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

/// A decoded, tokenized file before any shape or type normalization.
///
/// Data rows may still disagree with the header width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Declared header width.
    pub fn width(&self) -> usize {
        self.headers.len()
    }

    /// Number of data rows.
    pub fn height(&self) -> usize {
        self.rows.len()
    }
}

/// How the file was finally read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReadReport {
    /// Encoding that produced the table.
    pub encoding: String,
    /// Whether the permissive tokenizer was needed.
    pub permissive: bool,
    /// Whether the lossy terminal fallback was needed.
    pub lossy: bool,
    /// Rows whose field count disagreed with the header.
    pub malformed_rows: usize,
    /// Every remedy attempted, in order.
    pub attempted: Vec<String>,
}

/// Table plus the record of how it was obtained.
#[derive(Debug, Clone)]
pub struct ReadOutcome {
    pub table: RawTable,
    pub report: ReadReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strictness {
    Strict,
    Permissive,
}

impl Strictness {
    fn label(self) -> &'static str {
        match self {
            Strictness::Strict => "strict",
            Strictness::Permissive => "permissive",
        }
    }
}

/// Reader that never gives up on a file that exists.
#[derive(Debug, Clone, Default)]
pub struct TableReader {
    options: ParseOptions,
}

impl TableReader {
    pub fn new(options: ParseOptions) -> Self {
        Self { options }
    }

    /// Read a file, resolving its candidate encodings from its own bytes.
    pub fn read_path(&self, path: &Path) -> Result<ReadOutcome> {
        let bytes = load_source(path)?;
        let candidates = encoding::resolve_bytes(&bytes);
        self.read_bytes(path, &bytes, &candidates)
    }

    /// Read a file with a caller-produced candidate list.
    pub fn read_with_candidates(
        &self,
        path: &Path,
        candidates: &[TextEncoding],
    ) -> Result<ReadOutcome> {
        let bytes = load_source(path)?;
        self.read_bytes(path, &bytes, candidates)
    }

    /// Run the remedy ladder over an in-memory body.
    ///
    /// `path` is only used for messages.
    pub fn read_bytes(
        &self,
        path: &Path,
        bytes: &[u8],
        candidates: &[TextEncoding],
    ) -> Result<ReadOutcome> {
        let mut attempted: Vec<String> = Vec::new();

        for candidate in candidates {
            let Some(text) = candidate.decode_strict(bytes) else {
                debug!("Decode failed with {}", candidate);
                attempted.push(format!("{} (decode)", candidate));
                continue;
            };

            for strictness in [Strictness::Strict, Strictness::Permissive] {
                attempted.push(format!("{} ({})", candidate, strictness.label()));
                match self.tokenize(&text, strictness) {
                    Ok(Some((table, malformed_rows))) => {
                        info!(
                            "Read {} rows x {} columns from {} using {} ({})",
                            table.height(),
                            table.width(),
                            path.display(),
                            candidate,
                            strictness.label()
                        );
                        return Ok(ReadOutcome {
                            table,
                            report: ReadReport {
                                encoding: candidate.label(),
                                permissive: strictness == Strictness::Permissive,
                                lossy: false,
                                malformed_rows,
                                attempted,
                            },
                        });
                    }
                    Ok(None) => {
                        debug!("No header row with {} ({})", candidate, strictness.label());
                    }
                    Err(e) => {
                        debug!(
                            "Tokenization failed with {} ({}): {}",
                            candidate,
                            strictness.label(),
                            e
                        );
                    }
                }
            }
        }

        warn!(
            "All candidate encodings failed for {}; falling back to lossy latin-1",
            path.display()
        );
        attempted.push("latin-1 (lossy)".to_string());
        self.read_terminal(path, bytes, attempted)
    }

    fn read_terminal(
        &self,
        path: &Path,
        bytes: &[u8],
        attempted: Vec<String>,
    ) -> Result<ReadOutcome> {
        let text = encoding::decode_latin1(bytes);
        let parsed = self
            .tokenize(&text, Strictness::Permissive)
            .unwrap_or_else(|e| {
                warn!("Permissive tokenizer failed on lossy fallback: {}", e);
                None
            });

        let Some((table, malformed_rows)) = parsed else {
            return Err(RefineryError::ReadExhausted {
                path: path.to_path_buf(),
                attempted,
            });
        };

        let repair_row = |row: Vec<String>| -> Vec<String> {
            row.iter()
                .map(|cell| encoding::repair_latin1_mojibake(cell))
                .collect()
        };
        let table = RawTable {
            headers: repair_row(table.headers),
            rows: table.rows.into_iter().map(repair_row).collect(),
        };

        Ok(ReadOutcome {
            table,
            report: ReadReport {
                encoding: TextEncoding::Latin1.label(),
                permissive: true,
                lossy: true,
                malformed_rows,
                attempted,
            },
        })
    }

    /// Tokenize decoded text. `Ok(None)` means there was no header row.
    fn tokenize(
        &self,
        text: &str,
        strictness: Strictness,
    ) -> std::result::Result<Option<(RawTable, usize)>, csv::Error> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .delimiter(self.options.delimiter)
            .quote(self.options.quote)
            .double_quote(true)
            .flexible(strictness == Strictness::Permissive)
            .from_reader(text.as_bytes());

        let mut records = reader.records();
        let headers: Vec<String> = match records.next() {
            Some(record) => record?.iter().map(str::to_string).collect(),
            None => return Ok(None),
        };

        let width = headers.len();
        let mut rows = Vec::new();
        let mut malformed = 0usize;
        for record in records {
            let record = record?;
            if record.len() != width {
                malformed += 1;
                let line = record.position().map(|p| p.line()).unwrap_or(0);
                warn!(
                    "Malformed row at line {}: expected {} fields, found {}",
                    line,
                    width,
                    record.len()
                );
            }
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Some((RawTable { headers, rows }, malformed)))
    }
}

/// Read the whole source once, classifying failures that must not be retried.
fn load_source(path: &Path) -> Result<Vec<u8>> {
    if !path.exists() {
        return Err(RefineryError::SourceNotFound(path.to_path_buf()));
    }
    std::fs::read(path).map_err(|source| RefineryError::SourceUnreadable {
        path: path.to_path_buf(),
        source,
    })
}
