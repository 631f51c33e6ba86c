//! Fixed-size batching for bulk-ingestion callers.
//!
//! [`create_batches`] groups any iterator lazily. [`read_records_in_batches`]
//! does the same for a newline-delimited JSON file without ever holding the
//! whole file in memory: lines are pulled through a tokio `BufReader` one at a
//! time and at most one partial batch is buffered.
//!
//! Malformed lines are handled per [`BatchMode`]: lenient (the default)
//! logs and skips them, strict reports the first one and stops.

use crate::error::ScribeError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio_stream::Stream;
use tracing::{debug, error};

fn validate_batch_size(batch_size: usize) -> Result<(), ScribeError> {
    if batch_size < 1 {
        return Err(ScribeError::InvalidConfiguration(format!(
            "batch_size must be at least 1, got {batch_size}"
        )));
    }
    Ok(())
}

// ── In-memory sequences ─────────────────────────────────────────────────────

/// Iterator returned by [`create_batches`].
#[derive(Debug, Clone)]
pub struct Batches<I> {
    inner: I,
    batch_size: usize,
}

/// Break an iterable into consecutive groups of up to `batch_size` items.
///
/// ```rust
/// use pdf_scribe::batch::create_batches;
///
/// let groups: Vec<Vec<i32>> = create_batches(1..=5, 2).unwrap().collect();
/// assert_eq!(groups, vec![vec![1, 2], vec![3, 4], vec![5]]);
/// ```
pub fn create_batches<I: IntoIterator>(
    iterable: I,
    batch_size: usize,
) -> Result<Batches<I::IntoIter>, ScribeError> {
    validate_batch_size(batch_size)?;
    Ok(Batches {
        inner: iterable.into_iter(),
        batch_size,
    })
}

impl<I: Iterator> Iterator for Batches<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk: Vec<I::Item> = self.inner.by_ref().take(self.batch_size).collect();
        if chunk.is_empty() {
            None
        } else {
            Some(chunk)
        }
    }
}

impl<I: FusedIterator> FusedIterator for Batches<I> {}

// ── Line-delimited record files ─────────────────────────────────────────────

/// What to do with a line that does not decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchMode {
    /// Log the line number and parse error, skip the line. (default)
    #[default]
    Lenient,
    /// Stop with [`ScribeError::MalformedRecord`]; nothing after it is read.
    Strict,
}

/// A document chunk as written by the ingestion tooling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(default)]
    pub section_header: String,
    #[serde(default)]
    pub section_text: String,
    #[serde(default)]
    pub header_level: Option<u32>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Incremental reader returned by [`read_records_in_batches`].
pub struct RecordBatches<T> {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    batch_size: usize,
    mode: BatchMode,
    line_number: usize,
    finished: bool,
    _record: PhantomData<fn() -> T>,
}

/// Open a JSONL file for batched, streaming decoding into `T`.
///
/// # Errors
/// - [`ScribeError::InvalidConfiguration`] when `batch_size < 1`, checked
///   before the file is touched
/// - [`ScribeError::SourceNotFound`] when `path` does not exist
pub async fn read_records_in_batches<T: DeserializeOwned>(
    path: impl AsRef<Path>,
    batch_size: usize,
    mode: BatchMode,
) -> Result<RecordBatches<T>, ScribeError> {
    validate_batch_size(batch_size)?;
    let path = path.as_ref().to_path_buf();

    let file = match File::open(&path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ScribeError::SourceNotFound { path });
        }
        Err(source) => return Err(ScribeError::Io { path, source }),
    };

    debug!("Reading records from {} in batches of {}", path.display(), batch_size);

    Ok(RecordBatches {
        path,
        lines: BufReader::new(file).lines(),
        batch_size,
        mode,
        line_number: 0,
        finished: false,
        _record: PhantomData,
    })
}

impl<T: DeserializeOwned> RecordBatches<T> {
    /// Pull the next batch. `None` once the input is exhausted (or after a
    /// strict-mode failure has been reported).
    pub async fn next_batch(&mut self) -> Option<Result<Vec<T>, ScribeError>> {
        if self.finished {
            return None;
        }

        let mut batch = Vec::with_capacity(self.batch_size);

        loop {
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    self.finished = true;
                    break;
                }
                Err(source) => {
                    self.finished = true;
                    return Some(Err(ScribeError::Io {
                        path: self.path.clone(),
                        source,
                    }));
                }
            };
            self.line_number += 1;

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<T>(line) {
                Ok(record) => {
                    batch.push(record);
                    if batch.len() >= self.batch_size {
                        return Some(Ok(batch));
                    }
                }
                Err(source) => match self.mode {
                    BatchMode::Strict => {
                        self.finished = true;
                        return Some(Err(ScribeError::MalformedRecord {
                            path: self.path.clone(),
                            line: self.line_number,
                            source,
                        }));
                    }
                    BatchMode::Lenient => {
                        error!(
                            "Failed to parse JSON at line {} in {}: {}",
                            self.line_number,
                            self.path.display(),
                            source
                        );
                    }
                },
            }
        }

        if batch.is_empty() {
            None
        } else {
            Some(Ok(batch))
        }
    }

    /// Adapt the reader into a `Stream` of batches.
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<T>, ScribeError>> + Send
    where
        T: Send,
    {
        futures::stream::unfold(self, |mut reader| async move {
            reader.next_batch().await.map(|batch| (batch, reader))
        })
    }
}
