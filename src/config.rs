//! Reader and loader configuration.
//!
//! Everything the loader needs is passed in explicitly through these structs;
//! there is no process-wide setup step.
//!
//! ```
//! use npy_points::config::ReaderOptions;
//!
//! let opts = ReaderOptions::from_json(
//!     r#"{"type": "readers.numpy", "filename": "points.npy", "block_rows": 1024}"#,
//! ).unwrap();
//! assert_eq!(opts.block_rows, 1024);
//! assert!(opts.loader.mmap);
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{NpyError, Result};
use crate::stage::NUMPY_READER;

/// Default number of rows covered by one iteration block.
pub const DEFAULT_BLOCK_ROWS: usize = 4096;

/// Default upper bound on the header dictionary length, in bytes.
pub const DEFAULT_MAX_HEADER_LEN: usize = 1 << 20;

/// Settings for [`FormatLoader`](crate::io::npy::FormatLoader).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Memory-map uncompressed files instead of reading them into memory.
    pub mmap: bool,
    /// Transparently decompress `.gz`/`.zst` inputs.
    pub decompress: bool,
    /// Reject headers longer than this many bytes.
    pub max_header_len: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            mmap: true,
            decompress: true,
            max_header_len: DEFAULT_MAX_HEADER_LEN,
        }
    }
}

/// Options for one [`NpyReader`](crate::reader::NpyReader) session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderOptions {
    /// Path of the `.npy` file to read.
    pub filename: PathBuf,
    /// Rows per iteration block.
    #[serde(default = "default_block_rows")]
    pub block_rows: usize,
    #[serde(default)]
    pub loader: LoaderConfig,
}

fn default_block_rows() -> usize {
    DEFAULT_BLOCK_ROWS
}

/// Stage JSON as it appears in a pipeline definition.
#[derive(Deserialize)]
struct StageJson {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(flatten)]
    options: ReaderOptions,
}

impl ReaderOptions {
    /// Options for `filename` with every other setting at its default.
    pub fn new(filename: impl Into<PathBuf>) -> Self {
        Self {
            filename: filename.into(),
            block_rows: DEFAULT_BLOCK_ROWS,
            loader: LoaderConfig::default(),
        }
    }

    /// Set the number of rows per iteration block.
    #[must_use]
    pub fn with_block_rows(mut self, block_rows: usize) -> Self {
        self.block_rows = block_rows;
        self
    }

    /// Replace the loader configuration.
    #[must_use]
    pub fn with_loader(mut self, loader: LoaderConfig) -> Self {
        self.loader = loader;
        self
    }

    /// Parse stage options from JSON.
    ///
    /// An optional `"type"` key must name this reader (`readers.numpy`).
    ///
    /// # Errors
    /// Returns a format error if the JSON is malformed or names another stage.
    pub fn from_json(json: &str) -> Result<Self> {
        let stage: StageJson = serde_json::from_str(json)
            .map_err(|e| NpyError::format("<stage options>", format!("parse options: {e}")))?;
        if let Some(kind) = stage.kind
            && kind != NUMPY_READER.name
        {
            return Err(NpyError::format(
                &stage.options.filename,
                format!("stage type '{kind}' is not {}", NUMPY_READER.name),
            ));
        }
        Ok(stage.options)
    }
}
