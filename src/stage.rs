//! Stage registration: what this reader is and how to build one.
//!
//! A host pipeline discovers readers through [`ReaderInfo`] descriptions and
//! builds them with a factory. This crate ships exactly one reader,
//! [`NUMPY_READER`], built by [`create`].

use std::path::Path;

use serde::Serialize;

use crate::config::ReaderOptions;
use crate::reader::NpyReader;

/// Capability description of a reader stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ReaderInfo {
    /// Stage name used in pipeline definitions.
    pub name: &'static str,
    pub description: &'static str,
    /// File extensions handled, without the leading dot.
    pub extensions: &'static [&'static str],
}

/// Suffixes a compressed input may carry on top of a handled extension.
const COMPRESSED_SUFFIXES: &[&str] = &["", ".gz", ".gzip", ".zst", ".zstd"];

impl ReaderInfo {
    /// Whether `path` looks like a file this reader handles.
    ///
    /// ```
    /// use npy_points::stage::NUMPY_READER;
    ///
    /// assert!(NUMPY_READER.can_read("scan.npy"));
    /// assert!(NUMPY_READER.can_read("scan.NPY.gz"));
    /// assert!(!NUMPY_READER.can_read("scan.las"));
    /// ```
    pub fn can_read(&self, path: impl AsRef<Path>) -> bool {
        let name = path.as_ref().to_string_lossy().to_lowercase();
        self.extensions.iter().any(|ext| {
            COMPRESSED_SUFFIXES
                .iter()
                .any(|suffix| name.ends_with(&format!(".{ext}{suffix}")))
        })
    }
}

/// The `.npy` reader stage.
pub const NUMPY_READER: ReaderInfo = ReaderInfo {
    name: "readers.numpy",
    description: "Read data from .npy files.",
    extensions: &["npy"],
};

/// Every reader stage this crate provides.
pub fn readers() -> &'static [ReaderInfo] {
    &[NUMPY_READER]
}

/// Factory for [`NUMPY_READER`].
pub fn create(options: ReaderOptions) -> NpyReader {
    NpyReader::new(options)
}

/// Find the reader stage for `path` by extension.
pub fn infer_reader(path: impl AsRef<Path>) -> Option<&'static ReaderInfo> {
    let path = path.as_ref();
    readers().iter().find(|info| info.can_read(path))
}
