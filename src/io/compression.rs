//! Pluggable compression support for `.npy` inputs.
//!
//! A `.npy` file may arrive gzip- or zstd-compressed (`points.npy.gz`). The
//! loader asks this module whether a file is compressed and, if so, reads it
//! through the matching decoder into an owned buffer; compressed files are
//! never memory-mapped.
//!
//! ## Built-in Codecs
//!
//! When enabled via feature flags, the following codecs are available:
//! - **Gzip** (`.gz`) - via `flate2` crate (feature: `compression-gzip`)
//! - **Zstd** (`.zst`) - via `zstd` crate (feature: `compression-zstd`)
//!
//! ## Detection
//! File extensions are checked first, falling back to the magic bytes at the
//! start of the file. Additional codecs can be registered with
//! [`register_codec`].
//!
//! The writer half of each codec is used by
//! [`NpyFileBuilder`](crate::testing::NpyFileBuilder) to produce compressed
//! fixtures.

use anyhow::{Context, Result};
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

/// Global codec registry for pluggable compression support.
static CODEC_REGISTRY: RwLock<Option<Vec<Arc<dyn CompressionCodec>>>> = RwLock::new(None);

/// Initialize the codec registry with built-in codecs.
fn init_registry() -> Vec<Arc<dyn CompressionCodec>> {
    vec![
        #[cfg(feature = "compression-gzip")]
        Arc::new(GzipCodec),
        #[cfg(feature = "compression-zstd")]
        Arc::new(ZstdCodec),
    ]
}

/// Get or initialize the global codec registry.
fn get_registry() -> Vec<Arc<dyn CompressionCodec>> {
    let mut lock = CODEC_REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    lock.get_or_insert_with(init_registry).clone()
}

/// Register a custom compression codec globally.
///
/// Registered codecs take part in detection alongside the built-in ones.
pub fn register_codec(codec: Arc<dyn CompressionCodec>) {
    let mut lock = CODEC_REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    lock.get_or_insert_with(init_registry).push(codec);
}

/// Pluggable compression codec trait.
///
/// Codecs are detected via file extensions (fast path) or magic bytes (fallback).
pub trait CompressionCodec: Send + Sync {
    /// Human-readable codec name (e.g., "gzip", "zstd").
    fn name(&self) -> &str;

    /// File extensions associated with this codec (e.g., `&[".gz", ".gzip"]`).
    ///
    /// Extensions should include the leading dot and be lowercase.
    fn extensions(&self) -> &[&str];

    /// Optional magic byte signature for content-based detection.
    fn magic_bytes(&self) -> Option<&[u8]>;

    /// Wrap a reader with decompression.
    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>>;

    /// Wrap a writer with compression.
    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn Write>>;
}

/// Detect compression codec from file path extension.
fn detect_from_extension(path: &Path) -> Option<Arc<dyn CompressionCodec>> {
    let path_str = path.to_string_lossy().to_lowercase();
    get_registry()
        .into_iter()
        .find(|codec| codec.extensions().iter().any(|ext| path_str.ends_with(ext)))
}

/// Detect compression codec from the leading bytes of a file.
fn detect_from_magic(head: &[u8]) -> Option<Arc<dyn CompressionCodec>> {
    if head.is_empty() {
        return None;
    }
    get_registry().into_iter().find(|codec| {
        codec
            .magic_bytes()
            .is_some_and(|magic| head.len() >= magic.len() && head.starts_with(magic))
    })
}

/// Find the codec for a file, by extension first and then by `head`, the
/// first few bytes of its content.
pub fn detect_codec(path: impl AsRef<Path>, head: &[u8]) -> Option<Arc<dyn CompressionCodec>> {
    detect_from_extension(path.as_ref()).or_else(|| detect_from_magic(head))
}

/// Decompress everything `reader` yields with `codec`.
pub fn decompress_all<R: Read + 'static>(
    codec: &dyn CompressionCodec,
    reader: R,
) -> Result<Vec<u8>> {
    let mut decoded = codec
        .wrap_reader_dyn(Box::new(reader))
        .with_context(|| format!("wrap reader with {} codec", codec.name()))?;
    let mut out = Vec::new();
    decoded
        .read_to_end(&mut out)
        .with_context(|| format!("decompress {} stream", codec.name()))?;
    Ok(out)
}

/// Automatically wrap a writer with compression if the path calls for it.
///
/// Detection is based solely on file path extension. If a matching codec is found,
/// the writer is wrapped with compression; otherwise it's returned unwrapped.
pub fn auto_detect_writer<W: Write + 'static>(
    writer: W,
    path_hint: impl AsRef<Path>,
) -> Result<Box<dyn Write>> {
    if let Some(codec) = detect_from_extension(path_hint.as_ref()) {
        return codec
            .wrap_writer_dyn(Box::new(writer))
            .with_context(|| format!("wrap writer with {} codec", codec.name()));
    }
    Ok(Box::new(BufWriter::new(writer)))
}

// ============================================================================
// Built-in Codec Implementations
// ============================================================================

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn extensions(&self) -> &[&str] {
        &[".gz", ".gzip"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x1f, 0x8b])
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        use flate2::read::GzDecoder;
        Ok(Box::new(GzDecoder::new(reader)))
    }

    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn Write>> {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        Ok(Box::new(GzEncoder::new(writer, Compression::default())))
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &str {
        "zstd"
    }

    fn extensions(&self) -> &[&str] {
        &[".zst", ".zstd"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x28, 0xb5, 0x2f, 0xfd])
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as Box<dyn Read>)
    }

    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn Write>> {
        zstd::stream::write::Encoder::new(writer, 3)
            .map(|e| Box::new(e.auto_finish()) as Box<dyn Write>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_npy_is_not_compressed() {
        assert!(detect_codec("points.npy", b"\x93NUMPY\x01\x00").is_none());
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn gzip_detected_by_extension_and_magic() {
        let name = |codec: Option<Arc<dyn CompressionCodec>>| codec.map(|c| c.name().to_string());
        assert_eq!(name(detect_codec("points.npy.gz", b"")).as_deref(), Some("gzip"));
        assert_eq!(name(detect_codec("points.bin", &[0x1f, 0x8b, 8])).as_deref(), Some("gzip"));
    }
}
