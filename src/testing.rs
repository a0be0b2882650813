//! Testing utilities: build `.npy` fixtures without NumPy.
//!
//! [`NpyFileBuilder`] writes structured arrays with any mix of field types,
//! byte orders, padding, format versions and shapes, plus deliberately broken
//! variants (bad magic, truncated payloads) for error-path tests.
//!
//! # Example
//!
//! ```
//! use npy_points::testing::NpyFileBuilder;
//!
//! let bytes = NpyFileBuilder::new()
//!     .field("X", "<f8")
//!     .field("Intensity", "<u2")
//!     .row(&[1.5, 10.0])
//!     .row(&[2.5, 20.0])
//!     .build();
//! assert_eq!(&bytes[..6], b"\x93NUMPY");
//! assert_eq!(bytes.len() % 64, (2 * 10) % 64);
//! ```

use std::fs::{File, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::io::compression::auto_detect_writer;
use crate::io::npy::{NPY_MAGIC, TypeStr};
use crate::type_token::ByteOrder;

#[derive(Clone, Debug)]
struct FixtureField {
    name: String,
    typestr: String,
}

/// Fluent builder for `.npy` test files.
#[derive(Clone, Debug)]
pub struct NpyFileBuilder {
    fields: Vec<FixtureField>,
    descr: Option<String>,
    shape: Option<Vec<usize>>,
    version: u8,
    payload: Vec<u8>,
    rows: usize,
    truncate: usize,
    magic: Vec<u8>,
}

impl Default for NpyFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl NpyFileBuilder {
    /// An empty version 1.0 builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            fields: Vec::new(),
            descr: None,
            shape: None,
            version: 1,
            payload: Vec::new(),
            rows: 0,
            truncate: 0,
            magic: NPY_MAGIC.to_vec(),
        }
    }

    /// Declare a field with a NumPy typestring, e.g. `("X", "<f8")`.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, typestr: impl Into<String>) -> Self {
        self.fields.push(FixtureField {
            name: name.into(),
            typestr: typestr.into(),
        });
        self
    }

    /// Declare `bytes` of alignment padding (`('', '|V<bytes>')`).
    #[must_use]
    pub fn padding(self, bytes: usize) -> Self {
        self.field("", format!("|V{bytes}"))
    }

    /// Override the descriptor text written in the header.
    #[must_use]
    pub fn descr(mut self, descr: impl Into<String>) -> Self {
        self.descr = Some(descr.into());
        self
    }

    /// Override the shape; defaults to `(rows,)`.
    #[must_use]
    pub fn shape(mut self, shape: &[usize]) -> Self {
        self.shape = Some(shape.to_vec());
        self
    }

    /// Format major version (1, 2 or 3).
    #[must_use]
    pub fn version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    /// Replace the magic string.
    #[must_use]
    pub fn magic(mut self, magic: &[u8]) -> Self {
        self.magic = magic.to_vec();
        self
    }

    /// Drop the last `bytes` bytes of the payload when building.
    #[must_use]
    pub fn truncate(mut self, bytes: usize) -> Self {
        self.truncate = bytes;
        self
    }

    /// Append one record; `values` are given for the named fields in order.
    ///
    /// Values are cast to each field's type and written in its byte order.
    /// Fields of unsupported kinds are zero-filled.
    #[must_use]
    pub fn row(mut self, values: &[f64]) -> Self {
        let mut values = values.iter().copied();
        for field in &self.fields {
            let Some(t) = TypeStr::parse(&field.typestr) else {
                continue;
            };
            let value = if field.name.is_empty() {
                None
            } else {
                values.next()
            };
            self.payload.extend(encode(&t, value.unwrap_or(0.0)));
        }
        self.rows += 1;
        self
    }

    /// Append raw payload bytes.
    #[must_use]
    pub fn raw_payload(mut self, bytes: &[u8]) -> Self {
        self.payload.extend_from_slice(bytes);
        self
    }

    fn descr_text(&self) -> String {
        if let Some(descr) = &self.descr {
            return descr.clone();
        }
        let entries: Vec<String> = self
            .fields
            .iter()
            .map(|f| format!("({}, '{}')", py_str(&f.name), f.typestr))
            .collect();
        format!("[{}]", entries.join(", "))
    }

    fn shape_text(&self) -> String {
        let shape = self.shape.clone().unwrap_or_else(|| vec![self.rows]);
        match shape.as_slice() {
            [n] => format!("({n},)"),
            dims => {
                let dims: Vec<String> = dims.iter().map(ToString::to_string).collect();
                format!("({})", dims.join(", "))
            }
        }
    }

    /// Serialize the file to bytes.
    #[must_use]
    pub fn build(&self) -> Vec<u8> {
        let dict = format!(
            "{{'descr': {}, 'fortran_order': False, 'shape': {}, }}",
            self.descr_text(),
            self.shape_text()
        );
        let len_bytes = if self.version == 1 { 2 } else { 4 };
        let preamble = self.magic.len() + 2 + len_bytes;
        let unpadded = preamble + dict.len() + 1;
        let total = unpadded.div_ceil(64) * 64;
        let mut header = dict.into_bytes();
        header.resize(total - preamble - 1, b' ');
        header.push(b'\n');

        let mut out = self.magic.clone();
        out.extend_from_slice(&[self.version, 0]);
        if self.version == 1 {
            out.extend_from_slice(&(header.len() as u16).to_le_bytes());
        } else {
            out.extend_from_slice(&(header.len() as u32).to_le_bytes());
        }
        out.extend_from_slice(&header);
        let keep = self.payload.len().saturating_sub(self.truncate);
        out.extend_from_slice(&self.payload[..keep]);
        out
    }

    /// Write the file to `path`, compressing it when the extension asks for it.
    ///
    /// Creates parent directories if needed.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
        }
        let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
        let mut w = auto_detect_writer(f, path)
            .with_context(|| format!("setup compression for {}", path.display()))?;
        w.write_all(&self.build())
            .with_context(|| format!("write {}", path.display()))?;
        w.flush()?;
        Ok(path.to_path_buf())
    }
}

fn py_str(s: &str) -> String {
    if s.contains('\'') {
        format!("\"{s}\"")
    } else {
        format!("'{s}'")
    }
}

fn encode(t: &TypeStr, value: f64) -> Vec<u8> {
    let mut bytes = match (t.kind, t.size) {
        ('i', 1) => (value as i8).to_le_bytes().to_vec(),
        ('i', 2) => (value as i16).to_le_bytes().to_vec(),
        ('i', 4) => (value as i32).to_le_bytes().to_vec(),
        ('i', 8) => (value as i64).to_le_bytes().to_vec(),
        ('u', 1) => (value as u8).to_le_bytes().to_vec(),
        ('u', 2) => (value as u16).to_le_bytes().to_vec(),
        ('u', 4) => (value as u32).to_le_bytes().to_vec(),
        ('u', 8) => (value as u64).to_le_bytes().to_vec(),
        ('f', 4) => (value as f32).to_le_bytes().to_vec(),
        ('f', 8) => value.to_le_bytes().to_vec(),
        (_, size) => vec![0; size],
    };
    let stored_big = t.order == ByteOrder::Big;
    if stored_big {
        bytes.reverse();
    }
    bytes
}
