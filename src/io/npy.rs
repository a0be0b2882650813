//! `.npy` loading: header parsing and backing storage.
//!
//! This module provides:
//! - [`FormatLoader`]: opens a `.npy` file (optionally compressed), validates
//!   the header and returns an [`ArrayHandle`] owning the payload bytes.
//! - [`NpyHeader`], [`RawField`], [`RawDtype`], [`TypeStr`]: the decoded type
//!   descriptor, kept close to what is on disk. Mapping it to point fields is
//!   the job of [`schema`](crate::schema).
//!
//! # Format
//! A `.npy` file is the magic string `\x93NUMPY`, a major/minor version pair,
//! a little-endian header length (`u16` for version 1, `u32` for versions 2
//! and 3), a Python dict literal with the keys `descr`, `fortran_order` and
//! `shape`, and finally the raw array payload.
//!
//! Only structured arrays (a `descr` that is a list of fields) are accepted.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use num_traits::ToPrimitive;
use py_literal::Value as PyValue;
use tracing::debug;

use crate::config::LoaderConfig;
use crate::error::{NpyError, Result};
use crate::io::compression::{decompress_all, detect_codec};
use crate::type_token::ByteOrder;

/// Magic string at the start of every `.npy` file.
pub const NPY_MAGIC: &[u8; 6] = b"\x93NUMPY";

/// A parsed NumPy typestring such as `<f8`, `|u1` or `>i4`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeStr {
    pub order: ByteOrder,
    /// Basic kind character (`i`, `u`, `f`, `b`, `c`, `S`, `U`, `V`, `M`, `m`, `O`).
    pub kind: char,
    /// Element size in bytes.
    pub size: usize,
    raw: String,
}

impl TypeStr {
    /// Parse a typestring.
    ///
    /// Returns `None` unless the string is `[order]<kind><digits>`, with an
    /// optional `[unit]` suffix allowed only for datetime kinds (`M`, `m`).
    pub fn parse(s: &str) -> Option<Self> {
        let (order, rest) = match s.chars().next()? {
            '<' => (ByteOrder::Little, &s[1..]),
            '>' => (ByteOrder::Big, &s[1..]),
            '|' => (ByteOrder::NotApplicable, &s[1..]),
            '=' => (ByteOrder::native(), &s[1..]),
            _ => (ByteOrder::native(), s),
        };
        let mut chars = rest.chars();
        let kind = chars.next().filter(char::is_ascii_alphabetic)?;
        let rest = chars.as_str();
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let (digits, suffix) = rest.split_at(digits_end);
        let unit_ok = suffix
            .strip_prefix('[')
            .and_then(|u| u.strip_suffix(']'))
            .is_some_and(|u| !u.is_empty() && u.chars().all(|c| c.is_ascii_alphanumeric()));
        if !suffix.is_empty() && !(matches!(kind, 'M' | 'm') && unit_ok) {
            return None;
        }
        let count = if digits.is_empty() {
            match kind {
                'O' => std::mem::size_of::<usize>(),
                _ => return None,
            }
        } else {
            digits.parse::<usize>().ok()?
        };
        let size = match kind {
            'U' => count.checked_mul(4)?,
            _ => count,
        };
        let order = if size <= 1 {
            ByteOrder::NotApplicable
        } else {
            order
        };
        Some(Self {
            order,
            kind,
            size,
            raw: s.to_string(),
        })
    }

    /// The typestring as written in the header.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// Storage description of one descriptor entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawDtype {
    Scalar(TypeStr),
    /// A fixed-shape sub-array of `elem`.
    Subarray { elem: TypeStr, shape: Vec<usize> },
    /// A nested structured record.
    Record(Vec<RawField>),
}

impl RawDtype {
    /// Size in bytes of one element of this type, or `None` if it overflows.
    pub fn byte_size(&self) -> Option<usize> {
        match self {
            Self::Scalar(t) => Some(t.size),
            Self::Subarray { elem, shape } => checked_product(shape)?.checked_mul(elem.size),
            Self::Record(fields) => checked_record_size(fields),
        }
    }

    /// Short description for diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Self::Scalar(t) => t.as_str().to_string(),
            Self::Subarray { elem, shape } => format!("{}{shape:?}", elem.as_str()),
            Self::Record(fields) => format!("record of {} fields", fields.len()),
        }
    }
}

/// One entry of a structured descriptor, in declaration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawField {
    /// Field name; empty for alignment padding.
    pub name: String,
    pub dtype: RawDtype,
}

impl RawField {
    /// Whether this entry only pads the record (`('', '|V4')`).
    pub fn is_padding(&self) -> bool {
        self.name.is_empty() && matches!(&self.dtype, RawDtype::Scalar(t) if t.kind == 'V')
    }
}

/// The decoded `.npy` header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NpyHeader {
    pub version: (u8, u8),
    pub fields: Vec<RawField>,
    pub fortran_order: bool,
    pub shape: Vec<usize>,
    /// Offset of the first payload byte within the file.
    pub data_offset: usize,
}

impl NpyHeader {
    /// Bytes per record, or `None` if the descriptor overflows `usize`.
    pub fn itemsize(&self) -> Option<usize> {
        checked_record_size(&self.fields)
    }

    /// Number of records (the product of the shape; 1 for a scalar), or
    /// `None` if the shape overflows `usize`.
    pub fn len(&self) -> Option<usize> {
        checked_product(&self.shape)
    }

    /// Whether the shape holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }
}

fn checked_product(dims: &[usize]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

fn checked_record_size(fields: &[RawField]) -> Option<usize> {
    fields
        .iter()
        .try_fold(0usize, |acc, f| acc.checked_add(f.dtype.byte_size()?))
}

enum Storage {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Storage {
    fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Mapped(m) => m,
            Self::Owned(v) => v,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Mapped(_) => "mmap",
            Self::Owned(_) => "buffer",
        }
    }
}

/// A loaded structured array: header plus the bytes backing it.
///
/// The backing storage is released when the handle is dropped.
pub struct ArrayHandle {
    path: PathBuf,
    header: NpyHeader,
    /// Validated `header.len()`.
    rows: usize,
    /// Validated `header.itemsize()`.
    itemsize: usize,
    storage: Storage,
}

impl ArrayHandle {
    /// Path the array was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The decoded header.
    pub fn header(&self) -> &NpyHeader {
        &self.header
    }

    /// Array dimensions in declaration order.
    pub fn shape(&self) -> &[usize] {
        &self.header.shape
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.header.shape.len()
    }

    /// Total number of records across all dimensions.
    pub fn len(&self) -> usize {
        self.rows
    }

    /// Whether the array holds no records.
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Raw descriptor entries, padding included.
    pub fn fields(&self) -> &[RawField] {
        &self.header.fields
    }

    /// Bytes per record.
    pub fn itemsize(&self) -> usize {
        self.itemsize
    }

    /// Whether the storage is a memory map.
    pub fn is_mapped(&self) -> bool {
        matches!(self.storage, Storage::Mapped(_))
    }

    /// The array payload: `len() * itemsize()` bytes.
    pub fn payload(&self) -> &[u8] {
        let start = self.header.data_offset;
        let end = start + self.rows * self.itemsize;
        &self.storage.as_bytes()[start..end]
    }
}

impl std::fmt::Debug for ArrayHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayHandle")
            .field("path", &self.path)
            .field("header", &self.header)
            .field("storage", &self.storage.kind())
            .finish()
    }
}

/// Loads `.npy` files according to a [`LoaderConfig`].
#[derive(Clone, Debug, Default)]
pub struct FormatLoader {
    config: LoaderConfig,
}

impl FormatLoader {
    /// A loader using `config`.
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    /// The loader's configuration.
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Load the structured array stored at `path`.
    ///
    /// # Errors
    /// Returns a format error if the file cannot be read, is not a valid
    /// `.npy` file, does not hold a structured array, or is truncated.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<ArrayHandle> {
        let path = path.as_ref();
        let io_err = |source| NpyError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).map_err(io_err)?;
        let mut head = Vec::with_capacity(8);
        file.by_ref().take(8).read_to_end(&mut head).map_err(io_err)?;
        file.seek(SeekFrom::Start(0)).map_err(io_err)?;

        let codec = if self.config.decompress {
            detect_codec(path, &head)
        } else {
            None
        };
        let storage = match codec {
            Some(codec) => {
                debug!(path = %path.display(), codec = codec.name(), "decompressing .npy input");
                let bytes = decompress_all(codec.as_ref(), BufReader::new(file))
                    .map_err(|e| NpyError::format(path, format!("{e:#}")))?;
                Storage::Owned(bytes)
            }
            None if self.config.mmap => {
                // SAFETY: the map is read-only and owned by the handle; the file
                // is not written through this process while it is mapped.
                let map = unsafe { Mmap::map(&file) }.map_err(io_err)?;
                Storage::Mapped(map)
            }
            None => {
                let mut bytes = Vec::new();
                file.read_to_end(&mut bytes).map_err(io_err)?;
                Storage::Owned(bytes)
            }
        };

        let header = parse_header(path, storage.as_bytes(), self.config.max_header_len)?;
        let overflow = || NpyError::format(path, "array size overflows");
        let rows = header.len().ok_or_else(overflow)?;
        let itemsize = header.itemsize().ok_or_else(overflow)?;
        let needed = rows
            .checked_mul(itemsize)
            .and_then(|n| n.checked_add(header.data_offset))
            .ok_or_else(overflow)?;
        let available = storage.as_bytes().len();
        if available < needed {
            return Err(NpyError::format(
                path,
                format!("payload truncated: need {needed} bytes, file has {available}"),
            ));
        }

        debug!(
            path = %path.display(),
            storage = storage.kind(),
            version = ?header.version,
            shape = ?header.shape,
            fields = header.fields.len(),
            itemsize,
            "loaded .npy array"
        );
        Ok(ArrayHandle {
            path: path.to_path_buf(),
            header,
            rows,
            itemsize,
            storage,
        })
    }
}

/// Parse the preamble and header dict at the start of `bytes`.
pub fn parse_header(path: &Path, bytes: &[u8], max_header_len: usize) -> Result<NpyHeader> {
    let bad = |reason: String| NpyError::format(path, reason);

    if bytes.len() < 10 || &bytes[..6] != NPY_MAGIC {
        return Err(bad("missing \\x93NUMPY magic".into()));
    }
    let version = (bytes[6], bytes[7]);
    let (len, start) = match version.0 {
        1 => (usize::from(u16::from_le_bytes([bytes[8], bytes[9]])), 10),
        2 | 3 => {
            let raw = bytes
                .get(8..12)
                .ok_or_else(|| bad("header length truncated".into()))?;
            let len = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
            (len as usize, 12)
        }
        major => return Err(bad(format!("unsupported format version {major}.{}", version.1))),
    };
    if len > max_header_len {
        return Err(bad(format!(
            "header is {len} bytes, limit is {max_header_len}"
        )));
    }
    let raw = bytes
        .get(start..start + len)
        .ok_or_else(|| bad("header truncated".into()))?;
    let text = if version.0 >= 3 {
        std::str::from_utf8(raw).map_err(|e| bad(format!("header is not UTF-8: {e}")))?
    } else {
        if !raw.is_ascii() {
            return Err(bad("header is not ASCII".into()));
        }
        std::str::from_utf8(raw).map_err(|e| bad(format!("header is not ASCII: {e}")))?
    };

    let dict = text
        .trim()
        .parse::<PyValue>()
        .map_err(|e| bad(format!("header is not a Python literal: {e:?}")))?;
    let entries = match dict {
        PyValue::Dict(entries) => entries,
        other => return Err(bad(format!("header is not a dict: {other:?}"))),
    };
    let lookup = |key: &str| {
        entries
            .iter()
            .find(|(k, _)| matches!(k, PyValue::String(s) if s == key))
            .map(|(_, v)| v)
            .ok_or_else(|| bad(format!("header is missing '{key}'")))
    };

    let fields = match lookup("descr")? {
        PyValue::List(items) => parse_fields(items).map_err(bad)?,
        PyValue::String(s) => {
            return Err(bad(format!(
                "object is not a structured array (dtype '{s}')"
            )));
        }
        other => return Err(bad(format!("unrecognised descr {other:?}"))),
    };
    let fortran_order = match lookup("fortran_order")? {
        PyValue::Boolean(b) => *b,
        other => return Err(bad(format!("fortran_order is not a bool: {other:?}"))),
    };
    let shape = match lookup("shape")? {
        PyValue::Tuple(dims) | PyValue::List(dims) => parse_dims(dims).map_err(bad)?,
        other => return Err(bad(format!("shape is not a tuple: {other:?}"))),
    };

    Ok(NpyHeader {
        version,
        fields,
        fortran_order,
        shape,
        data_offset: start + len,
    })
}

fn parse_dims(dims: &[PyValue]) -> std::result::Result<Vec<usize>, String> {
    dims.iter()
        .map(|d| match d {
            PyValue::Integer(n) => n
                .to_usize()
                .ok_or_else(|| format!("dimension {n} out of range")),
            other => Err(format!("dimension is not an integer: {other:?}")),
        })
        .collect()
}

fn parse_fields(items: &[PyValue]) -> std::result::Result<Vec<RawField>, String> {
    items.iter().map(parse_field).collect()
}

fn parse_field(item: &PyValue) -> std::result::Result<RawField, String> {
    let parts = match item {
        PyValue::Tuple(parts) | PyValue::List(parts) if (2..=3).contains(&parts.len()) => parts,
        other => return Err(format!("descr entry is not a (name, type) tuple: {other:?}")),
    };
    let name = match &parts[0] {
        PyValue::String(name) => name.clone(),
        // (title, name)
        PyValue::Tuple(pair) if pair.len() == 2 => match &pair[1] {
            PyValue::String(name) => name.clone(),
            other => return Err(format!("field name is not a string: {other:?}")),
        },
        other => return Err(format!("field name is not a string: {other:?}")),
    };
    let dtype = match (&parts[1], parts.get(2)) {
        (PyValue::String(t), None) => RawDtype::Scalar(parse_typestr(&name, t)?),
        (PyValue::String(t), Some(PyValue::Tuple(dims) | PyValue::List(dims))) => {
            RawDtype::Subarray {
                elem: parse_typestr(&name, t)?,
                shape: parse_dims(dims)?,
            }
        }
        (PyValue::String(t), Some(PyValue::Integer(n))) => RawDtype::Subarray {
            elem: parse_typestr(&name, t)?,
            shape: vec![n
                .to_usize()
                .ok_or_else(|| format!("field '{name}': bad sub-array length {n}"))?],
        },
        (PyValue::List(nested), None) => RawDtype::Record(parse_fields(nested)?),
        (other, _) => return Err(format!("field '{name}': unrecognised type {other:?}")),
    };
    Ok(RawField { name, dtype })
}

fn parse_typestr(name: &str, s: &str) -> std::result::Result<TypeStr, String> {
    TypeStr::parse(s).ok_or_else(|| format!("field '{name}': malformed typestr '{s}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typestr_parses_order_kind_and_size() {
        let t = TypeStr::parse("<f8").unwrap();
        assert_eq!((t.order, t.kind, t.size), (ByteOrder::Little, 'f', 8));
        let t = TypeStr::parse(">u2").unwrap();
        assert_eq!((t.order, t.kind, t.size), (ByteOrder::Big, 'u', 2));
        let t = TypeStr::parse("|u1").unwrap();
        assert_eq!(t.order, ByteOrder::NotApplicable);
        assert_eq!(TypeStr::parse("<U3").unwrap().size, 12);
        assert_eq!(TypeStr::parse("<M8[ns]").unwrap().size, 8);
        assert!(TypeStr::parse("<").is_none());
        assert!(TypeStr::parse("<f").is_none());
    }

    #[test]
    fn typestr_rejects_trailing_text() {
        assert!(TypeStr::parse("<f8garbage").is_none());
        assert!(TypeStr::parse("<i4]").is_none());
        assert!(TypeStr::parse("<f8[ns]").is_none());
        assert!(TypeStr::parse("<M8[]").is_none());
        assert!(TypeStr::parse("<m8[us]").is_some());
        assert!(TypeStr::parse("|O").is_some());
    }

    #[test]
    fn padding_entries_are_recognised() {
        let pad = RawField {
            name: String::new(),
            dtype: RawDtype::Scalar(TypeStr::parse("|V4").unwrap()),
        };
        assert!(pad.is_padding());
        assert_eq!(pad.dtype.byte_size(), Some(4));
    }

    #[test]
    fn header_rejects_plain_dtype() {
        let dict = "{'descr': '<f8', 'fortran_order': False, 'shape': (3,), }";
        let mut bytes = NPY_MAGIC.to_vec();
        bytes.extend_from_slice(&[1, 0]);
        bytes.extend_from_slice(&(dict.len() as u16).to_le_bytes());
        bytes.extend_from_slice(dict.as_bytes());
        let err = parse_header(Path::new("plain.npy"), &bytes, 1024).unwrap_err();
        assert!(err.to_string().contains("not a structured array"));
    }

    #[test]
    fn header_parses_structured_descr() {
        let dict = "{'descr': [('X', '<f8'), (('t', 'Y'), '>i4'), ('V', '<f4', (3,))], \
                    'fortran_order': False, 'shape': (5,), }";
        let mut bytes = NPY_MAGIC.to_vec();
        bytes.extend_from_slice(&[2, 0]);
        bytes.extend_from_slice(&(dict.len() as u32).to_le_bytes());
        bytes.extend_from_slice(dict.as_bytes());
        let header = parse_header(Path::new("s.npy"), &bytes, 1024).unwrap();
        assert_eq!(header.version, (2, 0));
        assert_eq!(header.shape, vec![5]);
        assert_eq!(header.fields[1].name, "Y");
        assert_eq!(header.itemsize(), Some(8 + 4 + 12));
        assert_eq!(header.data_offset, 12 + dict.len());
    }
}
