//! # npy-points
//!
//! Stream the records of a NumPy `.npy` **structured array** as typed points.
//!
//! A structured array stores fixed-layout records with named, primitively
//! typed columns. This crate maps such a file onto the fixed vocabulary of a
//! point-processing pipeline and hands records out one at a time, without
//! copying the dataset.
//!
//! ## Key Features
//!
//! - **Schema discovery** - field names and types come straight from the file's descriptor
//! - **Name sanitization** - `X-Coord`, `Y Coord` and `Z_Coord` resolve to registered dimensions
//! - **Strict typing** - every field maps to one [`TypeTag`]; anything else is rejected up front
//! - **Zero-copy streaming** - memory-mapped storage walked block by block with explicit strides
//! - **Any byte order** - big-endian files decode like little-endian ones
//! - **Compressed inputs** - `.npy.gz` and `.npy.zst` via feature flags
//!
//! ## Quick Start
//!
//! ```no_run
//! use npy_points::*;
//!
//! # fn main() -> npy_points::Result<()> {
//! let mut layout = PointLayout::standard();
//! let mut reader = stage::create(ReaderOptions::new("points.npy"));
//!
//! let schema = reader.load(&mut layout)?;
//! for field in schema.fields() {
//!     println!("{} -> {} ({})", field.raw_name, field.canonical_name, field.type_tag);
//! }
//!
//! let mut view = PointView::new();
//! let n = reader.read(&mut view, 1000)?;
//! println!("read {n} of {} points", reader.total_count()?);
//! reader.close();
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Loading
//!
//! [`FormatLoader`] parses the header and keeps the payload in a memory map
//! (or an owned buffer for compressed files) behind an [`ArrayHandle`].
//!
//! ### Schema
//!
//! [`SchemaResolver`] turns the descriptor into an ordered [`Schema`] of
//! [`FieldDescriptor`]s, consulting a [`DimensionRegistry`] for canonical ids.
//! Only one-dimensional arrays with at least one row and at least one named
//! numeric field are accepted.
//!
//! ### Streaming
//!
//! [`StridedIterator`] owns the array and exposes it block by block. The
//! [`NpyReader`] walks it one field at a time and writes each field into a
//! [`PointSink`].
//!
//! ## Feature Flags
//!
//! - `compression-gzip` - read `.npy.gz` inputs
//! - `compression-zstd` - read `.npy.zst` inputs
//!
//! ## Module Overview
//!
//! - [`io`] - `.npy` parsing and compression
//! - [`schema`] - schema discovery and name resolution
//! - [`stride`] - block-wise strided iteration
//! - [`reader`] - the pull-based reader and point sinks
//! - [`dimension`] - the dimension registry
//! - [`stage`] - reader description and factory
//! - [`config`] - loader and reader options
//! - [`testing`] - fixtures for tests

pub mod config;
pub mod dimension;
pub mod error;
pub mod io;
pub mod reader;
pub mod schema;
pub mod stage;
pub mod stride;
pub mod testing;
pub mod type_token;

// General re-exports
pub use config::{LoaderConfig, ReaderOptions};
pub use dimension::{DimensionRegistry, FieldId, PointLayout};
pub use error::{ErrorKind, NpyError, Result};
pub use io::npy::{ArrayHandle, FormatLoader};
pub use reader::{NpyReader, PointRecord, PointSink, PointView, ReaderState};
pub use schema::{FieldDescriptor, Schema, SchemaResolver};
pub use stride::{IterationCursor, StridedIterator};
pub use type_token::{ByteOrder, TypeTag, Value};
