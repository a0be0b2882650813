//! The pull-based point reader.
//!
//! [`NpyReader`] drives a session through
//! `Unopened -> SchemaReady -> Streaming -> Done`:
//!
//! - [`load`](NpyReader::load) reads the file and resolves its schema against a
//!   [`DimensionRegistry`],
//! - [`ready`](NpyReader::ready) builds the [`StridedIterator`],
//! - [`next_record`](NpyReader::next_record) hands one row at a time to a
//!   [`PointSink`],
//! - [`close`](NpyReader::close) releases everything and may be called at any time.
//!
//! ```no_run
//! use npy_points::{NpyReader, PointLayout, PointRecord, ReaderOptions};
//!
//! # fn main() -> npy_points::Result<()> {
//! let mut layout = PointLayout::standard();
//! let mut reader = NpyReader::new(ReaderOptions::new("points.npy"));
//! reader.load(&mut layout)?;
//! println!("{} points", reader.total_count()?);
//!
//! let mut point = PointRecord::default();
//! while reader.next_record(&mut point)? {
//!     // use point
//!     point.clear();
//! }
//! reader.close();
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::config::ReaderOptions;
use crate::dimension::{DimensionRegistry, FieldId};
use crate::error::{NpyError, Result};
use crate::io::npy::{ArrayHandle, FormatLoader};
use crate::schema::{Schema, SchemaResolver};
use crate::stride::StridedIterator;
use crate::type_token::{TypeTag, Value};

/// Receives the fields of one record.
pub trait PointSink {
    /// Store one field. `bytes` is native-endian and `tag.size()` long.
    fn set_field(&mut self, id: FieldId, tag: TypeTag, bytes: &[u8]);
}

/// A single decoded record.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PointRecord {
    values: Vec<(FieldId, Value)>,
}

impl PointRecord {
    /// Value of field `id`, if the record has it.
    pub fn get(&self, id: FieldId) -> Option<Value> {
        self.values
            .iter()
            .find(|(field, _)| *field == id)
            .map(|(_, v)| *v)
    }

    /// Value of field `id` as `f64`.
    pub fn get_f64(&self, id: FieldId) -> Option<f64> {
        self.get(id).map(Value::as_f64)
    }

    /// Fields in the order they were set.
    pub fn values(&self) -> &[(FieldId, Value)] {
        &self.values
    }

    /// Number of fields set.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no field has been set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Forget all fields, keeping the allocation.
    pub fn clear(&mut self) {
        self.values.clear();
    }
}

impl PointSink for PointRecord {
    fn set_field(&mut self, id: FieldId, tag: TypeTag, bytes: &[u8]) {
        let Some(value) = tag.decode(bytes) else {
            return;
        };
        match self.values.iter_mut().find(|(field, _)| *field == id) {
            Some(slot) => slot.1 = value,
            None => self.values.push((id, value)),
        }
    }
}

/// An ordered collection of records filled by [`NpyReader::read`].
#[derive(Clone, Debug, Default, Serialize)]
pub struct PointView {
    points: Vec<PointRecord>,
}

impl PointView {
    /// An empty view.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the view holds no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Point `index`, if present.
    pub fn point(&self, index: usize) -> Option<&PointRecord> {
        self.points.get(index)
    }

    /// All points in read order.
    pub fn points(&self) -> &[PointRecord] {
        &self.points
    }

    /// Field `id` of point `index` as `f64`.
    pub fn get_f64(&self, index: usize, id: FieldId) -> Option<f64> {
        self.points.get(index)?.get_f64(id)
    }

    /// Every value of field `id` as `f64`, in point order.
    pub fn column_f64(&self, id: FieldId) -> Vec<Option<f64>> {
        self.points.iter().map(|p| p.get_f64(id)).collect()
    }

    /// Append a point.
    pub fn push(&mut self, point: PointRecord) {
        self.points.push(point);
    }
}

/// Lifecycle state of an [`NpyReader`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ReaderState {
    Unopened,
    SchemaReady,
    Streaming,
    Done,
    Closed,
}

impl fmt::Display for ReaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unopened => "unopened",
            Self::SchemaReady => "schema-ready",
            Self::Streaming => "streaming",
            Self::Done => "done",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

enum Session {
    Unopened,
    SchemaReady {
        array: ArrayHandle,
        schema: Schema,
    },
    Streaming {
        iter: StridedIterator,
        schema: Schema,
        index: usize,
    },
    Done {
        schema: Schema,
    },
    Closed,
}

/// Streams the records of a `.npy` structured array.
pub struct NpyReader {
    options: ReaderOptions,
    session: Session,
}

impl NpyReader {
    /// An unopened reader for `options`.
    pub fn new(options: ReaderOptions) -> Self {
        Self {
            options,
            session: Session::Unopened,
        }
    }

    /// The options this reader was built with.
    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    /// Path of the input file.
    pub fn path(&self) -> &Path {
        &self.options.filename
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ReaderState {
        match self.session {
            Session::Unopened => ReaderState::Unopened,
            Session::SchemaReady { .. } => ReaderState::SchemaReady,
            Session::Streaming { .. } => ReaderState::Streaming,
            Session::Done { .. } => ReaderState::Done,
            Session::Closed => ReaderState::Closed,
        }
    }

    /// The resolved schema, once loaded and until closed.
    pub fn schema(&self) -> Option<&Schema> {
        match &self.session {
            Session::SchemaReady { schema, .. }
            | Session::Streaming { schema, .. }
            | Session::Done { schema } => Some(schema),
            Session::Unopened | Session::Closed => None,
        }
    }

    fn misuse(&self, operation: &'static str) -> NpyError {
        NpyError::Use {
            operation,
            state: self.state(),
        }
    }

    /// Load the file and resolve its schema, registering fields with `registry`.
    ///
    /// # Errors
    /// Format and schema errors from loading and resolution; a use error if
    /// the reader was already loaded or closed. A failed load leaves the
    /// reader unopened.
    pub fn load(&mut self, registry: &mut dyn DimensionRegistry) -> Result<&Schema> {
        if !matches!(self.session, Session::Unopened) {
            return Err(self.misuse("load"));
        }
        let loader = FormatLoader::new(self.options.loader.clone());
        let array = loader.load(&self.options.filename)?;
        let schema = SchemaResolver::resolve(&array, registry)?;
        debug!(
            path = %self.options.filename.display(),
            points = schema.num_points(),
            dimensions = schema.len(),
            "schema ready"
        );
        self.session = Session::SchemaReady { array, schema };
        match &self.session {
            Session::SchemaReady { schema, .. } => Ok(schema),
            _ => Err(self.misuse("load")),
        }
    }

    /// Build the strided iterator and start streaming.
    ///
    /// # Errors
    /// An iterator error if the iteration handle cannot be built (the session
    /// is then closed); a use error outside the schema-ready state.
    pub fn ready(&mut self) -> Result<()> {
        if !matches!(self.session, Session::SchemaReady { .. }) {
            return Err(self.misuse("ready"));
        }
        let Session::SchemaReady { array, schema } =
            std::mem::replace(&mut self.session, Session::Closed)
        else {
            return Err(self.misuse("ready"));
        };
        let iter = StridedIterator::new(array, &schema, self.options.block_rows)?;
        self.session = Session::Streaming {
            iter,
            schema,
            index: 0,
        };
        Ok(())
    }

    /// Number of records in the array.
    ///
    /// # Errors
    /// A use error before `load` or after `close`.
    pub fn total_count(&self) -> Result<u64> {
        self.schema()
            .map(|s| s.num_points() as u64)
            .ok_or_else(|| self.misuse("total_count"))
    }

    /// Index of the next record to be produced.
    pub fn position(&self) -> usize {
        match &self.session {
            Session::Streaming { index, .. } => *index,
            Session::Done { schema } => schema.num_points(),
            _ => 0,
        }
    }

    /// Hand the next record to `sink`.
    ///
    /// Returns `Ok(false)` once every record has been produced. Calling this
    /// in the schema-ready state starts streaming first.
    ///
    /// # Errors
    /// A use error before `load` or after `close`; an iterator error if the
    /// storage ends before the advertised row count (the session is closed).
    pub fn next_record(&mut self, sink: &mut dyn PointSink) -> Result<bool> {
        match self.state() {
            ReaderState::SchemaReady => self.ready()?,
            ReaderState::Streaming => {}
            ReaderState::Done => return Ok(false),
            ReaderState::Unopened | ReaderState::Closed => return Err(self.misuse("next_record")),
        }
        let Session::Streaming {
            iter,
            schema,
            index,
        } = &mut self.session
        else {
            return Err(self.misuse("next_record"));
        };

        if *index >= schema.num_points() {
            self.finish();
            return Ok(false);
        }

        let mut scratch = [0u8; 8];
        let mut failure = None;
        for field in schema.fields() {
            let Some(window) = iter.field() else {
                failure = Some(NpyError::iterator(
                    schema.path(),
                    format!("storage ended at row {index}, field '{}'", field.raw_name),
                ));
                break;
            };
            if window.swap {
                let n = window.bytes.len();
                scratch[..n].copy_from_slice(window.bytes);
                scratch[..n].reverse();
                sink.set_field(field.id, field.type_tag, &scratch[..n]);
            } else {
                sink.set_field(field.id, field.type_tag, window.bytes);
            }
            iter.advance();
        }
        if let Some(err) = failure {
            self.close();
            return Err(err);
        }
        *index += 1;
        Ok(true)
    }

    /// Read up to `count` records into `view`, returning how many were read.
    ///
    /// # Errors
    /// Same as [`next_record`](Self::next_record).
    pub fn read(&mut self, view: &mut PointView, count: usize) -> Result<usize> {
        let mut read = 0;
        while read < count {
            let mut point = PointRecord::default();
            if !self.next_record(&mut point)? {
                break;
            }
            view.push(point);
            read += 1;
        }
        Ok(read)
    }

    /// Release the iterator and the array. Safe to call in any state, repeatedly.
    pub fn close(&mut self) {
        if !matches!(self.session, Session::Closed) {
            debug!(
                path = %self.options.filename.display(),
                state = %self.state(),
                "closing reader"
            );
        }
        self.session = Session::Closed;
    }

    fn finish(&mut self) {
        if let Session::Streaming { .. } = self.session
            && let Session::Streaming { schema, .. } =
                std::mem::replace(&mut self.session, Session::Closed)
        {
            self.session = Session::Done { schema };
        }
    }
}

impl fmt::Debug for NpyReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NpyReader")
            .field("path", &self.options.filename)
            .field("state", &self.state())
            .finish()
    }
}
