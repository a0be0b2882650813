//! Block-wise strided traversal of array storage.
//!
//! [`StridedIterator`] takes ownership of an [`ArrayHandle`] and walks its
//! payload one block of rows at a time. Inside a block every field of every
//! row is reached through the block base, the record stride and the field's
//! offset, so nothing is copied.
//!
//! The consumer drives it field by field: read [`field`](StridedIterator::field),
//! then [`advance`](StridedIterator::advance), once per field of a row, in
//! schema order. After the last field of a row the cursor moves to the next
//! row; after the last row of a block the next block is loaded.
//!
//! Because the iterator owns the array, the storage is released exactly once,
//! when the iterator is dropped, and no view can outlive it.

use serde::Serialize;
use tracing::{debug, trace};

use crate::error::{NpyError, Result};
use crate::io::npy::ArrayHandle;
use crate::schema::Schema;
use crate::type_token::ByteOrder;

/// Position of the iterator within the payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IterationCursor {
    /// Row the next field read belongs to.
    pub current_index: usize,
    /// Byte offset of the current block within the payload.
    pub block_base: usize,
    /// Bytes between consecutive rows.
    pub stride_bytes: usize,
    /// Rows of the current block not yet fully consumed, the current row included.
    pub block_remaining: usize,
}

/// A view over one block of rows.
#[derive(Clone, Copy, Debug)]
pub struct Block<'a> {
    /// Block bytes, starting at the first row of the block.
    pub base: &'a [u8],
    pub stride: usize,
    /// Rows covered by this block.
    pub count: usize,
}

impl<'a> Block<'a> {
    /// Bytes of `row` (relative to the block) at `offset..offset + size`.
    pub fn window(&self, row: usize, offset: usize, size: usize) -> Option<&'a [u8]> {
        if row >= self.count {
            return None;
        }
        let start = row * self.stride + offset;
        self.base.get(start..start + size)
    }
}

/// The bytes of one field of the current row.
#[derive(Clone, Copy, Debug)]
pub struct FieldWindow<'a> {
    pub bytes: &'a [u8],
    /// Whether the stored byte order differs from the native one.
    pub swap: bool,
}

#[derive(Clone, Copy, Debug)]
struct Slot {
    offset: usize,
    size: usize,
    swap: bool,
}

/// Owning, block-wise iterator over the fields of a structured array.
pub struct StridedIterator {
    array: ArrayHandle,
    slots: Vec<Slot>,
    rows: usize,
    block_rows: usize,
    cursor: IterationCursor,
    /// Field of the current row the next read returns.
    field: usize,
}

impl StridedIterator {
    /// Build an iterator over `array` for the fields in `schema`.
    ///
    /// # Errors
    /// Returns an iterator error if `block_rows` is zero, the record stride
    /// is zero, or the schema does not describe this array.
    pub fn new(array: ArrayHandle, schema: &Schema, block_rows: usize) -> Result<Self> {
        let path = array.path().to_path_buf();
        if block_rows == 0 {
            return Err(NpyError::iterator(path, "block size must be at least one row"));
        }
        let stride = array.itemsize();
        if stride == 0 {
            return Err(NpyError::iterator(path, "records are zero bytes wide"));
        }
        let rows_in_array = array.shape().first().copied().unwrap_or(0);
        if stride != schema.record_size() || schema.num_points() != rows_in_array {
            return Err(NpyError::iterator(path, "schema was resolved against a different array"));
        }
        let slots = schema
            .fields()
            .iter()
            .map(|f| {
                if f.offset + f.element_size > stride {
                    return Err(NpyError::iterator(
                        &path,
                        format!(
                            "field '{}' at offset {} does not fit in a {stride}-byte record",
                            f.raw_name, f.offset
                        ),
                    ));
                }
                Ok(Slot {
                    offset: f.offset,
                    size: f.element_size,
                    swap: f.byte_order.needs_swap(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        if slots.is_empty() {
            return Err(NpyError::iterator(path, "schema has no fields"));
        }

        let rows = schema.num_points();
        let cursor = IterationCursor {
            current_index: 0,
            block_base: 0,
            stride_bytes: stride,
            block_remaining: rows.min(block_rows),
        };
        debug!(
            path = %path.display(),
            rows,
            stride,
            block_rows,
            fields = slots.len(),
            native_order = ?ByteOrder::native(),
            "created strided iterator"
        );
        Ok(Self {
            array,
            slots,
            rows,
            block_rows,
            cursor,
            field: 0,
        })
    }

    /// Current position.
    pub fn cursor(&self) -> &IterationCursor {
        &self.cursor
    }

    /// Total number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Whether every row has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.cursor.current_index >= self.rows
    }

    /// The array this iterator walks.
    pub fn array(&self) -> &ArrayHandle {
        &self.array
    }

    /// The current block, or `None` at end-of-data.
    pub fn block(&self) -> Option<Block<'_>> {
        if self.is_exhausted() {
            return None;
        }
        let rows_in_block = self.block_rows.min(self.rows - self.block_first_row());
        let len = rows_in_block * self.cursor.stride_bytes;
        let base = self
            .array
            .payload()
            .get(self.cursor.block_base..self.cursor.block_base + len)?;
        Some(Block {
            base,
            stride: self.cursor.stride_bytes,
            count: rows_in_block,
        })
    }

    /// Bytes of the current field of the current row.
    pub fn field(&self) -> Option<FieldWindow<'_>> {
        let slot = self.slots.get(self.field)?;
        let block = self.block()?;
        let row = self.cursor.current_index - self.block_first_row();
        let bytes = block.window(row, slot.offset, slot.size)?;
        Some(FieldWindow {
            bytes,
            swap: slot.swap,
        })
    }

    /// Step to the next field, wrapping to the next row and block as needed.
    ///
    /// Returns `false` once the last field of the last row has been passed.
    pub fn advance(&mut self) -> bool {
        if self.is_exhausted() {
            return false;
        }
        self.field += 1;
        if self.field < self.slots.len() {
            return true;
        }
        self.field = 0;
        self.cursor.current_index += 1;
        self.cursor.block_remaining -= 1;
        if self.cursor.block_remaining == 0 {
            self.next_block();
        }
        !self.is_exhausted()
    }

    fn block_first_row(&self) -> usize {
        self.cursor.block_base / self.cursor.stride_bytes
    }

    fn next_block(&mut self) {
        let first = self.cursor.current_index;
        self.cursor.block_base = first * self.cursor.stride_bytes;
        self.cursor.block_remaining = self.block_rows.min(self.rows.saturating_sub(first));
        trace!(
            first_row = first,
            rows = self.cursor.block_remaining,
            "loaded block"
        );
    }
}

impl std::fmt::Debug for StridedIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StridedIterator")
            .field("path", &self.array.path())
            .field("rows", &self.rows)
            .field("block_rows", &self.block_rows)
            .field("cursor", &self.cursor)
            .field("field", &self.field)
            .finish()
    }
}
