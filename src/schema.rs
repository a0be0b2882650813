//! Schema discovery: from a structured descriptor to ordered point fields.
//!
//! [`SchemaResolver::resolve`] walks the descriptor in declaration order,
//! resolves each raw field name against a [`DimensionRegistry`] and maps each
//! storage type to a [`TypeTag`]. The result is an immutable [`Schema`].
//!
//! # Name resolution
//! Field names in `.npy` files are loosely spelled (`X-Coord`, `Y Coord`,
//! `Z_Coord`). Each raw name is tried against the registry as:
//! 1. the name with every `-` removed,
//! 2. the name with every space removed,
//! 3. the name with every `_` removed,
//! 4. the raw name verbatim.
//!
//! The first candidate the registry knows wins. A name that matches nothing
//! becomes a dynamic dimension under its raw spelling.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::dimension::{DimensionRegistry, FieldId};
use crate::error::{NpyError, Result};
use crate::io::npy::{ArrayHandle, RawDtype};
use crate::type_token::{ByteOrder, TypeTag};

/// One resolved point field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldDescriptor {
    /// Name as declared in the file.
    pub raw_name: String,
    /// Name the field is registered under.
    pub canonical_name: String,
    pub id: FieldId,
    pub type_tag: TypeTag,
    pub byte_order: ByteOrder,
    /// Byte offset of the field within a record.
    pub offset: usize,
    pub element_size: usize,
    /// Position among the named fields of the descriptor.
    pub declared_index: usize,
}

/// The ordered, immutable field schema of one array.
#[derive(Clone, Debug, Serialize)]
pub struct Schema {
    path: PathBuf,
    fields: Vec<FieldDescriptor>,
    num_points: usize,
    record_size: usize,
}

impl Schema {
    /// Fields in record order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Always `false`; resolution rejects empty schemas.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of records in the array.
    pub fn num_points(&self) -> usize {
        self.num_points
    }

    /// Bytes per record, padding included.
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Path of the array this schema was resolved from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Find a field by canonical name.
    pub fn field(&self, canonical_name: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|f| f.canonical_name == canonical_name)
    }

    /// `(canonical name, type)` pairs in record order, for layout registration.
    pub fn dimensions(&self) -> Vec<(String, TypeTag)> {
        self.fields
            .iter()
            .map(|f| (f.canonical_name.clone(), f.type_tag))
            .collect()
    }
}

/// Outcome of name sanitization for one raw field name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NameResolution {
    /// A known id and its canonical spelling.
    Known(FieldId, String),
    /// Not known; register under this name.
    Dynamic(String),
}

impl NameResolution {
    /// The name the field will be registered under.
    pub fn name(&self) -> &str {
        match self {
            Self::Known(_, name) | Self::Dynamic(name) => name,
        }
    }
}

/// Candidate spellings of `raw`, in fallback priority order.
pub fn name_candidates(raw: &str) -> [String; 4] {
    [
        raw.replace('-', ""),
        raw.replace(' ', ""),
        raw.replace('_', ""),
        raw.to_string(),
    ]
}

/// Resolve one raw field name against `registry`.
pub fn resolve_name(registry: &dyn DimensionRegistry, raw: &str) -> NameResolution {
    for candidate in name_candidates(raw) {
        if let Some(id) = registry.resolve(&candidate) {
            let canonical = registry.name(id).unwrap_or(&candidate).to_string();
            return NameResolution::Known(id, canonical);
        }
    }
    NameResolution::Dynamic(raw.to_string())
}

struct Pending {
    raw_name: String,
    resolution: NameResolution,
    type_tag: TypeTag,
    byte_order: ByteOrder,
    offset: usize,
    element_size: usize,
    typestr: String,
}

/// Builds a [`Schema`] from a loaded array.
pub struct SchemaResolver;

impl SchemaResolver {
    /// Resolve the schema of `array`, registering its fields with `registry`.
    ///
    /// Nothing is registered unless every field resolves. A registry that
    /// runs out of ids mid-way keeps the fields registered before it ran out.
    ///
    /// # Errors
    /// Returns a schema error when the array is not rank 1, has no rows, has
    /// no named fields, has a nested or unsupported field type, maps two
    /// fields to the same dimension, or the registry cannot assign an id.
    pub fn resolve(array: &ArrayHandle, registry: &mut dyn DimensionRegistry) -> Result<Schema> {
        let path = array.path();
        if array.rank() != 1 {
            return Err(NpyError::schema(
                path,
                format!(
                    "array has rank {} (shape {:?}); expected a one-dimensional array",
                    array.rank(),
                    array.shape()
                ),
            ));
        }
        let num_points = array.shape()[0];
        if num_points == 0 {
            return Err(NpyError::schema(path, "array has no rows"));
        }

        let mut pending = Vec::new();
        let mut offset = 0usize;
        for raw in array.fields() {
            let size = raw
                .dtype
                .byte_size()
                .ok_or_else(|| NpyError::field(path, &raw.name, "field size overflows"))?;
            if raw.is_padding() {
                offset += size;
                continue;
            }
            let elem = match &raw.dtype {
                RawDtype::Scalar(t) => t,
                other => {
                    return Err(NpyError::field(
                        path,
                        &raw.name,
                        format!("nested field type '{}' is not supported", other.describe()),
                    ));
                }
            };
            let type_tag = TypeTag::from_kind(elem.kind, elem.size).ok_or_else(|| {
                NpyError::field(
                    path,
                    &raw.name,
                    format!(
                        "unsupported type '{}' (kind '{}', {} bytes)",
                        elem.as_str(),
                        elem.kind,
                        elem.size
                    ),
                )
            })?;
            pending.push(Pending {
                raw_name: raw.name.clone(),
                resolution: resolve_name(registry, &raw.name),
                type_tag,
                byte_order: elem.order,
                offset,
                element_size: elem.size,
                typestr: elem.as_str().to_string(),
            });
            offset += size;
        }
        if pending.is_empty() {
            return Err(NpyError::schema(path, "array descriptor has no named fields"));
        }

        let mut claimed: HashMap<String, &str> = HashMap::new();
        for p in &pending {
            let key = match &p.resolution {
                NameResolution::Known(id, _) => id.to_string(),
                NameResolution::Dynamic(name) => format!("dynamic:{name}"),
            };
            if let Some(previous) = claimed.insert(key, &p.raw_name) {
                return Err(NpyError::field(
                    path,
                    &p.raw_name,
                    format!(
                        "resolves to dimension '{}', already claimed by field '{previous}'",
                        p.resolution.name()
                    ),
                ));
            }
        }

        let fields = pending
            .into_iter()
            .enumerate()
            .map(|(declared_index, p)| -> Result<FieldDescriptor> {
                let canonical_name = p.resolution.name().to_string();
                let id = registry
                    .register_or_assign(&canonical_name, p.type_tag)
                    .ok_or_else(|| {
                        NpyError::field(
                            path,
                            &p.raw_name,
                            format!("registry has no id left for dimension '{canonical_name}'"),
                        )
                    })?;
                debug!(
                    raw = %p.raw_name,
                    dimension = %canonical_name,
                    %id,
                    typestr = %p.typestr,
                    elsize = p.element_size,
                    interpretation = %p.type_tag,
                    "resolved field"
                );
                Ok(FieldDescriptor {
                    raw_name: p.raw_name,
                    canonical_name,
                    id,
                    type_tag: p.type_tag,
                    byte_order: p.byte_order,
                    offset: p.offset,
                    element_size: p.element_size,
                    declared_index,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Schema {
            path: path.to_path_buf(),
            fields,
            num_points,
            record_size: array.itemsize(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::PointLayout;

    #[test]
    fn candidates_follow_fallback_order() {
        assert_eq!(
            name_candidates("a-b c_d"),
            [
                "ab c_d".to_string(),
                "a-bc_d".to_string(),
                "a-b cd".to_string(),
                "a-b c_d".to_string()
            ]
        );
    }

    #[test]
    fn dash_removal_wins_over_space_removal() {
        let layout = PointLayout::with_dimensions(["AB C", "A-BC"]);
        let resolved = resolve_name(&layout, "A-B C");
        assert_eq!(resolved, NameResolution::Known(FieldId::Known(0), "AB C".into()));
    }

    #[test]
    fn unknown_names_stay_verbatim() {
        let layout = PointLayout::with_dimensions(["X"]);
        assert_eq!(
            resolve_name(&layout, "Return Number"),
            NameResolution::Dynamic("Return Number".into())
        );
    }
}
