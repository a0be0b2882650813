//! Dimension registry: canonical field identifiers for point attributes.
//!
//! The reader never decides on its own what a field is called. It asks a
//! [`DimensionRegistry`] whether a (sanitized) name is a known dimension and
//! then registers every field it will produce. [`PointLayout`] is the bundled
//! implementation; a host pipeline can provide its own.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::type_token::TypeTag;

/// Identifier of a point dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldId {
    /// An id from the registry's canonical table.
    Known(u16),
    /// An id minted for a name the registry did not know.
    Dynamic(u16),
}

impl FieldId {
    /// Whether the id was minted for an unknown name.
    pub fn is_dynamic(self) -> bool {
        matches!(self, Self::Dynamic(_))
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(id) => write!(f, "known#{id}"),
            Self::Dynamic(id) => write!(f, "dynamic#{id}"),
        }
    }
}

/// The registry contract consumed by schema resolution.
pub trait DimensionRegistry {
    /// Look up `name` in the canonical table. `None` means unknown.
    fn resolve(&self, name: &str) -> Option<FieldId>;

    /// Canonical spelling of a known id.
    fn name(&self, id: FieldId) -> Option<&str>;

    /// Register `name` with storage type `tag` and return its id.
    ///
    /// Registering a name again with the same type returns the same id. What
    /// happens on a type conflict is up to the implementation. Returns `None`
    /// when no id is left for a new name; ids are never reused.
    fn register_or_assign(&mut self, name: &str, tag: TypeTag) -> Option<FieldId>;
}

/// Common point-cloud dimensions, in canonical id order.
pub const STANDARD_DIMENSIONS: &[&str] = &[
    "X",
    "Y",
    "Z",
    "Intensity",
    "Amplitude",
    "Reflectance",
    "ReturnNumber",
    "NumberOfReturns",
    "ScanDirectionFlag",
    "EdgeOfFlightLine",
    "Classification",
    "ScanAngleRank",
    "UserData",
    "PointSourceId",
    "GpsTime",
    "Red",
    "Green",
    "Blue",
    "Infrared",
    "ScanChannel",
    "ClassFlags",
    "Synthetic",
    "KeyPoint",
    "Withheld",
    "Overlap",
    "NormalX",
    "NormalY",
    "NormalZ",
    "Curvature",
    "Density",
    "OffsetTime",
    "Omega",
    "Phi",
    "Kappa",
];

#[derive(Clone, Debug)]
struct Registered {
    name: String,
    tag: TypeTag,
}

/// A table of known dimensions plus the dimensions registered against it.
///
/// ```
/// use npy_points::dimension::{DimensionRegistry, PointLayout};
/// use npy_points::TypeTag;
///
/// let mut layout = PointLayout::standard();
/// let x = layout.resolve("x").unwrap();
/// assert_eq!(layout.register_or_assign("X", TypeTag::F64), Some(x));
/// assert!(layout.resolve("Temperature").is_none());
/// assert!(layout.register_or_assign("Temperature", TypeTag::F32).unwrap().is_dynamic());
/// ```
#[derive(Clone, Debug, Default)]
pub struct PointLayout {
    known: Vec<String>,
    by_upper: HashMap<String, u16>,
    dynamic: Vec<String>,
    dynamic_by_name: HashMap<String, u16>,
    registered: HashMap<FieldId, Registered>,
    order: Vec<FieldId>,
}

impl PointLayout {
    /// A layout whose canonical table is [`STANDARD_DIMENSIONS`].
    pub fn standard() -> Self {
        Self::with_dimensions(STANDARD_DIMENSIONS.iter().copied())
    }

    /// A layout whose canonical table is exactly `names`, in id order.
    ///
    /// Later duplicates (compared case-insensitively) are ignored, as is
    /// anything past the 65,536th distinct name.
    pub fn with_dimensions<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut layout = Self::default();
        for name in names {
            let name = name.into();
            let upper = name.to_ascii_uppercase();
            if layout.by_upper.contains_key(&upper) {
                continue;
            }
            let Ok(id) = u16::try_from(layout.known.len()) else {
                warn!(dimension = %name, "canonical table is full, ignoring dimension");
                continue;
            };
            layout.by_upper.insert(upper, id);
            layout.known.push(name);
        }
        layout
    }

    /// Registered type of `id`, if it has been registered.
    pub fn type_of(&self, id: FieldId) -> Option<TypeTag> {
        self.registered.get(&id).map(|r| r.tag)
    }

    /// Registered dimensions as `(name, type)` pairs, in registration order.
    pub fn dimensions(&self) -> Vec<(String, TypeTag)> {
        self.order
            .iter()
            .filter_map(|id| self.registered.get(id))
            .map(|r| (r.name.clone(), r.tag))
            .collect()
    }

    /// Whether any dimension has been registered.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn assign_dynamic(&mut self, name: &str) -> Option<FieldId> {
        if let Some(&id) = self.dynamic_by_name.get(name) {
            return Some(FieldId::Dynamic(id));
        }
        let id = u16::try_from(self.dynamic.len()).ok()?;
        self.dynamic.push(name.to_string());
        self.dynamic_by_name.insert(name.to_string(), id);
        Some(FieldId::Dynamic(id))
    }
}

impl DimensionRegistry for PointLayout {
    fn resolve(&self, name: &str) -> Option<FieldId> {
        self.by_upper
            .get(&name.to_ascii_uppercase())
            .map(|&id| FieldId::Known(id))
    }

    fn name(&self, id: FieldId) -> Option<&str> {
        match id {
            FieldId::Known(i) => self.known.get(usize::from(i)).map(String::as_str),
            FieldId::Dynamic(i) => self.dynamic.get(usize::from(i)).map(String::as_str),
        }
    }

    fn register_or_assign(&mut self, name: &str, tag: TypeTag) -> Option<FieldId> {
        let id = match self.resolve(name) {
            Some(id) => id,
            None => {
                let Some(id) = self.assign_dynamic(name) else {
                    warn!(dimension = %name, "no dynamic dimension ids left");
                    return None;
                };
                id
            }
        };
        match self.registered.get_mut(&id) {
            Some(existing) if existing.tag != tag => {
                let widened = existing.tag.widen(tag);
                warn!(
                    dimension = %existing.name,
                    registered = %existing.tag,
                    requested = %tag,
                    using = %widened,
                    "conflicting dimension type"
                );
                existing.tag = widened;
            }
            Some(_) => {}
            None => {
                let canonical = self.name(id).unwrap_or(name).to_string();
                self.registered.insert(id, Registered { name: canonical, tag });
                self.order.push(id);
            }
        }
        Some(id)
    }
}
