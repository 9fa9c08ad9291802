//! Capability sets for endpoint and element negotiation.
//!
//! A [`Caps`] value describes what an endpoint or pad can carry: an ordered
//! set of alternative [`CapsStructure`]s, each a media-type name plus field
//! constraints. Ordering matters — earlier structures are preferred, and
//! intersection preserves the first operand's preference order.
//!
//! The constraint model supports intersection (finding common ground),
//! merging (building the union advertised by a whole catalog),
//! normalization (expanding list constraints into alternative structures)
//! and fixation (collapsing to a single concrete structure).
//!
//! ```rust
//! use autoroute::caps::{Caps, CapsStructure};
//!
//! let rgb = Caps::from(CapsStructure::new("video/raw").with_field("format", "rgb"));
//! let any_raw = Caps::from(CapsStructure::new("video/raw"));
//!
//! assert!(rgb.intersects(&any_raw));
//! assert!(rgb.intersect(&any_raw).is_fixed());
//! ```

use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Field values and constraints
// ============================================================================

/// A concrete scalar value held by a structure field.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldValue {
    /// Integer value (dimensions, rates).
    Int(i64),
    /// String value (format names, codec profiles).
    Str(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::Str(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Str(value)
    }
}

/// Constraint on a single structure field.
///
/// Supports intersection and fixation. A field absent from a structure is
/// equivalent to [`FieldSpec::Any`].
#[derive(Clone, Debug, PartialEq, Default)]
pub enum FieldSpec {
    /// Exact value (fully constrained).
    Fixed(FieldValue),
    /// Inclusive integer range.
    Range {
        /// Minimum acceptable value.
        min: i64,
        /// Maximum acceptable value.
        max: i64,
    },
    /// List of acceptable values, ordered by preference.
    List(Vec<FieldValue>),
    /// Any value accepted (unconstrained).
    #[default]
    Any,
}

impl FieldSpec {
    /// Intersect two constraints, finding common values.
    ///
    /// Returns `None` if there is no overlap. List order follows the first
    /// operand.
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::Any, other) => Some(other.clone()),
            (this, Self::Any) => Some(this.clone()),

            (Self::Fixed(a), Self::Fixed(b)) => (a == b).then(|| Self::Fixed(a.clone())),

            (Self::Fixed(v), Self::Range { min, max })
            | (Self::Range { min, max }, Self::Fixed(v)) => match v {
                FieldValue::Int(i) if *i >= *min && *i <= *max => Some(Self::Fixed(v.clone())),
                _ => None,
            },

            (Self::Fixed(v), Self::List(list)) | (Self::List(list), Self::Fixed(v)) => {
                list.contains(v).then(|| Self::Fixed(v.clone()))
            }

            (
                Self::Range {
                    min: min1,
                    max: max1,
                },
                Self::Range {
                    min: min2,
                    max: max2,
                },
            ) => {
                let min = *min1.max(min2);
                let max = *max1.min(max2);
                if min > max {
                    None
                } else if min == max {
                    Some(Self::Fixed(FieldValue::Int(min)))
                } else {
                    Some(Self::Range { min, max })
                }
            }

            (Self::Range { min, max }, Self::List(list))
            | (Self::List(list), Self::Range { min, max }) => {
                let common: Vec<FieldValue> = list
                    .iter()
                    .filter(|v| matches!(v, FieldValue::Int(i) if *i >= *min && *i <= *max))
                    .cloned()
                    .collect();
                Self::from_candidates(common)
            }

            (Self::List(list1), Self::List(list2)) => {
                let common: Vec<FieldValue> = list1
                    .iter()
                    .filter(|v| list2.contains(v))
                    .cloned()
                    .collect();
                Self::from_candidates(common)
            }
        }
    }

    /// Choose a single value from the constraint.
    ///
    /// Prefers the first list entry or the range minimum. Returns `None`
    /// for [`FieldSpec::Any`]: an unconstrained field cannot fixate.
    pub fn fixate(&self) -> Option<FieldValue> {
        match self {
            Self::Fixed(v) => Some(v.clone()),
            Self::Range { min, .. } => Some(FieldValue::Int(*min)),
            Self::List(values) => values.first().cloned(),
            Self::Any => None,
        }
    }

    /// Whether this constraint admits exactly one value.
    #[inline]
    pub fn is_fixed(&self) -> bool {
        matches!(self, Self::Fixed(_))
    }

    fn from_candidates(mut candidates: Vec<FieldValue>) -> Option<Self> {
        match candidates.len() {
            0 => None,
            1 => Some(Self::Fixed(candidates.remove(0))),
            _ => Some(Self::List(candidates)),
        }
    }
}

impl From<FieldValue> for FieldSpec {
    fn from(value: FieldValue) -> Self {
        Self::Fixed(value)
    }
}

impl From<i64> for FieldSpec {
    fn from(value: i64) -> Self {
        Self::Fixed(FieldValue::Int(value))
    }
}

impl From<&str> for FieldSpec {
    fn from(value: &str) -> Self {
        Self::Fixed(FieldValue::Str(value.to_string()))
    }
}

impl From<String> for FieldSpec {
    fn from(value: String) -> Self {
        Self::Fixed(FieldValue::Str(value))
    }
}

// ============================================================================
// Structures
// ============================================================================

/// A single capability structure: a media-type name plus field constraints.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct CapsStructure {
    name: String,
    fields: BTreeMap<String, FieldSpec>,
}

impl CapsStructure {
    /// Create a structure with the given media-type name and no field
    /// constraints.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Add a field constraint (builder style).
    pub fn with_field(mut self, name: impl Into<String>, spec: impl Into<FieldSpec>) -> Self {
        self.fields.insert(name.into(), spec.into());
        self
    }

    /// The media-type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a field constraint.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    /// Intersect two structures.
    ///
    /// The names must match exactly; fields present in only one operand
    /// carry over unchanged (an absent field is unconstrained).
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        if self.name != other.name {
            return None;
        }

        let mut fields = BTreeMap::new();
        for (key, spec) in &self.fields {
            let merged = match other.fields.get(key) {
                Some(other_spec) => spec.intersect(other_spec)?,
                None => spec.clone(),
            };
            fields.insert(key.clone(), merged);
        }
        for (key, spec) in &other.fields {
            if !fields.contains_key(key) {
                fields.insert(key.clone(), spec.clone());
            }
        }

        Some(Self {
            name: self.name.clone(),
            fields,
        })
    }

    /// Whether every field admits exactly one value.
    pub fn is_fixed(&self) -> bool {
        self.fields.values().all(FieldSpec::is_fixed)
    }

    /// Collapse every field to a single value.
    ///
    /// Fails if any field is unconstrained ([`FieldSpec::Any`]).
    pub fn fixate(&self) -> Option<Self> {
        let mut fields = BTreeMap::new();
        for (key, spec) in &self.fields {
            fields.insert(key.clone(), FieldSpec::Fixed(spec.fixate()?));
        }
        Some(Self {
            name: self.name.clone(),
            fields,
        })
    }

    /// Expand the first list-valued field into one structure per entry.
    ///
    /// Returns `None` when no field holds a list.
    fn expand_first_list(&self) -> Option<Vec<Self>> {
        let (key, values) = self.fields.iter().find_map(|(k, spec)| match spec {
            FieldSpec::List(values) => Some((k.clone(), values.clone())),
            _ => None,
        })?;

        Some(
            values
                .into_iter()
                .map(|value| {
                    let mut expanded = self.clone();
                    expanded.fields.insert(key.clone(), FieldSpec::Fixed(value));
                    expanded
                })
                .collect(),
        )
    }
}

impl fmt::Display for CapsStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for (key, spec) in &self.fields {
            match spec {
                FieldSpec::Fixed(v) => write!(f, ", {key}={v}")?,
                FieldSpec::Range { min, max } => write!(f, ", {key}=[{min}..{max}]")?,
                FieldSpec::List(values) => {
                    write!(f, ", {key}={{")?;
                    for (i, v) in values.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{v}")?;
                    }
                    write!(f, "}}")?;
                }
                FieldSpec::Any => write!(f, ", {key}=*")?,
            }
        }
        Ok(())
    }
}

// ============================================================================
// Caps
// ============================================================================

/// An ordered set of alternative capability structures.
///
/// Empty caps match nothing. Most caps hold one or two alternatives, so
/// the storage is inline.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Caps(SmallVec<[CapsStructure; 2]>);

impl Caps {
    /// Create empty caps, matching nothing.
    pub fn new_empty() -> Self {
        Self(SmallVec::new())
    }

    /// Whether no structure is present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of alternative structures.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over the alternative structures in preference order.
    pub fn iter(&self) -> impl Iterator<Item = &CapsStructure> {
        self.0.iter()
    }

    /// The preferred (first) structure, if any.
    pub fn first(&self) -> Option<&CapsStructure> {
        self.0.first()
    }

    /// Whether two caps have any structure in common.
    pub fn intersects(&self, other: &Caps) -> bool {
        self.0
            .iter()
            .any(|a| other.0.iter().any(|b| a.intersect(b).is_some()))
    }

    /// Intersect two caps.
    ///
    /// Pairs every structure of `self` with every structure of `other`,
    /// keeping the first operand's preference order. The result may be
    /// empty.
    pub fn intersect(&self, other: &Caps) -> Caps {
        let mut out = SmallVec::new();
        for a in &self.0 {
            for b in &other.0 {
                if let Some(merged) = a.intersect(b) {
                    if !out.contains(&merged) {
                        out.push(merged);
                    }
                }
            }
        }
        Caps(out)
    }

    /// Intersect against an optional filter, preserving the filter's
    /// preference order. `None` filters nothing.
    pub fn intersect_with_filter(&self, filter: Option<&Caps>) -> Caps {
        match filter {
            Some(filter) => filter.intersect(self),
            None => self.clone(),
        }
    }

    /// Append the structures of `other`, skipping exact duplicates.
    pub fn merge(&mut self, other: &Caps) {
        for structure in &other.0 {
            if !self.0.contains(structure) {
                self.0.push(structure.clone());
            }
        }
    }

    /// Expand every list constraint into alternative structures.
    ///
    /// After normalization no structure holds a list-valued field; the
    /// expansion preserves preference order.
    pub fn normalize(&self) -> Caps {
        let mut out: SmallVec<[CapsStructure; 2]> = SmallVec::new();
        let mut queue: Vec<CapsStructure> = self.0.iter().rev().cloned().collect();

        while let Some(structure) = queue.pop() {
            match structure.expand_first_list() {
                Some(expanded) => queue.extend(expanded.into_iter().rev()),
                None => {
                    if !out.contains(&structure) {
                        out.push(structure);
                    }
                }
            }
        }

        Caps(out)
    }

    /// Whether these caps are fully concrete: exactly one structure with
    /// every field fixed.
    pub fn is_fixed(&self) -> bool {
        self.0.len() == 1 && self.0[0].is_fixed()
    }

    /// Collapse to a single concrete structure.
    ///
    /// Takes the preferred structure and fixates every field. Fails on
    /// empty caps or when a field is unconstrained.
    pub fn fixate(&self) -> Option<Caps> {
        let fixed = self.0.first()?.fixate()?;
        Some(Caps::from(fixed))
    }
}

impl From<CapsStructure> for Caps {
    fn from(structure: CapsStructure) -> Self {
        let mut inner = SmallVec::new();
        inner.push(structure);
        Self(inner)
    }
}

impl FromIterator<CapsStructure> for Caps {
    fn from_iter<I: IntoIterator<Item = CapsStructure>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "EMPTY");
        }
        for (i, structure) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{structure}")?;
        }
        Ok(())
    }
}
