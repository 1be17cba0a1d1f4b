//! Search space definitions and the integer-lattice encoder.
//!
//! A [`SearchSpace`] is an ordered list of named dimensions, each a finite
//! ordered list of candidate values. The [`SpaceEncoder`] maps between
//! [`ParameterAssignment`]s (what the evaluator sees) and [`Position`]s (what
//! strategies move around).

use rand::Rng;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::ops::Deref;

use crate::errors::{HsError, HsResult};

/// A concrete candidate value of a dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    Json(serde_json::Value),
}

impl ParameterValue {
    /// Canonical form: JSON numbers become `Int` (when integral) or `Float`,
    /// matching how an untagged value reads back from JSON.
    pub fn normalized(self) -> Self {
        match self {
            Self::Json(serde_json::Value::Number(n)) => match n.as_i64() {
                Some(v) => Self::Int(v),
                None => n.as_f64().map_or(Self::Json(serde_json::Value::Number(n)), Self::Float),
            },
            other => other,
        }
    }

    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Json(v) => v.as_f64(),
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        Self::Json(serde_json::Value::String(v.to_string()))
    }
}

impl From<serde_json::Value> for ParameterValue {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v).normalized()
    }
}

impl From<bool> for ParameterValue {
    fn from(v: bool) -> Self {
        Self::Json(serde_json::Value::Bool(v))
    }
}

/// A single named dimension of the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    /// Human-readable parameter name (e.g. "max_depth").
    pub name: String,
    /// Ordered candidate values; the order defines the index mapping.
    pub values: Vec<ParameterValue>,
}

/// The full search space: an ordered list of dimensions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchSpace {
    pub dimensions: Vec<Dimension>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self {
            dimensions: Vec::new(),
        }
    }

    pub fn add_values(mut self, name: impl Into<String>, values: Vec<ParameterValue>) -> Self {
        self.dimensions.push(Dimension {
            name: name.into(),
            values: values.into_iter().map(ParameterValue::normalized).collect(),
        });
        self
    }

    /// Integer range [low, high] inclusive.
    pub fn add_int(self, name: impl Into<String>, low: i64, high: i64) -> Self {
        let values = (low..=high).map(ParameterValue::Int).collect();
        self.add_values(name, values)
    }

    pub fn add_floats(self, name: impl Into<String>, values: Vec<f64>) -> Self {
        let values = values.into_iter().map(ParameterValue::Float).collect();
        self.add_values(name, values)
    }

    /// `steps` evenly spaced floats over [low, high].
    pub fn add_float_steps(self, name: impl Into<String>, low: f64, high: f64, steps: usize) -> Self {
        let steps = steps.max(2);
        let values = (0..steps)
            .map(|i| {
                let t = i as f64 / (steps - 1) as f64;
                ParameterValue::Float(low + t * (high - low))
            })
            .collect();
        self.add_values(name, values)
    }

    /// `steps` log-uniformly spaced floats over [low, high].
    pub fn add_log_steps(self, name: impl Into<String>, low: f64, high: f64, steps: usize) -> Self {
        let steps = steps.max(2);
        let log_low = low.ln();
        let log_high = high.ln();
        let values = (0..steps)
            .map(|i| {
                let t = i as f64 / (steps - 1) as f64;
                ParameterValue::Float((log_low + t * (log_high - log_low)).exp())
            })
            .collect();
        self.add_values(name, values)
    }

    pub fn add_choice(self, name: impl Into<String>, values: Vec<serde_json::Value>) -> Self {
        let values = values.into_iter().map(ParameterValue::from).collect();
        self.add_values(name, values)
    }

    pub fn dimensionality(&self) -> usize {
        self.dimensions.len()
    }
}

/// Integer-index vector identifying one point of a [`SearchSpace`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Position(Vec<usize>);

impl Position {
    pub fn new(indices: Vec<usize>) -> Self {
        Self(indices)
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<usize> {
        self.0
    }

    /// Real-valued copy, used by strategies doing vector arithmetic.
    pub fn to_f64(&self) -> Vec<f64> {
        self.0.iter().map(|&i| i as f64).collect()
    }
}

impl Deref for Position {
    type Target = [usize];

    fn deref(&self) -> &[usize] {
        &self.0
    }
}

impl From<Vec<usize>> for Position {
    fn from(indices: Vec<usize>) -> Self {
        Self(indices)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, idx) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{idx}")?;
        }
        write!(f, ")")
    }
}

/// Decoded, ordered mapping from dimension name to value.
///
/// Serialized as a JSON object whose key order follows the search space.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterAssignment {
    entries: Vec<(String, ParameterValue)>,
}

impl ParameterAssignment {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Set `name` to `value`, replacing an existing entry in place.
    pub fn insert(&mut self, name: impl Into<String>, value: ParameterValue) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        self.insert(name, value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl Serialize for ParameterAssignment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ParameterAssignment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AssignmentVisitor;

        impl<'de> Visitor<'de> for AssignmentVisitor {
            type Value = ParameterAssignment;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of parameter names to values")
            }

            fn visit_map<M: MapAccess<'de>>(self, mut access: M) -> Result<Self::Value, M::Error> {
                let mut assignment = ParameterAssignment::new();
                while let Some((name, value)) = access.next_entry::<String, ParameterValue>()? {
                    assignment.insert(name, value);
                }
                Ok(assignment)
            }
        }

        deserializer.deserialize_map(AssignmentVisitor)
    }
}

impl fmt::Display for ParameterAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        write!(f, "}}")
    }
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

/// Hashable identity of a value under `ParameterValue`'s equality.
#[derive(PartialEq, Eq, Hash)]
enum ValueKey {
    Int(i64),
    Float(u64),
    Json(String),
}

impl ValueKey {
    /// `None` for NaN, which equals nothing and so can never be encoded.
    fn of(value: &ParameterValue) -> Option<Self> {
        match value {
            ParameterValue::Int(v) => Some(Self::Int(*v)),
            ParameterValue::Float(v) if v.is_nan() => None,
            // 0.0 == -0.0
            ParameterValue::Float(v) if *v == 0.0 => Some(Self::Float(0f64.to_bits())),
            ParameterValue::Float(v) => Some(Self::Float(v.to_bits())),
            ParameterValue::Json(v) => Some(Self::Json(v.to_string())),
        }
    }
}

/// Validated, read-only view of a [`SearchSpace`] as an integer lattice.
#[derive(Debug, Clone, PartialEq)]
pub struct SpaceEncoder {
    space: SearchSpace,
    sizes: Vec<usize>,
}

impl SpaceEncoder {
    /// Validate `space` and build the encoder.
    ///
    /// Fails with [`HsError::InvalidSearchSpace`] on an empty space, an empty
    /// dimension, a duplicate dimension name, or a dimension whose values are
    /// not pairwise distinct (NaN included).
    pub fn new(space: SearchSpace) -> HsResult<Self> {
        if space.dimensions.is_empty() {
            return Err(HsError::InvalidSearchSpace {
                message: "search space has no dimensions".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for dim in &space.dimensions {
            if dim.values.is_empty() {
                return Err(HsError::InvalidSearchSpace {
                    message: format!("dimension '{}' has no values", dim.name),
                });
            }
            if !seen.insert(dim.name.as_str()) {
                return Err(HsError::InvalidSearchSpace {
                    message: format!("duplicate dimension name '{}'", dim.name),
                });
            }
            let mut values = HashSet::with_capacity(dim.values.len());
            for value in &dim.values {
                let key = ValueKey::of(value).ok_or_else(|| HsError::InvalidSearchSpace {
                    message: format!("dimension '{}' contains NaN", dim.name),
                })?;
                if !values.insert(key) {
                    return Err(HsError::InvalidSearchSpace {
                        message: format!("dimension '{}' repeats value {}", dim.name, value),
                    });
                }
            }
        }

        let sizes = space.dimensions.iter().map(|d| d.values.len()).collect();
        Ok(Self { space, sizes })
    }

    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    pub fn dimensionality(&self) -> usize {
        self.sizes.len()
    }

    /// Number of values per dimension, in position order.
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Total number of lattice points (`None` on overflow).
    pub fn grid_size(&self) -> Option<usize> {
        self.sizes
            .iter()
            .try_fold(1usize, |total, &size| total.checked_mul(size))
    }

    pub fn contains(&self, position: &Position) -> bool {
        position.len() == self.sizes.len()
            && position
                .iter()
                .zip(&self.sizes)
                .all(|(&idx, &size)| idx < size)
    }

    /// Map an assignment onto its lattice position.
    pub fn encode(&self, assignment: &ParameterAssignment) -> HsResult<Position> {
        if assignment.len() != self.dimensionality() {
            return Err(HsError::DimensionMismatch {
                expected: self.dimensionality(),
                actual: assignment.len(),
            });
        }

        let mut indices = Vec::with_capacity(self.dimensionality());
        for dim in &self.space.dimensions {
            let value = assignment.get(&dim.name).ok_or_else(|| HsError::UnknownValue {
                dimension: dim.name.clone(),
                value: "<missing>".to_string(),
            })?;
            let idx = dim
                .values
                .iter()
                .position(|candidate| candidate == value)
                .ok_or_else(|| HsError::UnknownValue {
                    dimension: dim.name.clone(),
                    value: value.to_string(),
                })?;
            indices.push(idx);
        }
        Ok(Position(indices))
    }

    /// Map a position back to concrete values. Components must already be in
    /// range; strategies clamp before calling.
    pub fn decode(&self, position: &Position) -> HsResult<ParameterAssignment> {
        if position.len() != self.dimensionality() {
            return Err(HsError::DimensionMismatch {
                expected: self.dimensionality(),
                actual: position.len(),
            });
        }

        let mut assignment = ParameterAssignment::new();
        for (dim, &idx) in self.space.dimensions.iter().zip(position.iter()) {
            let value = dim.values.get(idx).ok_or_else(|| HsError::IndexOutOfBounds {
                dimension: dim.name.clone(),
                index: idx,
                len: dim.values.len(),
            })?;
            assignment.entries.push((dim.name.clone(), value.clone()));
        }
        Ok(assignment)
    }

    /// Uniformly random valid position.
    pub fn random_position<R: Rng + ?Sized>(&self, rng: &mut R) -> Position {
        Position(self.sizes.iter().map(|&size| rng.gen_range(0..size)).collect())
    }

    /// Clamp integer coordinates into the lattice.
    pub fn clamp(&self, coords: &[i64]) -> Position {
        Position(
            coords
                .iter()
                .zip(&self.sizes)
                .map(|(&c, &size)| c.clamp(0, size as i64 - 1) as usize)
                .collect(),
        )
    }

    /// Round real coordinates (half away from zero) and clamp into the lattice.
    pub fn round_clamp(&self, coords: &[f64]) -> Position {
        Position(
            coords
                .iter()
                .zip(&self.sizes)
                .map(|(&c, &size)| {
                    let max = (size - 1) as f64;
                    if c.is_nan() {
                        0
                    } else {
                        c.round().clamp(0.0, max) as usize
                    }
                })
                .collect(),
        )
    }

    /// Perturb a random non-empty subset of components by a non-zero step of
    /// at most `max(1, round(epsilon * len))`, clamped into range.
    pub fn neighbor<R: Rng + ?Sized>(&self, position: &Position, epsilon: f64, rng: &mut R) -> Position {
        let dims = self.dimensionality();
        let mut chosen: Vec<bool> = (0..dims).map(|_| rng.gen_bool(0.5)).collect();
        if !chosen.iter().any(|&c| c) {
            chosen[rng.gen_range(0..dims)] = true;
        }

        let coords: Vec<i64> = position
            .iter()
            .zip(&self.sizes)
            .zip(&chosen)
            .map(|((&idx, &size), &perturb)| {
                if !perturb {
                    return idx as i64;
                }
                let max_step = ((epsilon * size as f64).round() as i64).max(1);
                let magnitude = rng.gen_range(1..=max_step);
                if rng.gen_bool(0.5) {
                    idx as i64 + magnitude
                } else {
                    idx as i64 - magnitude
                }
            })
            .collect();

        self.clamp(&coords)
    }
}
