//! The closed catalog of SQL-level primitives the generated code can call.
//!
//! Activations and aggregations are resolved to enum values once, during
//! emission; the dialect backend decides how each one renders (helper
//! function, native aggregate, or nothing at all for `identity`).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Scalar/vector transform applied to a computed value before it
/// contributes upward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Identity,
    Tanh,
    Sigmoid,
    Relu,
}

impl Activation {
    /// The helper definition this activation needs, if any. `identity`
    /// renders as nothing.
    pub fn primitive(self) -> Option<Primitive> {
        match self {
            Activation::Identity => None,
            Activation::Tanh => Some(Primitive::Tanh),
            Activation::Sigmoid => Some(Primitive::Sigmoid),
            Activation::Relu => Some(Primitive::Relu),
        }
    }
}

/// Reduction combining multiple contributions for the same grounding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Avg,
    Max,
    Min,
    Sum,
}

impl Aggregation {
    /// `avg`/`max`/`min` map to native SQL aggregates; only `sum` needs a
    /// helper definition (for the scalar/vector overload).
    pub fn primitive(self) -> Option<Primitive> {
        match self {
            Aggregation::Sum => Some(Primitive::Sum),
            _ => None,
        }
    }
}

/// A helper definition the backend can render into the helper blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    Multiply,
    Add,
    Tanh,
    Sigmoid,
    Relu,
    Sum,
}

impl Primitive {
    /// Rendering order of the helper blob.
    pub const CATALOG: [Primitive; 6] = [
        Primitive::Multiply,
        Primitive::Add,
        Primitive::Tanh,
        Primitive::Sigmoid,
        Primitive::Relu,
        Primitive::Sum,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Primitive::Multiply => "multiply",
            Primitive::Add => "add",
            Primitive::Tanh => "tanh",
            Primitive::Sigmoid => "sigmoid",
            Primitive::Relu => "relu",
            Primitive::Sum => "sum",
        }
    }

    /// Every weighted computation depends on `multiply` and `add`, so they
    /// are rendered whether or not an occurrence mentions them.
    pub fn always_rendered(self) -> bool {
        matches!(self, Primitive::Multiply | Primitive::Add)
    }
}

/// Set of primitives the emitted SQL actually referenced.
pub type PrimitiveSet = HashSet<Primitive>;
