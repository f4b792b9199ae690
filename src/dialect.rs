//! Backend seam: the driver in [`crate::compiler`] is dialect-agnostic and
//! delegates all SQL text generation through this trait.

use crate::ast::{PredicateKey, Relation, Rule};
use crate::partition::Occurrence;
use crate::primitives::{Activation, Aggregation, Primitive, PrimitiveSet};

pub trait Dialect {
    /// Namespace DDL rendered exactly once, ahead of any helper definition.
    fn preamble(&self) -> String;

    /// Definition of one helper primitive (scalar and vector overloads).
    fn primitive(&self, primitive: Primitive) -> String;

    /// Internal function for one fact occurrence: a single filterable row.
    fn fact_function(
        &self,
        key: &PredicateKey,
        index: usize,
        fact: &Relation,
        weight_index: Option<usize>,
    ) -> String;

    /// Internal function for one rule occurrence: joins the body literals
    /// and combines their weighted values.
    ///
    /// Rule safety is the template author's contract: a head variable that
    /// no body literal binds echoes its parameter unchanged, NULL included.
    #[allow(clippy::too_many_arguments)]
    fn rule_function(
        &self,
        key: &PredicateKey,
        index: usize,
        rule: &Rule,
        weight_indices: &[Option<usize>],
        activation: Activation,
        aggregation: Aggregation,
        used: &mut PrimitiveSet,
    ) -> String;

    /// Per-predicate function combining all occurrence functions for a key.
    fn aggregation_function(
        &self,
        key: &PredicateKey,
        occurrences: &[Occurrence],
        activation: Activation,
        aggregation: Aggregation,
        used: &mut PrimitiveSet,
    ) -> String;

    /// Public entry point: `(pre-declaration stub, real body)`.
    fn interface_function(&self, key: &PredicateKey) -> (String, String);
}
