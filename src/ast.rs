//! The template model consumed by the compiler.
//!
//! Entries arrive as an already-built ordered sequence (the authoring DSL
//! lives elsewhere); declaration order is semantically load-bearing, both
//! for weight-index assignment and for the numeric suffixes of generated
//! function names.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::primitives::{Activation, Aggregation};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Term {
    Constant(String),
    Variable(String),
}

impl Term {
    pub fn constant(value: impl Into<String>) -> Self {
        Term::Constant(value.into())
    }

    pub fn var(name: impl Into<String>) -> Self {
        Term::Variable(name.into())
    }
}

/// A learned weight from the external model's flat weight vector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Weight {
    Scalar(f64),
    Vector(Vec<f64>),
}

/// A relation occurrence: the head of a rule, a body literal, or a fact.
///
/// `weighted` marks an occurrence that consumes one index of the external
/// weight vector. `hidden` body literals constrain the join but contribute
/// no value term.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub name: String,
    pub terms: Vec<Term>,
    #[serde(default)]
    pub weighted: bool,
    #[serde(default)]
    pub hidden: bool,
}

impl Relation {
    pub fn new(name: impl Into<String>, terms: Vec<Term>) -> Self {
        Self {
            name: name.into(),
            terms,
            weighted: false,
            hidden: false,
        }
    }

    pub fn weighted(mut self) -> Self {
        self.weighted = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn arity(&self) -> usize {
        self.terms.len()
    }

    pub fn key(&self) -> PredicateKey {
        PredicateKey::new(&self.name, self.arity())
    }
}

/// Head relation derived from a conjunction of body literals, with optional
/// per-rule activation/aggregation overrides.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub head: Relation,
    pub body: Vec<Relation>,
    #[serde(default)]
    pub activation: Option<Activation>,
    #[serde(default)]
    pub aggregation: Option<Aggregation>,
}

impl Rule {
    pub fn new(head: Relation, body: Vec<Relation>) -> Self {
        Self {
            head,
            body,
            activation: None,
            aggregation: None,
        }
    }
}

/// Predicate-level activation/aggregation override.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredicateMetadata {
    pub name: String,
    pub arity: usize,
    #[serde(default)]
    pub activation: Option<Activation>,
    #[serde(default)]
    pub aggregation: Option<Aggregation>,
}

impl PredicateMetadata {
    pub fn key(&self) -> PredicateKey {
        PredicateKey::new(&self.name, self.arity)
    }
}

/// One entry of the source template, in declaration order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TemplateEntry {
    Fact(Relation),
    Rule(Rule),
    Metadata(PredicateMetadata),
    /// Ground queries show up in logic-program sources but have no SQL
    /// counterpart here; the partitioner rejects them.
    Query(Relation),
}

/// Declares that a predicate is sourced from an existing table instead of
/// being generated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableMapping {
    pub relation: String,
    pub table: String,
    pub term_columns: Vec<String>,
    #[serde(default)]
    pub value_column: Option<String>,
}

impl TableMapping {
    pub fn new(
        relation: impl Into<String>,
        table: impl Into<String>,
        term_columns: Vec<String>,
    ) -> Self {
        Self {
            relation: relation.into(),
            table: table.into(),
            term_columns,
            value_column: None,
        }
    }

    pub fn with_value_column(mut self, column: impl Into<String>) -> Self {
        self.value_column = Some(column.into());
        self
    }

    pub fn key(&self) -> PredicateKey {
        PredicateKey::new(&self.relation, self.term_columns.len())
    }
}

/// Identity of a generation bucket: predicate name plus arity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PredicateKey {
    pub name: String,
    pub arity: usize,
}

impl PredicateKey {
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        Self {
            name: name.into(),
            arity,
        }
    }
}

impl fmt::Display for PredicateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.arity)
    }
}
