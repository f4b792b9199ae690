//! Compiles a weighted relational-logic program into Postgres-compatible
//! SQL function definitions that evaluate the model directly inside the
//! database, without materializing a grounding graph.

pub mod ast;
pub mod compiler;
pub mod dialect;
pub mod error;
pub mod partition;
pub mod postgres;
pub mod primitives;
pub mod settings;


pub use ast::{
    PredicateKey, PredicateMetadata, Relation, Rule, TableMapping, TemplateEntry, Term, Weight,
};
pub use compiler::SqlCompiler;
pub use error::{CompileError, Result};
pub use primitives::{Activation, Aggregation};
pub use settings::Settings;
