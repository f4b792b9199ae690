use thiserror::Error;

use crate::ast::PredicateKey;

pub type Result<T> = std::result::Result<T, CompileError>;

/// Structural errors detected while compiling a template. All of them are
/// fatal: no SQL is returned and the caller has to fix the input.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("template entry is not a fact, rule or predicate metadata: {0}")]
    UnsupportedEntry(String),

    #[error("predicate {key} is derived by the template but also mapped to table {table}")]
    PredicateTableConflict { key: PredicateKey, table: String },

    #[error("table mapping for {0} declares no term columns")]
    MalformedTableMapping(String),
}
