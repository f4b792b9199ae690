//! Dialect-agnostic driver: walks the partitioned buckets, delegates text
//! generation to the backend, accumulates the used-primitive set, and
//! caches the assembled blobs.

use indexmap::IndexMap;
use tracing::debug;

use crate::ast::{PredicateKey, TableMapping, TemplateEntry, Weight};
use crate::dialect::Dialect;
use crate::error::{CompileError, Result};
use crate::partition::{Definition, Partition};
use crate::postgres::Postgres;
use crate::primitives::{Primitive, PrimitiveSet};
use crate::settings::Settings;

/// Compiles one template against one weight vector. Single-use: the
/// compiled text is cached on first demand and never invalidated; a
/// different template or weight vector needs a new instance.
#[derive(Debug)]
pub struct SqlCompiler {
    settings: Settings,
    weights: Vec<Weight>,
    mappings: IndexMap<PredicateKey, TableMapping>,
    partition: Partition,
    compiled: Option<Compiled>,
}

#[derive(Debug)]
struct Compiled {
    helper_sql: String,
    predicate_sql: String,
}

impl SqlCompiler {
    pub fn new(
        template: Vec<TemplateEntry>,
        weights: Vec<Weight>,
        settings: Settings,
        mappings: Vec<TableMapping>,
    ) -> Result<Self> {
        let mut mapped = IndexMap::new();
        for mapping in mappings {
            if mapping.term_columns.is_empty() {
                return Err(CompileError::MalformedTableMapping(mapping.relation));
            }
            mapped.insert(mapping.key(), mapping);
        }

        let partition = Partition::from_entries(template)?;

        Ok(Self {
            settings,
            weights,
            mappings: mapped,
            partition,
            compiled: None,
        })
    }

    /// Helper/preamble DDL; to be executed before the predicate DDL.
    pub fn helper_sql(&mut self) -> Result<&str> {
        self.ensure().map(|compiled| compiled.helper_sql.as_str())
    }

    /// Generated predicate DDL: all interface stubs first, then every
    /// generated body in generation order.
    pub fn predicate_sql(&mut self) -> Result<&str> {
        self.ensure().map(|compiled| compiled.predicate_sql.as_str())
    }

    /// Both blobs concatenated in install order.
    pub fn to_sql(&mut self) -> Result<String> {
        let compiled = self.ensure()?;
        Ok(format!("{}{}", compiled.helper_sql, compiled.predicate_sql))
    }

    fn ensure(&mut self) -> Result<&Compiled> {
        if self.compiled.is_none() {
            let compiled = self.run()?;
            self.compiled = Some(compiled);
        }
        Ok(self.compiled.as_ref().expect("compile cache populated"))
    }

    fn run(&self) -> Result<Compiled> {
        let backend = Postgres::new(&self.settings, &self.mappings, &self.weights);
        let mut used = PrimitiveSet::new();
        let mut stubs = String::new();
        let mut bodies = String::new();

        for (key, occurrences) in &self.partition.buckets {
            if let Some(mapping) = self.mappings.get(key) {
                return Err(CompileError::PredicateTableConflict {
                    key: key.clone(),
                    table: mapping.table.clone(),
                });
            }
            debug!(predicate = %key, occurrences = occurrences.len(), "emitting predicate");

            for (index, occurrence) in occurrences.iter().enumerate() {
                match &occurrence.definition {
                    Definition::Rule(rule) => {
                        let activation =
                            rule.activation.unwrap_or(self.settings.rule_activation);
                        let aggregation =
                            rule.aggregation.unwrap_or(self.settings.aggregation);
                        bodies.push_str(&backend.rule_function(
                            key,
                            index,
                            rule,
                            &occurrence.weight_indices,
                            activation,
                            aggregation,
                            &mut used,
                        ));
                    }
                    Definition::Fact(fact) => {
                        let weight_index = occurrence.weight_indices.first().copied().flatten();
                        bodies.push_str(&backend.fact_function(key, index, fact, weight_index));
                    }
                }
            }

            let metadata = self.partition.metadata.get(key);
            let activation = metadata
                .and_then(|m| m.activation)
                .unwrap_or(self.settings.relation_activation);
            let aggregation = metadata
                .and_then(|m| m.aggregation)
                .unwrap_or(self.settings.aggregation);
            bodies.push_str(&backend.aggregation_function(
                key,
                occurrences,
                activation,
                aggregation,
                &mut used,
            ));

            let (stub, interface) = backend.interface_function(key);
            stubs.push_str(&stub);
            bodies.push_str(&interface);
        }

        let mut helper_sql = backend.preamble();
        for primitive in Primitive::CATALOG {
            if primitive.always_rendered() || used.contains(&primitive) {
                helper_sql.push_str(&backend.primitive(primitive));
            }
        }

        Ok(Compiled {
            helper_sql,
            predicate_sql: format!("{}{}", stubs, bodies),
        })
    }
}
