//! Template partitioning: one linear scan over the declaration-ordered
//! entries, bucketing rule/fact definitions by predicate key and assigning
//! weight indices.
//!
//! The index assignment must reproduce exactly the ordering the external
//! model used when it flattened its weights: a running counter, advanced
//! once per weighted occurrence, head before body, entry after entry.

use indexmap::IndexMap;
use tracing::debug;

use crate::ast::{PredicateKey, PredicateMetadata, Relation, Rule, TemplateEntry};
use crate::error::{CompileError, Result};

/// One rule or fact definition contributing to a predicate, paired with the
/// weight indices of its occurrences.
///
/// For a rule the index list has length `1 + body.len()`: position 0 for
/// the head, then one per body literal. For a fact it has length 1.
/// Unweighted occurrences hold `None`.
#[derive(Clone, Debug)]
pub struct Occurrence {
    pub definition: Definition,
    pub weight_indices: Vec<Option<usize>>,
}

#[derive(Clone, Debug)]
pub enum Definition {
    Fact(Relation),
    Rule(Rule),
}

/// Read-only output of the partitioning pass. Bucket order is first-appearance
/// order; occurrence order within a bucket is declaration order, which fixes
/// the numeric suffix of generated function names.
#[derive(Clone, Debug, Default)]
pub struct Partition {
    pub buckets: IndexMap<PredicateKey, Vec<Occurrence>>,
    pub metadata: IndexMap<PredicateKey, PredicateMetadata>,
}

impl Partition {
    pub fn from_entries(entries: Vec<TemplateEntry>) -> Result<Self> {
        let mut buckets: IndexMap<PredicateKey, Vec<Occurrence>> = IndexMap::new();
        let mut metadata = IndexMap::new();
        let mut counter = 0;

        for entry in entries {
            match entry {
                TemplateEntry::Fact(fact) => {
                    let weight_indices = vec![claim(&mut counter, fact.weighted)];
                    buckets.entry(fact.key()).or_default().push(Occurrence {
                        definition: Definition::Fact(fact),
                        weight_indices,
                    });
                }

                TemplateEntry::Rule(rule) => {
                    let mut weight_indices = Vec::with_capacity(1 + rule.body.len());
                    weight_indices.push(claim(&mut counter, rule.head.weighted));
                    for literal in &rule.body {
                        weight_indices.push(claim(&mut counter, literal.weighted));
                    }
                    buckets.entry(rule.head.key()).or_default().push(Occurrence {
                        definition: Definition::Rule(rule),
                        weight_indices,
                    });
                }

                TemplateEntry::Metadata(meta) => {
                    metadata.insert(meta.key(), meta);
                }

                TemplateEntry::Query(relation) => {
                    return Err(CompileError::UnsupportedEntry(format!(
                        "query {}",
                        relation.key()
                    )));
                }
            }
        }

        debug!(
            predicates = buckets.len(),
            weights = counter,
            "partitioned template"
        );

        Ok(Self { buckets, metadata })
    }
}

fn claim(counter: &mut usize, weighted: bool) -> Option<usize> {
    if weighted {
        let index = *counter;
        *counter += 1;
        Some(index)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Term;

    fn fact(name: &str, weighted: bool) -> TemplateEntry {
        let relation = Relation::new(name, vec![Term::constant("a")]);
        TemplateEntry::Fact(if weighted { relation.weighted() } else { relation })
    }

    #[test]
    fn weight_indices_are_contiguous_in_declaration_order() {
        let rule = Rule::new(
            Relation::new("p", vec![Term::var("X")]).weighted(),
            vec![
                Relation::new("q", vec![Term::var("X")]).weighted(),
                Relation::new("r", vec![Term::var("X")]),
            ],
        );
        let entries = vec![
            fact("a", true),
            fact("b", false),
            TemplateEntry::Rule(rule),
            fact("a", true),
        ];

        let partition = Partition::from_entries(entries).unwrap();

        let a = &partition.buckets[&PredicateKey::new("a", 1)];
        assert_eq!(a[0].weight_indices, vec![Some(0)]);
        assert_eq!(a[1].weight_indices, vec![Some(3)]);

        let b = &partition.buckets[&PredicateKey::new("b", 1)];
        assert_eq!(b[0].weight_indices, vec![None]);

        let p = &partition.buckets[&PredicateKey::new("p", 1)];
        assert_eq!(p[0].weight_indices, vec![Some(1), Some(2), None]);
    }

    #[test]
    fn queries_are_rejected() {
        let entries = vec![TemplateEntry::Query(Relation::new(
            "edge",
            vec![Term::constant("0"), Term::constant("1")],
        ))];
        assert_eq!(
            Partition::from_entries(entries).unwrap_err(),
            CompileError::UnsupportedEntry("query edge/2".to_owned())
        );
    }
}
