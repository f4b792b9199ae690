//! Postgres-compatible backend.
//!
//! Naming contract: internal per-occurrence functions are
//! `<schema>._<name>_<arity>_<index>`, the per-predicate aggregation is
//! `<schema>._<name>_<arity>`, and the public interface is
//! `<schema>.<name>`. Every function takes `arity`-many untyped TEXT
//! parameters `p0..`; passing NULL means "match any value", so compiled
//! programs support partial instantiation without grounding.

use std::collections::HashMap;

use indexmap::IndexMap;
use itertools::Itertools;

use crate::ast::{PredicateKey, Relation, Rule, TableMapping, Term, Weight};
use crate::dialect::Dialect;
use crate::partition::{Definition, Occurrence};
use crate::primitives::{Activation, Aggregation, Primitive, PrimitiveSet};
use crate::settings::Settings;

pub struct Postgres<'a> {
    settings: &'a Settings,
    mappings: &'a IndexMap<PredicateKey, TableMapping>,
    weights: &'a [Weight],
}

impl<'a> Postgres<'a> {
    pub fn new(
        settings: &'a Settings,
        mappings: &'a IndexMap<PredicateKey, TableMapping>,
        weights: &'a [Weight],
    ) -> Self {
        Self {
            settings,
            mappings,
            weights,
        }
    }

    fn occurrence_name(&self, key: &PredicateKey, index: usize) -> String {
        format!(
            "{}._{}_{}_{}",
            self.settings.schema, key.name, key.arity, index
        )
    }

    fn aggregation_name(&self, key: &PredicateKey) -> String {
        format!("{}._{}_{}", self.settings.schema, key.name, key.arity)
    }

    fn public_name(&self, key: &PredicateKey) -> String {
        format!("{}.{}", self.settings.schema, key.name)
    }

    fn parameters(arity: usize) -> String {
        (0..arity).map(|i| format!("p{} TEXT", i)).join(", ")
    }

    fn arguments(arity: usize) -> String {
        (0..arity).map(|i| format!("p{}", i)).join(", ")
    }

    fn row_type(arity: usize) -> String {
        let mut columns = "value NUMERIC".to_owned();
        for i in 0..arity {
            columns.push_str(&format!(", t{} TEXT", i));
        }
        columns
    }

    /// Wraps a body into a full CREATE FUNCTION definition with the shared
    /// signature and row shape.
    fn function(&self, name: &str, arity: usize, body: &str) -> String {
        format!(
            "CREATE OR REPLACE FUNCTION {}({})\nRETURNS TABLE({}) AS $$\n{}\n$$ LANGUAGE SQL;\n\n",
            name,
            Self::parameters(arity),
            Self::row_type(arity),
            body
        )
    }

    /// The SQL literal for one entry of the external weight vector. Indices
    /// beyond the supplied vector render as the unweighted value.
    fn weight_sql(&self, index: usize) -> String {
        match self.weights.get(index) {
            Some(Weight::Scalar(value)) => format!("{}", value),
            Some(Weight::Vector(values)) => {
                format!("ARRAY[{}]", values.iter().map(|v| format!("{}", v)).join(", "))
            }
            None => "1".to_owned(),
        }
    }

    fn multiply(&self, weight_index: usize, expression: String) -> String {
        format!(
            "{}.multiply({}, {})",
            self.settings.helper_schema,
            self.weight_sql(weight_index),
            expression
        )
    }

    /// Left fold of pending values: a running pair escalates into a nested
    /// associative sum as soon as two values accumulate.
    fn fold_sum(&self, values: Vec<String>) -> String {
        values
            .into_iter()
            .reduce(|total, value| {
                format!("{}.add({}, {})", self.settings.helper_schema, total, value)
            })
            .unwrap_or_else(|| "1".to_owned())
    }

    fn activation_sql(&self, activation: Activation, expression: String) -> String {
        match activation.primitive() {
            None => expression,
            Some(primitive) => format!(
                "{}.{}({})",
                self.settings.helper_schema,
                primitive.name(),
                expression
            ),
        }
    }

    fn aggregation_sql(&self, aggregation: Aggregation, expression: String) -> String {
        match aggregation {
            Aggregation::Avg => format!("AVG({})", expression),
            Aggregation::Max => format!("MAX({})", expression),
            Aggregation::Min => format!("MIN({})", expression),
            Aggregation::Sum => {
                format!("{}.sum({})", self.settings.helper_schema, expression)
            }
        }
    }

    /// Both overloads are STRICT: the array `sum` aggregate below carries no
    /// INITCOND, so a strict transition function is what makes Postgres seed
    /// the state with the first input instead of calling `add(NULL, v)`.
    fn binary_helper(&self, name: &str, operator: &str) -> String {
        let schema = &self.settings.helper_schema;
        format!(
            "CREATE OR REPLACE FUNCTION {schema}.{name}(a NUMERIC, b NUMERIC)\n\
             RETURNS NUMERIC AS $$\n\
             SELECT a {operator} b\n\
             $$ LANGUAGE SQL IMMUTABLE STRICT;\n\n\
             CREATE OR REPLACE FUNCTION {schema}.{name}(a NUMERIC[], b NUMERIC[])\n\
             RETURNS NUMERIC[] AS $$\n\
             SELECT ARRAY(\n\
             \x20   SELECT u.x {operator} v.y\n\
             \x20   FROM UNNEST(a) WITH ORDINALITY AS u(x, i)\n\
             \x20   JOIN UNNEST(b) WITH ORDINALITY AS v(y, j) ON u.i = v.j\n\
             \x20   ORDER BY u.i\n\
             )\n\
             $$ LANGUAGE SQL IMMUTABLE STRICT;\n\n",
            schema = schema,
            name = name,
            operator = operator
        )
    }

    fn unary_helper(&self, name: &str, scalar_body: &str) -> String {
        let schema = &self.settings.helper_schema;
        format!(
            "CREATE OR REPLACE FUNCTION {schema}.{name}(a NUMERIC)\n\
             RETURNS NUMERIC AS $$\n\
             SELECT {body}\n\
             $$ LANGUAGE SQL IMMUTABLE;\n\n\
             CREATE OR REPLACE FUNCTION {schema}.{name}(a NUMERIC[])\n\
             RETURNS NUMERIC[] AS $$\n\
             SELECT ARRAY(\n\
             \x20   SELECT {schema}.{name}(u.x)\n\
             \x20   FROM UNNEST(a) WITH ORDINALITY AS u(x, i)\n\
             \x20   ORDER BY u.i\n\
             )\n\
             $$ LANGUAGE SQL IMMUTABLE;\n\n",
            schema = schema,
            name = name,
            body = scalar_body
        )
    }

    /// The array overload has no INITCOND (no universal empty array to start
    /// from); it relies on the strict `add` to seed the state.
    fn sum_helper(&self) -> String {
        let schema = &self.settings.helper_schema;
        format!(
            "CREATE OR REPLACE AGGREGATE {schema}.sum(NUMERIC) (\n\
             \x20   SFUNC = {schema}.add,\n\
             \x20   STYPE = NUMERIC,\n\
             \x20   INITCOND = '0'\n\
             );\n\n\
             CREATE OR REPLACE AGGREGATE {schema}.sum(NUMERIC[]) (\n\
             \x20   SFUNC = {schema}.add,\n\
             \x20   STYPE = NUMERIC[]\n\
             );\n\n",
            schema = schema
        )
    }
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// COALESCE over one column of every joined occurrence alias; a single
/// alias needs no COALESCE.
fn coalesce(expressions: &[String]) -> String {
    if expressions.len() == 1 {
        expressions[0].clone()
    } else {
        format!("COALESCE({})", expressions.join(", "))
    }
}

impl Dialect for Postgres<'_> {
    fn preamble(&self) -> String {
        format!(
            "SET check_function_bodies = off;\n\n\
             CREATE SCHEMA IF NOT EXISTS {};\n\
             CREATE SCHEMA IF NOT EXISTS {};\n\n",
            self.settings.schema, self.settings.helper_schema
        )
    }

    fn primitive(&self, primitive: Primitive) -> String {
        match primitive {
            Primitive::Multiply => self.binary_helper("multiply", "*"),
            Primitive::Add => self.binary_helper("add", "+"),
            Primitive::Tanh => {
                self.unary_helper("tanh", "(EXP(2 * a) - 1) / (EXP(2 * a) + 1)")
            }
            Primitive::Sigmoid => self.unary_helper("sigmoid", "1 / (1 + EXP(-a))"),
            Primitive::Relu => self.unary_helper("relu", "GREATEST(a, 0)"),
            Primitive::Sum => self.sum_helper(),
        }
    }

    fn fact_function(
        &self,
        key: &PredicateKey,
        index: usize,
        fact: &Relation,
        weight_index: Option<usize>,
    ) -> String {
        let value = match weight_index {
            Some(index) => self.weight_sql(index),
            None => "1".to_owned(),
        };

        let mut select = format!("SELECT {} AS value", value);
        let mut filters = vec![];
        for (position, term) in fact.terms.iter().enumerate() {
            let output = match term {
                Term::Constant(constant) => {
                    let constant = quote(constant);
                    filters.push(format!(
                        "(p{} IS NULL OR p{} = {})",
                        position, position, constant
                    ));
                    constant
                }
                // A variable term matches anything; echo the caller's binding.
                Term::Variable(_) => format!("p{}", position),
            };
            select.push_str(&format!(", {} AS t{}", output, position));
        }

        let body = if filters.is_empty() {
            select
        } else {
            format!("{}\nWHERE {}", select, filters.join(" AND "))
        };

        self.function(&self.occurrence_name(key, index), key.arity, &body)
    }

    fn rule_function(
        &self,
        key: &PredicateKey,
        index: usize,
        rule: &Rule,
        weight_indices: &[Option<usize>],
        activation: Activation,
        aggregation: Aggregation,
        used: &mut PrimitiveSet,
    ) -> String {
        let head = &rule.head;

        // First head position of every head variable; body literals bind
        // these variables through the caller's own parameters.
        let mut parameters: HashMap<&str, usize> = HashMap::new();
        for (position, term) in head.terms.iter().enumerate() {
            if let Term::Variable(variable) = term {
                parameters.entry(variable.as_str()).or_insert(position);
            }
        }

        // First occurrence of a variable fixes its column; later occurrences
        // generate equality conditions against it.
        let mut bindings: IndexMap<&str, String> = IndexMap::new();
        let mut from = String::new();
        let mut filters: Vec<String> = vec![];
        let mut values: Vec<String> = vec![];

        for (literal_index, literal) in rule.body.iter().enumerate() {
            let alias = format!("d{}", literal_index);
            let mapping = self.mappings.get(&literal.key());
            let mut conditions: Vec<String> = vec![];

            let source = if let Some(mapping) = mapping {
                // Raw table: no parameters to pass, so constants and caller
                // bindings become filters instead.
                for (position, term) in literal.terms.iter().enumerate() {
                    let column = format!("{}.{}", alias, mapping.term_columns[position]);
                    match term {
                        Term::Constant(constant) => {
                            conditions.push(format!("{} = {}", column, quote(constant)));
                        }
                        Term::Variable(variable) => {
                            if let Some(bound) = bindings.get(variable.as_str()) {
                                conditions.push(format!("{} = {}", column, bound));
                            } else {
                                if let Some(&parameter) = parameters.get(variable.as_str()) {
                                    conditions.push(format!(
                                        "(p{} IS NULL OR {} = p{})",
                                        parameter, column, parameter
                                    ));
                                }
                                bindings.insert(variable.as_str(), column);
                            }
                        }
                    }
                }
                format!("{} AS {}", mapping.table, alias)
            } else {
                let arguments = literal
                    .terms
                    .iter()
                    .map(|term| match term {
                        Term::Constant(constant) => quote(constant),
                        Term::Variable(variable) => match parameters.get(variable.as_str()) {
                            Some(parameter) => format!("p{}", parameter),
                            None => "NULL".to_owned(),
                        },
                    })
                    .join(", ");
                for (position, term) in literal.terms.iter().enumerate() {
                    if let Term::Variable(variable) = term {
                        let column = format!("{}.t{}", alias, position);
                        if let Some(bound) = bindings.get(variable.as_str()) {
                            conditions.push(format!("{} = {}", column, bound));
                        } else {
                            bindings.insert(variable.as_str(), column);
                        }
                    }
                }
                format!(
                    "{}({}) AS {}",
                    self.aggregation_name(&literal.key()),
                    arguments,
                    alias
                )
            };

            if literal_index == 0 {
                from = format!("\nFROM {}", source);
                filters.extend(conditions);
            } else {
                let on = if conditions.is_empty() {
                    "TRUE".to_owned()
                } else {
                    conditions.join(" AND ")
                };
                from.push_str(&format!("\nINNER JOIN {} ON {}", source, on));
            }

            if !literal.hidden {
                let mut value = match mapping {
                    Some(mapping) => match &mapping.value_column {
                        Some(column) => format!("CAST({}.{} AS NUMERIC)", alias, column),
                        None => "1".to_owned(),
                    },
                    None => format!("{}.value", alias),
                };
                if let Some(weight_index) = weight_indices.get(literal_index + 1).copied().flatten()
                {
                    value = self.multiply(weight_index, value);
                }
                values.push(value);
            }
        }

        // Head outputs; repeated head variables and head constants filter
        // against the extra parameters they occupy.
        let mut outputs = vec![];
        for (position, term) in head.terms.iter().enumerate() {
            match term {
                Term::Constant(constant) => {
                    let constant = quote(constant);
                    filters.push(format!(
                        "(p{} IS NULL OR p{} = {})",
                        position, position, constant
                    ));
                    outputs.push(constant);
                }
                Term::Variable(variable) => {
                    let column = bindings
                        .get(variable.as_str())
                        .cloned()
                        .unwrap_or_else(|| format!("p{}", position));
                    if parameters.get(variable.as_str()) != Some(&position) {
                        filters.push(format!(
                            "(p{} IS NULL OR {} = p{})",
                            position, column, position
                        ));
                    }
                    outputs.push(column);
                }
            }
        }

        let head_variables: Vec<&str> = head
            .terms
            .iter()
            .filter_map(|term| match term {
                Term::Variable(variable) => Some(variable.as_str()),
                Term::Constant(_) => None,
            })
            .unique()
            .collect();
        let grouped = head_variables.len() >= 2;

        let mut value = self.fold_sum(values);
        value = self.activation_sql(activation, value);
        if let Some(primitive) = activation.primitive() {
            used.insert(primitive);
        }
        if grouped {
            // One row per distinct grounding of the head; the occurrence's
            // aggregation reduces the groundings of the remaining body
            // variables.
            value = self.aggregation_sql(aggregation, value);
            if let Some(primitive) = aggregation.primitive() {
                used.insert(primitive);
            }
        }
        if let Some(weight_index) = weight_indices.first().copied().flatten() {
            value = self.multiply(weight_index, value);
        }

        let mut body = format!("SELECT {} AS value", value);
        for (position, output) in outputs.iter().enumerate() {
            body.push_str(&format!(", {} AS t{}", output, position));
        }
        body.push_str(&from);
        if !filters.is_empty() {
            body.push_str(&format!("\nWHERE {}", filters.join(" AND ")));
        }
        if grouped {
            let columns = head_variables
                .iter()
                .map(|variable| {
                    bindings
                        .get(variable)
                        .cloned()
                        .unwrap_or_else(|| format!("p{}", parameters[variable]))
                })
                .join(", ");
            body.push_str(&format!("\nGROUP BY {}", columns));
        }

        self.function(&self.occurrence_name(key, index), key.arity, &body)
    }

    fn aggregation_function(
        &self,
        key: &PredicateKey,
        occurrences: &[Occurrence],
        activation: Activation,
        aggregation: Aggregation,
        used: &mut PrimitiveSet,
    ) -> String {
        let count = occurrences.len();
        let arguments = Self::arguments(key.arity);

        let mut from = format!(
            "\nFROM {}({}) AS r0",
            self.occurrence_name(key, 0),
            arguments
        );
        for occurrence in 1..count {
            let on = (0..key.arity)
                .map(|position| {
                    let previous: Vec<String> = (0..occurrence)
                        .map(|alias| format!("r{}.t{}", alias, position))
                        .collect();
                    format!("r{}.t{} = {}", occurrence, position, coalesce(&previous))
                })
                .join(" AND ");
            let on = if on.is_empty() { "TRUE".to_owned() } else { on };
            from.push_str(&format!(
                "\nFULL OUTER JOIN {}({}) AS r{} ON {}",
                self.occurrence_name(key, occurrence),
                arguments,
                occurrence,
                on
            ));
        }

        // A grounding present in any one occurrence yields a row; absent
        // occurrences contribute 0.
        let contributions: Vec<String> = if count == 1 {
            vec!["r0.value".to_owned()]
        } else {
            (0..count)
                .map(|occurrence| format!("COALESCE(r{}.value, 0)", occurrence))
                .collect()
        };
        let mut value = self.fold_sum(contributions);

        let lone_rule =
            count == 1 && matches!(occurrences[0].definition, Definition::Rule(_));
        if lone_rule {
            value = self.activation_sql(activation, value);
            if let Some(primitive) = activation.primitive() {
                used.insert(primitive);
            }
        }
        value = self.aggregation_sql(aggregation, value);
        if let Some(primitive) = aggregation.primitive() {
            used.insert(primitive);
        }

        let columns: Vec<String> = (0..key.arity)
            .map(|position| {
                let aliases: Vec<String> = (0..count)
                    .map(|alias| format!("r{}.t{}", alias, position))
                    .collect();
                coalesce(&aliases)
            })
            .collect();

        let mut body = format!("SELECT {} AS value", value);
        for (position, column) in columns.iter().enumerate() {
            body.push_str(&format!(", {} AS t{}", column, position));
        }
        body.push_str(&from);
        if key.arity > 0 {
            body.push_str(&format!("\nGROUP BY {}", columns.join(", ")));
        }

        self.function(&self.aggregation_name(key), key.arity, &body)
    }

    fn interface_function(&self, key: &PredicateKey) -> (String, String) {
        let name = self.public_name(key);

        // The stub keeps the symbol defined even if the real body is
        // referenced before it is installed.
        let mut stub_body = "SELECT 0::NUMERIC AS value".to_owned();
        for position in 0..key.arity {
            stub_body.push_str(&format!(", NULL::TEXT AS t{}", position));
        }
        let stub = self.function(&name, key.arity, &stub_body);

        let body = format!(
            "SELECT * FROM {}({})",
            self.aggregation_name(key),
            Self::arguments(key.arity)
        );
        let interface = self.function(&name, key.arity, &body);

        (stub, interface)
    }
}
