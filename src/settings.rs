use serde::{Deserialize, Serialize};

use crate::primitives::{Activation, Aggregation};

/// Global defaults applied wherever a rule or predicate carries no override,
/// plus the namespaces the generated DDL lives in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub rule_activation: Activation,
    pub relation_activation: Activation,
    pub aggregation: Aggregation,
    /// Schema holding the generated predicate functions.
    pub schema: String,
    /// Schema holding the helper primitives.
    pub helper_schema: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rule_activation: Activation::Identity,
            relation_activation: Activation::Identity,
            aggregation: Aggregation::Avg,
            schema: "sqlogic".to_owned(),
            helper_schema: "sqlogic_std".to_owned(),
        }
    }
}
