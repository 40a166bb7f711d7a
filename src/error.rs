// ❌ Engine Errors - fatal conditions that abort a pipeline run
// Every variant names the offending table and attribute

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReductionError {
    // ========================================================================
    // CONFIGURATION
    // ========================================================================
    #[error("no rule defined for {component}.{attribute}{}", class_suffix(.class))]
    MissingRule {
        component: String,
        attribute: String,
        class: Option<String>,
    },

    #[error("invalid rule '{rule}' for {component}.{attribute}: {reason}")]
    InvalidRule {
        component: String,
        attribute: String,
        rule: String,
        reason: String,
    },

    #[error("component table '{table}' has no grouping attribute '{attribute}'")]
    MissingGroupingAttribute { table: String, attribute: String },

    #[error("malformed composite grouping key for '{table}': {reason}")]
    MalformedCompositeKey { table: String, reason: String },

    #[error("unknown component table '{0}'")]
    UnknownTable(String),

    #[error("aggregated identifier '{id}' in '{table}' collides with an ungrouped entity")]
    DuplicateIdentifier { table: String, id: String },

    #[error("groups {first:?} and {second:?} of '{table}' both map to identifier '{id}'")]
    DuplicateGroupIdentifier {
        table: String,
        id: String,
        first: Vec<String>,
        second: Vec<String>,
    },

    // ========================================================================
    // REFERENTIAL INTEGRITY
    // ========================================================================
    #[error("{table}.{attribute} of '{entity}' references missing {target} entity '{value}'")]
    DanglingReference {
        table: String,
        attribute: String,
        entity: String,
        target: String,
        value: String,
    },

    #[error("time series {table}.{attribute} has column '{entity}' with no matching entity")]
    OrphanSeriesColumn {
        table: String,
        attribute: String,
        entity: String,
    },

    // ========================================================================
    // SHAPE / NUMERIC
    // ========================================================================
    #[error("series '{entity}' has {found} rows, expected {expected}")]
    SeriesLength {
        entity: String,
        expected: usize,
        found: usize,
    },

    /// Only raised in strict mode; otherwise a sentinel is substituted
    #[error("degenerate {what}: {detail}")]
    Degenerate { what: String, detail: String },
}

fn class_suffix(class: &Option<String>) -> String {
    match class {
        Some(c) => format!(" (class '{}')", c),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, ReductionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_rule_message_names_class() {
        let err = ReductionError::MissingRule {
            component: "generators_t".to_string(),
            attribute: "p_max_pu".to_string(),
            class: Some("solar".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "no rule defined for generators_t.p_max_pu (class 'solar')"
        );
    }

    #[test]
    fn test_dangling_reference_message() {
        let err = ReductionError::DanglingReference {
            table: "generators".to_string(),
            attribute: "bus".to_string(),
            entity: "g1".to_string(),
            target: "buses".to_string(),
            value: "B9".to_string(),
        };
        assert!(err.to_string().contains("generators.bus"));
        assert!(err.to_string().contains("'B9'"));
    }
}
