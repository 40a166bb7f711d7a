// ⚡ Edge Merger - collapse parallel transmission edges between the same node pair
// Endpoints rewritten → self-loops dropped → grouped by (from, to[, class]) → reduced

use crate::aggregate::{AggregationPass, AggregationReport};
use crate::config::EdgeConfig;
use crate::diagnostics::{Diagnostics, WarningKind};
use crate::error::{ReductionError, Result};
use crate::grouping::{GroupingKey, GroupingSpec, IdentityMapping, MissingKeyPolicy};
use crate::model::{Network, Value};
use crate::reducer::ReductionRule;
use crate::references::rewrite_column;
use crate::rules::{RuleBook, RuleSource};
use tracing::{debug, info};

// ============================================================================
// EDGE RULES
// ============================================================================

/// Configured rules, then the built-in edge defaults, then `others`
pub struct EdgeRules<'a> {
    book: &'a RuleBook<ReductionRule>,
    config: &'a EdgeConfig,
    table: &'a str,
}

impl<'a> EdgeRules<'a> {
    pub fn new(book: &'a RuleBook<ReductionRule>, config: &'a EdgeConfig, table: &'a str) -> Self {
        EdgeRules {
            book,
            config,
            table,
        }
    }

    fn builtin(&self, attribute: &str) -> Option<ReductionRule> {
        let named = |list: &[String]| list.iter().any(|a| a == attribute);

        if named(self.config.capacity_attributes.as_slice()) || attribute == self.config.parallel_attribute {
            Some(ReductionRule::Sum)
        } else if named(self.config.impedance_attributes.as_slice()) {
            Some(ReductionRule::WeightedMean(self.config.parallel_attribute.clone()))
        } else if attribute == self.config.from_attribute
            || attribute == self.config.to_attribute
            || self.config.class_attribute.as_deref() == Some(attribute)
        {
            Some(ReductionRule::UseGroupKey)
        } else {
            None
        }
    }
}

impl RuleSource<ReductionRule> for EdgeRules<'_> {
    fn rule_for(&self, component: &str, attribute: &str, class: Option<&str>) -> Result<ReductionRule> {
        if let Some(rule) = self.book.specific(component, attribute, class) {
            return Ok(rule.clone());
        }
        if component == self.table {
            if let Some(rule) = self.builtin(attribute) {
                return Ok(rule);
            }
        }
        self.book.rule_for(component, attribute, class)
    }
}

// ============================================================================
// MERGE
// ============================================================================

#[derive(Debug, Clone)]
pub struct EdgeReport {
    pub table: String,
    pub self_loops_dropped: usize,
    pub unconstrained: usize,
    pub aggregation: AggregationReport,
}

/// Identifier prefix for merged edges: `lines` → `line`
fn edge_prefix(table: &str) -> &str {
    table.strip_suffix('s').unwrap_or(table)
}

/// Merge parallel edges of `table`.
///
/// `node_mapping` is applied to the endpoints first; pass `None` when the
/// node pass has already rewritten them. Returns `Ok(None)` when the table
/// does not exist.
pub fn merge_edges(
    network: &mut Network,
    table: &str,
    node_mapping: Option<&IdentityMapping>,
    rules: &RuleBook<ReductionRule>,
    config: &EdgeConfig,
    strict: bool,
    diagnostics: &mut Diagnostics,
) -> Result<Option<EdgeReport>> {
    let Some(edges) = network.table_mut(table) else {
        debug!("No {} table, skipping edge merge", table);
        return Ok(None);
    };

    // 1. Endpoints follow the node mapping
    if let Some(mapping) = node_mapping {
        rewrite_column(edges, &config.from_attribute, mapping);
        rewrite_column(edges, &config.to_attribute, mapping);
    }

    // Optional: A→B and B→A become the same pair
    if config.canonical_direction {
        for edge in edges.entities_mut() {
            let from = edge.get(&config.from_attribute).to_key();
            let to = edge.get(&config.to_attribute).to_key();
            if let (Some(from), Some(to)) = (from, to) {
                if from > to {
                    edge.set(config.from_attribute.clone(), Value::text(to));
                    edge.set(config.to_attribute.clone(), Value::text(from));
                }
            }
        }
    }

    // 2. Self-loops
    let self_loops: Vec<String> = edges
        .entities()
        .iter()
        .filter(|e| {
            let from = e.get(&config.from_attribute).to_key();
            from.is_some() && from == e.get(&config.to_attribute).to_key()
        })
        .map(|e| e.id.clone())
        .collect();

    let mut self_loops_dropped = 0;
    if config.drop_self_loops && !self_loops.is_empty() {
        edges.remove_all(self_loops.iter().map(String::as_str));
        network.remove_series_columns(table, &self_loops);
        self_loops_dropped = self_loops.len();
        diagnostics.warn(
            WarningKind::DroppedSelfLoop,
            table,
            None,
            format!("removed {} edge(s) connecting a node to itself", self_loops_dropped),
        );
    }

    // 3. Group by ordered endpoint pair (+ class)
    let mut key = vec![config.from_attribute.clone(), config.to_attribute.clone()];
    if let Some(class) = &config.class_attribute {
        key.push(class.clone());
    }
    let spec = GroupingSpec::by(GroupingKey::Composite(key))
        .with_missing(MissingKeyPolicy::Keep)
        .with_name_template(format!("{}_{{key}}", edge_prefix(table)));

    // 4. Reduce, with the zero-capacity sentinel
    let edge_rules = EdgeRules::new(rules, config, table);
    let mut unconstrained = 0;
    let planned = AggregationPass::plan(
        network,
        table,
        &spec,
        &edge_rules,
        config.class_attribute.as_deref(),
        diagnostics,
    )?
    .adjust(|group, edge| {
        for attribute in &config.capacity_attributes {
            if edge.get(attribute).as_f64() != Some(0.0) {
                continue;
            }
            if strict {
                return Err(ReductionError::Degenerate {
                    what: format!("{}.{}", table, attribute),
                    detail: format!("merged capacity of '{}' is zero", group.new_id),
                });
            }
            edge.set(attribute.clone(), Value::Number(config.unconstrained_capacity));
            unconstrained += 1;
        }
        Ok(())
    })?;

    if unconstrained > 0 {
        diagnostics.warn(
            WarningKind::UnconstrainedCapacity,
            table,
            None,
            format!(
                "{} merged edge capacity value(s) were zero, set to {}",
                unconstrained, config.unconstrained_capacity
            ),
        );
    }

    // 5. Emit merged edges; series merged only when configured
    let rewritten = planned.rewrite_references(diagnostics);
    let merged = if config.merge_series {
        rewritten.merge_series(&edge_rules, diagnostics)?
    } else {
        rewritten.drop_series()
    };
    let aggregation = merged.commit()?;

    info!(
        "Merged {}: {} group(s), {} self-loop(s) dropped",
        table, aggregation.groups, self_loops_dropped
    );

    Ok(Some(EdgeReport {
        table: table.to_string(),
        self_loops_dropped,
        unconstrained,
        aggregation,
    }))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ComponentTable, Entity, TimeSeries, BUSES, LINES, LINKS};
    use crate::references::check_consistency;
    use crate::rules::{ParseContext, RuleEntry, RuleTable, GLOBAL, OTHERS};

    fn create_test_line(id: &str, bus0: &str, bus1: &str, r: f64, n: f64, s_nom: f64) -> Entity {
        Entity::new(id)
            .with("bus0", bus0)
            .with("bus1", bus1)
            .with("r", r)
            .with("num_parallel", n)
            .with("s_nom", s_nom)
            .with("v_nom", 345.0)
    }

    fn create_test_network(lines: Vec<Entity>) -> Network {
        let mut network = Network::new(Vec::new());
        network.insert_table(ComponentTable::from_entities(
            BUSES,
            vec![Entity::new("A"), Entity::new("B"), Entity::new("C")],
        ));
        network.insert_table(ComponentTable::from_entities(LINES, lines));
        network
    }

    fn create_test_rules(entries: Vec<RuleEntry>) -> RuleBook<ReductionRule> {
        RuleBook::build(
            &RuleTable::from_entries(entries),
            &ParseContext::default(),
            &mut Diagnostics::new(),
        )
        .unwrap()
    }

    fn merge(network: &mut Network, config: &EdgeConfig, diagnostics: &mut Diagnostics) -> EdgeReport {
        let rules = create_test_rules(vec![RuleEntry::new(GLOBAL, OTHERS, "mean")]);
        merge_edges(network, LINES, None, &rules, config, false, diagnostics)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_parallel_edges_equal_counts() {
        let mut network = create_test_network(vec![
            create_test_line("l1", "A", "B", 0.1, 1.0, 100.0),
            create_test_line("l2", "A", "B", 0.2, 1.0, 200.0),
        ]);
        merge(&mut network, &EdgeConfig::default(), &mut Diagnostics::new());

        let lines = network.table(LINES).unwrap();
        assert_eq!(lines.len(), 1);
        let r = lines.get("line_A_B", "r").as_f64().unwrap();
        assert!((r - 0.15).abs() < 1e-12);
        assert_eq!(lines.get("line_A_B", "s_nom"), &Value::Number(300.0));
        assert_eq!(lines.get("line_A_B", "num_parallel"), &Value::Number(2.0));
        assert_eq!(lines.get("line_A_B", "bus0"), &Value::text("A"));
        assert_eq!(lines.get("line_A_B", "bus1"), &Value::text("B"));
    }

    #[test]
    fn test_impedance_weighted_by_parallel_count() {
        let mut network = create_test_network(vec![
            create_test_line("l1", "A", "B", 0.1, 1.0, 100.0),
            create_test_line("l2", "A", "B", 0.2, 3.0, 100.0),
        ]);
        merge(&mut network, &EdgeConfig::default(), &mut Diagnostics::new());

        let r = network.table(LINES).unwrap().get("line_A_B", "r").as_f64().unwrap();
        assert!((r - (0.1 * 1.0 + 0.2 * 3.0) / 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_node_mapping_creates_self_loops() {
        let mut network = create_test_network(vec![
            create_test_line("l1", "A", "B", 0.1, 1.0, 100.0),
            create_test_line("l2", "B", "C", 0.1, 1.0, 100.0),
        ]);
        let mut mapping = IdentityMapping::new();
        mapping.insert("A", "North");
        mapping.insert("B", "North");
        mapping.insert("C", "South");

        let rules = create_test_rules(vec![RuleEntry::new(GLOBAL, OTHERS, "mean")]);
        let mut diagnostics = Diagnostics::new();
        let report = merge_edges(
            &mut network,
            LINES,
            Some(&mapping),
            &rules,
            &EdgeConfig::default(),
            false,
            &mut diagnostics,
        )
        .unwrap()
        .unwrap();

        assert_eq!(report.self_loops_dropped, 1);
        assert_eq!(diagnostics.count(WarningKind::DroppedSelfLoop), 1);
        let ids: Vec<&str> = network.table(LINES).unwrap().ids().collect();
        assert_eq!(ids, vec!["line_North_South"]);
    }

    #[test]
    fn test_direction_sensitive_unless_canonical() {
        let lines = vec![
            create_test_line("l1", "A", "B", 0.1, 1.0, 100.0),
            create_test_line("l2", "B", "A", 0.1, 1.0, 100.0),
        ];

        let mut network = create_test_network(lines.clone());
        merge(&mut network, &EdgeConfig::default(), &mut Diagnostics::new());
        assert_eq!(network.table(LINES).unwrap().len(), 2);

        let mut network = create_test_network(lines);
        let config = EdgeConfig {
            canonical_direction: true,
            ..EdgeConfig::default()
        };
        merge(&mut network, &config, &mut Diagnostics::new());
        assert_eq!(network.table(LINES).unwrap().len(), 1);
    }

    #[test]
    fn test_class_attribute_splits_groups() {
        let mut network = create_test_network(vec![
            create_test_line("l1", "A", "B", 0.1, 1.0, 100.0),
            create_test_line("l2", "A", "B", 0.1, 1.0, 100.0).with("v_nom", 154.0),
        ]);
        let config = EdgeConfig {
            class_attribute: Some("v_nom".to_string()),
            ..EdgeConfig::default()
        };
        merge(&mut network, &config, &mut Diagnostics::new());

        let lines = network.table(LINES).unwrap();
        assert!(lines.contains("line_A_B_154"));
        assert!(lines.contains("line_A_B_345"));
        assert_eq!(lines.get("line_A_B_345", "v_nom"), &Value::Number(345.0));
    }

    #[test]
    fn test_zero_capacity_becomes_sentinel() {
        let mut network = create_test_network(vec![
            create_test_line("l1", "A", "B", 0.1, 1.0, 0.0),
            create_test_line("l2", "A", "B", 0.1, 1.0, 0.0),
        ]);
        let mut diagnostics = Diagnostics::new();
        let report = merge(&mut network, &EdgeConfig::default(), &mut diagnostics);

        assert_eq!(report.unconstrained, 1);
        assert_eq!(
            network.table(LINES).unwrap().get("line_A_B", "s_nom"),
            &Value::Number(1e6)
        );
        assert_eq!(diagnostics.count(WarningKind::UnconstrainedCapacity), 1);
    }

    #[test]
    fn test_zero_capacity_strict_mode_raises() {
        let mut network = create_test_network(vec![create_test_line("l1", "A", "B", 0.1, 1.0, 0.0)]);
        let rules = create_test_rules(vec![RuleEntry::new(GLOBAL, OTHERS, "mean")]);
        let err = merge_edges(
            &mut network,
            LINES,
            None,
            &rules,
            &EdgeConfig::default(),
            true,
            &mut Diagnostics::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ReductionError::Degenerate { .. }));
    }

    #[test]
    fn test_configured_rule_overrides_builtin() {
        let mut network = create_test_network(vec![
            create_test_line("l1", "A", "B", 0.1, 1.0, 100.0),
            create_test_line("l2", "A", "B", 0.2, 1.0, 200.0),
        ]);
        let rules = create_test_rules(vec![
            RuleEntry::new("lines", "s_nom", "max"),
            RuleEntry::new(GLOBAL, OTHERS, "mean"),
        ]);
        merge_edges(
            &mut network,
            LINES,
            None,
            &rules,
            &EdgeConfig::default(),
            false,
            &mut Diagnostics::new(),
        )
        .unwrap();
        assert_eq!(
            network.table(LINES).unwrap().get("line_A_B", "s_nom"),
            &Value::Number(200.0)
        );
    }

    #[test]
    fn test_flow_series_dropped_by_default() {
        let mut network = create_test_network(vec![
            create_test_line("l1", "A", "B", 0.1, 1.0, 100.0),
            create_test_line("l2", "A", "B", 0.2, 1.0, 200.0),
        ]);
        let mut p0 = TimeSeries::new(1);
        p0.insert("l1", vec![Some(10.0)]).unwrap();
        p0.insert("l2", vec![Some(5.0)]).unwrap();
        network.set_series(LINES, "p0", p0.clone());

        merge(&mut network, &EdgeConfig::default(), &mut Diagnostics::new());
        assert!(network.series(LINES, "p0").unwrap().is_empty());
        assert!(check_consistency(&network).is_ok());

        // Co-aggregated when enabled
        let mut network = create_test_network(vec![
            create_test_line("l1", "A", "B", 0.1, 1.0, 100.0),
            create_test_line("l2", "A", "B", 0.2, 1.0, 200.0),
        ]);
        network.set_series(LINES, "p0", p0);
        let rules = create_test_rules(vec![
            RuleEntry::new("lines_t", OTHERS, "sum"),
            RuleEntry::new(GLOBAL, OTHERS, "mean"),
        ]);
        let config = EdgeConfig {
            merge_series: true,
            ..EdgeConfig::default()
        };
        merge_edges(&mut network, LINES, None, &rules, &config, false, &mut Diagnostics::new())
            .unwrap();
        assert_eq!(
            network.series(LINES, "p0").unwrap().column("line_A_B").unwrap(),
            &[Some(15.0)]
        );
    }

    #[test]
    fn test_missing_edge_table_is_skipped() {
        let mut network = create_test_network(Vec::new());
        let rules = create_test_rules(Vec::new());
        let report = merge_edges(
            &mut network,
            LINKS,
            None,
            &rules,
            &EdgeConfig::default(),
            false,
            &mut Diagnostics::new(),
        )
        .unwrap();
        assert!(report.is_none());
    }
}
