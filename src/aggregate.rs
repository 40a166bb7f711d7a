// 🧱 Aggregation Pass - phase-tagged entity aggregation over one table
//
// Planned → ReferencesRewritten → SeriesMerged → commit
//
// Old entities are only deleted at commit, after references and series have
// been moved to the new identifiers.

use crate::diagnostics::{Diagnostics, WarningKind};
use crate::error::{ReductionError, Result};
use crate::grouping::{Group, Grouping, GroupingSpec, IdentityMapping};
use crate::model::{Entity, Network};
use crate::reducer::{reduce, KeyView, Reduced, ReductionRule};
use crate::references::{drop_dependents, rewrite_references};
use crate::rules::{RuleBook, RuleSource};
use crate::series::{co_aggregate, common_class, drop_member_columns, series_component};
use std::marker::PhantomData;
use tracing::{debug, info};

// ============================================================================
// GROUP RULES
// ============================================================================

/// Configured rules, with grouping attributes defaulting to the group key
/// when no specific rule names them
pub struct GroupRules<'a> {
    book: &'a RuleBook<ReductionRule>,
    key_attributes: Vec<String>,
}

impl<'a> GroupRules<'a> {
    pub fn new(book: &'a RuleBook<ReductionRule>, key_attributes: Vec<String>) -> Self {
        GroupRules {
            book,
            key_attributes,
        }
    }
}

impl RuleSource<ReductionRule> for GroupRules<'_> {
    fn rule_for(&self, component: &str, attribute: &str, class: Option<&str>) -> Result<ReductionRule> {
        if let Some(rule) = self.book.specific(component, attribute, class) {
            return Ok(rule.clone());
        }
        if self.key_attributes.iter().any(|a| a == attribute) {
            return Ok(ReductionRule::UseGroupKey);
        }
        self.book.rule_for(component, attribute, class)
    }
}

// ============================================================================
// PHASES
// ============================================================================

/// Groups computed and merged entities reduced; nothing written yet
#[derive(Debug)]
pub struct Planned;

/// Dependent reference columns point at the new identifiers and entities
/// referencing dropped ones are gone
#[derive(Debug)]
pub struct ReferencesRewritten;

/// Time-indexed tables follow the new identifiers
#[derive(Debug)]
pub struct SeriesMerged;

/// Summary of one committed pass
#[derive(Debug, Clone)]
pub struct AggregationReport {
    pub table: String,
    pub groups: usize,
    pub merged_entities: usize,
    pub dropped_entities: usize,
    pub rewritten_references: usize,
    pub dropped_dependents: usize,
    pub series_columns: usize,
    pub mapping: IdentityMapping,
}

/// One aggregation pass, owning the network until commit
pub struct AggregationPass<'n, Phase> {
    network: &'n mut Network,
    table: String,
    grouping: Grouping,
    mapping: IdentityMapping,
    merged: Vec<Entity>,
    class_attribute: Option<String>,
    rewritten_references: usize,
    dropped_dependents: usize,
    series_columns: usize,
    _phase: PhantomData<Phase>,
}

impl<'n, Phase> AggregationPass<'n, Phase> {
    fn into_phase<Next>(self) -> AggregationPass<'n, Next> {
        AggregationPass {
            network: self.network,
            table: self.table,
            grouping: self.grouping,
            mapping: self.mapping,
            merged: self.merged,
            class_attribute: self.class_attribute,
            rewritten_references: self.rewritten_references,
            dropped_dependents: self.dropped_dependents,
            series_columns: self.series_columns,
            _phase: PhantomData,
        }
    }

    pub fn grouping(&self) -> &Grouping {
        &self.grouping
    }

    pub fn mapping(&self) -> &IdentityMapping {
        &self.mapping
    }

    pub fn merged(&self) -> &[Entity] {
        &self.merged
    }
}

// ----------------------------------------------------------------------------
// Planned
// ----------------------------------------------------------------------------

impl<'n> AggregationPass<'n, Planned> {
    /// Group `table` and reduce every group into its merged entity
    pub fn plan<S: RuleSource<ReductionRule>>(
        network: &'n mut Network,
        table: &str,
        spec: &GroupingSpec,
        rules: &S,
        class_attribute: Option<&str>,
        diagnostics: &mut Diagnostics,
    ) -> Result<Self> {
        let source = network.require_table(table)?;
        if source.is_empty() {
            diagnostics.warn(WarningKind::EmptyInput, table, None, "no entities to aggregate");
        }

        let grouping = Grouping::build(source, spec, diagnostics)?;
        let mapping = grouping.mapping();
        let columns = source.columns().to_vec();

        let mut merged = Vec::with_capacity(grouping.groups.len());
        for group in &grouping.groups {
            let rows: Vec<&Entity> = group.members.iter().filter_map(|m| source.entity(m)).collect();
            let class = common_class(&rows, class_attribute);
            let key = KeyView {
                attributes: &grouping.attributes,
                values: &group.key_values,
            };

            let mut entity = Entity::new(group.new_id.clone());
            for attribute in &columns {
                let rule = rules.rule_for(table, attribute, class.as_deref())?;
                if let Reduced::Value(value) = reduce(&rows, attribute, &rule, &key) {
                    if !value.is_missing() {
                        entity.set(attribute.clone(), value);
                    }
                }
            }
            merged.push(entity);
        }

        debug!(
            "Planned {}: {} group(s) from {} entities",
            table,
            grouping.groups.len(),
            source.len()
        );

        Ok(AggregationPass {
            network,
            table: table.to_string(),
            grouping,
            mapping,
            merged,
            class_attribute: class_attribute.map(str::to_string),
            rewritten_references: 0,
            dropped_dependents: 0,
            series_columns: 0,
            _phase: PhantomData,
        })
    }

    /// Post-process merged entities before anything is written
    pub fn adjust(
        mut self,
        mut f: impl FnMut(&Group, &mut Entity) -> Result<()>,
    ) -> Result<Self> {
        for (group, entity) in self.grouping.groups.iter().zip(self.merged.iter_mut()) {
            f(group, entity)?;
        }
        Ok(self)
    }

    /// Point every reference to this table at the new identifiers and
    /// remove the entities that reference a dropped one
    pub fn rewrite_references(
        mut self,
        diagnostics: &mut Diagnostics,
    ) -> AggregationPass<'n, ReferencesRewritten> {
        self.rewritten_references = rewrite_references(self.network, &self.table, &self.mapping);
        self.dropped_dependents =
            drop_dependents(self.network, &self.table, &self.grouping.dropped, diagnostics);
        self.into_phase()
    }
}

// ----------------------------------------------------------------------------
// ReferencesRewritten
// ----------------------------------------------------------------------------

impl<'n> AggregationPass<'n, ReferencesRewritten> {
    /// Reduce member series columns into the new identifiers
    pub fn merge_series<S: RuleSource<ReductionRule>>(
        mut self,
        rules: &S,
        diagnostics: &mut Diagnostics,
    ) -> Result<AggregationPass<'n, SeriesMerged>> {
        self.series_columns = co_aggregate(
            self.network,
            &self.table,
            &self.grouping,
            rules,
            self.class_attribute.as_deref(),
            diagnostics,
        )?;
        Ok(self.into_phase())
    }

    /// Discard member series columns instead of merging them
    pub fn drop_series(self) -> AggregationPass<'n, SeriesMerged> {
        if !self.network.series_attributes(&self.table).is_empty() {
            debug!(
                "Dropping {} series of merged {} entities",
                series_component(&self.table),
                self.table
            );
        }
        drop_member_columns(self.network, &self.table, &self.grouping);
        self.into_phase()
    }
}

// ----------------------------------------------------------------------------
// SeriesMerged
// ----------------------------------------------------------------------------

impl AggregationPass<'_, SeriesMerged> {
    /// Delete the old entities and insert the merged ones
    pub fn commit(self) -> Result<AggregationReport> {
        let AggregationPass {
            network,
            table,
            grouping,
            mapping,
            merged,
            rewritten_references,
            dropped_dependents,
            series_columns,
            ..
        } = self;

        let target = network.require_table_mut(&table)?;
        let members: usize = grouping.groups.iter().map(|g| g.members.len()).sum();
        target.remove_all(
            grouping
                .groups
                .iter()
                .flat_map(|g| g.members.iter().map(String::as_str))
                .chain(grouping.dropped.iter().map(String::as_str)),
        );

        let created = merged.len();
        for entity in merged {
            if target.contains(&entity.id) {
                return Err(ReductionError::DuplicateIdentifier {
                    table: table.clone(),
                    id: entity.id,
                });
            }
            target.insert(entity);
        }

        info!(
            "Aggregated {}: {} → {} entities ({} dropped, {} references rewritten)",
            table,
            members + grouping.ungrouped.len() + grouping.dropped.len(),
            created + grouping.ungrouped.len(),
            grouping.dropped.len(),
            rewritten_references
        );

        Ok(AggregationReport {
            table,
            groups: grouping.groups.len(),
            merged_entities: members,
            dropped_entities: grouping.dropped.len(),
            rewritten_references,
            dropped_dependents,
            series_columns,
            mapping,
        })
    }
}

// ============================================================================
// ONE-SHOT
// ============================================================================

/// Plan, rewrite, merge series and commit in one call
pub fn aggregate_table(
    network: &mut Network,
    table: &str,
    spec: &GroupingSpec,
    rules: &RuleBook<ReductionRule>,
    class_attribute: Option<&str>,
    diagnostics: &mut Diagnostics,
) -> Result<AggregationReport> {
    let group_rules = GroupRules::new(rules, spec.key.attributes());
    AggregationPass::plan(network, table, spec, &group_rules, class_attribute, diagnostics)?
        .rewrite_references(diagnostics)
        .merge_series(&group_rules, diagnostics)?
        .commit()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouping::GroupingKey;
    use crate::model::{ComponentTable, TimeSeries, Value, BUSES, GENERATORS};
    use crate::references::check_consistency;
    use crate::rules::{ParseContext, RuleEntry, RuleTable, GLOBAL, OTHERS};

    fn create_test_network() -> Network {
        let mut network = Network::new(Vec::new());
        network.insert_table(ComponentTable::from_entities(
            BUSES,
            vec![Entity::new("A"), Entity::new("B")],
        ));
        network.insert_table(ComponentTable::from_entities(
            GENERATORS,
            vec![
                Entity::new("g1")
                    .with("bus", "A")
                    .with("carrier", "coal")
                    .with("p_nom", 100.0)
                    .with("marginal_cost", 10.0),
                Entity::new("g2")
                    .with("bus", "A")
                    .with("carrier", "coal")
                    .with("p_nom", 50.0)
                    .with("marginal_cost", 12.0),
                Entity::new("g3")
                    .with("bus", "B")
                    .with("carrier", "gas")
                    .with("p_nom", 200.0)
                    .with("marginal_cost", 7.0),
            ],
        ));
        network
    }

    fn create_test_rules() -> RuleBook<ReductionRule> {
        let table = RuleTable::from_entries(vec![
            RuleEntry::new("generators", "carrier", "use_group_key"),
            RuleEntry::new("generators", "p_nom", "sum"),
            RuleEntry::new("generators", "marginal_cost", "pick_by(p_nom,max)"),
            RuleEntry::new("generators_t", OTHERS, "sum"),
            RuleEntry::new(GLOBAL, OTHERS, "p_nom"),
        ]);
        RuleBook::build(&table, &ParseContext::default(), &mut Diagnostics::new()).unwrap()
    }

    #[test]
    fn test_carrier_aggregation_scenario() {
        let mut network = create_test_network();
        let spec = GroupingSpec::by(GroupingKey::Attribute("carrier".to_string()));
        let report = aggregate_table(
            &mut network,
            GENERATORS,
            &spec,
            &create_test_rules(),
            Some("carrier"),
            &mut Diagnostics::new(),
        )
        .unwrap();

        assert_eq!(report.groups, 2);
        let generators = network.table(GENERATORS).unwrap();
        assert_eq!(generators.len(), 2);
        assert_eq!(generators.get("coal", "p_nom"), &Value::Number(150.0));
        assert_eq!(generators.get("coal", "marginal_cost"), &Value::Number(10.0));
        assert_eq!(generators.get("gas", "p_nom"), &Value::Number(200.0));
        assert_eq!(generators.get("gas", "marginal_cost"), &Value::Number(7.0));
        assert_eq!(generators.get("coal", "carrier"), &Value::text("coal"));
    }

    #[test]
    fn test_node_aggregation_rewrites_dependents_and_series() {
        let mut network = create_test_network();
        let mut setpoints = TimeSeries::new(1);
        setpoints.insert("A", vec![Some(1.0)]).unwrap();
        setpoints.insert("B", vec![Some(2.0)]).unwrap();
        network.set_series(BUSES, "v_mag_pu_set", setpoints);

        let spec = GroupingSpec::by(GroupingKey::Constant("KR".to_string()));
        let rules = RuleBook::build(
            &RuleTable::from_entries(vec![RuleEntry::new(GLOBAL, OTHERS, "mean")]),
            &ParseContext::default(),
            &mut Diagnostics::new(),
        )
        .unwrap();

        aggregate_table(&mut network, BUSES, &spec, &rules, None, &mut Diagnostics::new()).unwrap();

        assert_eq!(network.table(BUSES).unwrap().ids().collect::<Vec<_>>(), vec!["KR"]);
        assert_eq!(network.table(GENERATORS).unwrap().get("g3", "bus"), &Value::text("KR"));
        assert_eq!(
            network.series(BUSES, "v_mag_pu_set").unwrap().column("KR").unwrap(),
            &[Some(1.5)]
        );
        assert!(check_consistency(&network).is_ok());
    }

    #[test]
    fn test_phases_in_order_with_dropped_series() {
        let mut network = create_test_network();
        let mut p_max_pu = TimeSeries::new(1);
        p_max_pu.insert("g1", vec![Some(0.5)]).unwrap();
        network.set_series(GENERATORS, "p_max_pu", p_max_pu);

        let rules = create_test_rules();
        let spec = GroupingSpec::by(GroupingKey::Attribute("carrier".to_string()))
            .with_name_template("{key}_aggregated");
        let group_rules = GroupRules::new(&rules, spec.key.attributes());
        let mut diagnostics = Diagnostics::new();

        let planned = AggregationPass::plan(
            &mut network,
            GENERATORS,
            &spec,
            &group_rules,
            None,
            &mut diagnostics,
        )
        .unwrap();
        assert_eq!(planned.mapping().apply("g2"), "coal_aggregated");

        let report = planned
            .adjust(|_, entity| {
                entity.set("committable", Value::Bool(false));
                Ok(())
            })
            .unwrap()
            .rewrite_references(&mut diagnostics)
            .drop_series()
            .commit()
            .unwrap();

        assert_eq!(report.merged_entities, 3);
        assert!(network.series(GENERATORS, "p_max_pu").unwrap().is_empty());
        assert_eq!(
            network.table(GENERATORS).unwrap().get("gas_aggregated", "committable"),
            &Value::Bool(false)
        );
        // Grouping attribute fell back to the group key, not the global rule
        assert_eq!(
            network.table(GENERATORS).unwrap().get("gas_aggregated", "carrier"),
            &Value::text("gas")
        );
    }

    #[test]
    fn test_dropped_node_removes_its_dependents() {
        let mut network = Network::new(Vec::new());
        network.insert_table(ComponentTable::from_entities(
            BUSES,
            vec![
                Entity::new("b1").with("region", "North"),
                Entity::new("b2").with("region", "North"),
                Entity::new("b3"),
            ],
        ));
        network.insert_table(ComponentTable::from_entities(
            GENERATORS,
            vec![
                Entity::new("g1").with("bus", "b1").with("p_nom", 10.0),
                Entity::new("g3").with("bus", "b3").with("p_nom", 20.0),
            ],
        ));
        network.insert_table(ComponentTable::from_entities(
            crate::model::LINES,
            vec![
                Entity::new("l12").with("bus0", "b1").with("bus1", "b2"),
                Entity::new("l13").with("bus0", "b1").with("bus1", "b3"),
            ],
        ));
        let mut p_max_pu = TimeSeries::new(1);
        p_max_pu.insert("g1", vec![Some(0.4)]).unwrap();
        p_max_pu.insert("g3", vec![Some(0.9)]).unwrap();
        network.set_series(GENERATORS, "p_max_pu", p_max_pu);

        let spec = GroupingSpec::by(GroupingKey::Attribute("region".to_string()))
            .with_missing(crate::grouping::MissingKeyPolicy::Drop);
        let rules = RuleBook::build(
            &RuleTable::from_entries(vec![RuleEntry::new(GLOBAL, OTHERS, "mean")]),
            &ParseContext::default(),
            &mut Diagnostics::new(),
        )
        .unwrap();
        let mut diagnostics = Diagnostics::new();

        let report = aggregate_table(&mut network, BUSES, &spec, &rules, None, &mut diagnostics).unwrap();

        assert_eq!(report.dropped_entities, 1);
        assert_eq!(report.dropped_dependents, 2);
        assert_eq!(network.table(GENERATORS).unwrap().ids().collect::<Vec<_>>(), vec!["g1"]);
        assert_eq!(
            network.table(crate::model::LINES).unwrap().ids().collect::<Vec<_>>(),
            vec!["l12"]
        );
        assert!(!network.series(GENERATORS, "p_max_pu").unwrap().contains("g3"));
        assert_eq!(diagnostics.count(WarningKind::DroppedDependent), 2);
        assert!(check_consistency(&network).is_ok());
    }

    #[test]
    fn test_missing_rule_aborts_before_mutation() {
        let mut network = create_test_network();
        let before = network.clone();
        let rules = RuleBook::build(
            &RuleTable::from_entries(vec![RuleEntry::new("generators", "p_nom", "sum")]),
            &ParseContext::default(),
            &mut Diagnostics::new(),
        )
        .unwrap();
        let spec = GroupingSpec::by(GroupingKey::Attribute("carrier".to_string()));

        let err = aggregate_table(&mut network, GENERATORS, &spec, &rules, None, &mut Diagnostics::new())
            .unwrap_err();
        assert!(matches!(err, ReductionError::MissingRule { .. }));
        assert_eq!(network.table(GENERATORS), before.table(GENERATORS));
    }
}
