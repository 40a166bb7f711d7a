// 🧩 Entity Grouping & Identity Mapping
// Group key per entity → deterministic new identifier + contributing old identifiers

use crate::diagnostics::{Diagnostics, WarningKind};
use crate::error::{ReductionError, Result};
use crate::model::ComponentTable;
use anyhow::Context as AnyhowContext;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::debug;

// ============================================================================
// GROUPING KEY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupingKey {
    /// One attribute (region, carrier, cc_group, ...)
    Attribute(String),

    /// Tuple of attributes, e.g. (carrier, bus) or (bus0, bus1, v_nom)
    Composite(Vec<String>),

    /// Every entity in one group (single-node models)
    Constant(String),
}

impl GroupingKey {
    /// Build from configured attribute names
    pub fn from_attributes(attributes: &[String]) -> Self {
        match attributes {
            [single] => GroupingKey::Attribute(single.clone()),
            many => GroupingKey::Composite(many.to_vec()),
        }
    }

    /// Attributes read per entity, in key order
    pub fn attributes(&self) -> Vec<String> {
        match self {
            GroupingKey::Attribute(a) => vec![a.clone()],
            GroupingKey::Composite(list) => list.clone(),
            GroupingKey::Constant(_) => Vec::new(),
        }
    }
}

/// What to do with an entity whose grouping value is missing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissingKeyPolicy {
    /// Remove the entity (warning)
    Drop,

    /// Leave the entity untouched under its own identifier (warning)
    #[default]
    Keep,
}

// ============================================================================
// NAME STANDARDIZATION
// ============================================================================

/// Maps official/long names to short names; unknown names pass through
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NameStandardizer {
    names: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct NameRow {
    short: String,
    official: String,
}

impl NameStandardizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: `official` and `short` both map to `short`
    pub fn with_name(mut self, official: &str, short: &str) -> Self {
        self.insert(official, short);
        self
    }

    fn insert(&mut self, official: &str, short: &str) {
        let short = short.trim().to_string();
        self.names.insert(official.trim().to_string(), short.clone());
        self.names.insert(short.clone(), short);
    }

    /// Load a mapping CSV with `short,official` columns
    pub fn from_csv<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path.as_ref())
            .with_context(|| format!("Failed to open name mapping: {:?}", path.as_ref()))?;

        let mut standardizer = NameStandardizer::new();
        for row in reader.deserialize() {
            let row: NameRow = row.context("Failed to parse name mapping row")?;
            standardizer.insert(&row.official, &row.short);
        }
        Ok(standardizer)
    }

    pub fn standardize(&self, name: &str) -> String {
        let trimmed = name.trim();
        self.names
            .get(trimmed)
            .cloned()
            .unwrap_or_else(|| trimmed.to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

// ============================================================================
// GROUPING SPEC
// ============================================================================

#[derive(Debug, Clone)]
pub struct GroupingSpec {
    pub key: GroupingKey,
    pub missing: MissingKeyPolicy,

    /// Applied to each key component before grouping
    pub standardizer: Option<NameStandardizer>,

    /// New identifier pattern; `{key}` is replaced by the joined key
    pub name_template: Option<String>,
}

impl GroupingSpec {
    pub fn by(key: GroupingKey) -> Self {
        GroupingSpec {
            key,
            missing: MissingKeyPolicy::default(),
            standardizer: None,
            name_template: None,
        }
    }

    pub fn with_missing(mut self, missing: MissingKeyPolicy) -> Self {
        self.missing = missing;
        self
    }

    pub fn with_standardizer(mut self, standardizer: NameStandardizer) -> Self {
        self.standardizer = Some(standardizer);
        self
    }

    pub fn with_name_template(mut self, template: impl Into<String>) -> Self {
        self.name_template = Some(template.into());
        self
    }

    fn new_identifier(&self, values: &[String]) -> String {
        let joined = values.join("_");
        match &self.name_template {
            Some(template) => template.replace("{key}", &joined),
            None => joined,
        }
    }
}

// ============================================================================
// GROUPS
// ============================================================================

/// One output entity and the entities it replaces
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub new_id: String,
    pub key_values: Vec<String>,
    pub members: Vec<String>,
}

/// Result of grouping one table
#[derive(Debug, Clone, PartialEq)]
pub struct Grouping {
    /// Grouping attributes in key order
    pub attributes: Vec<String>,

    /// Groups ordered by key
    pub groups: Vec<Group>,

    /// Entities left under their own identifier
    pub ungrouped: Vec<String>,

    /// Entities removed because their key was missing
    pub dropped: Vec<String>,
}

impl Grouping {
    /// Group the entities of `table` according to `spec`
    pub fn build(
        table: &ComponentTable,
        spec: &GroupingSpec,
        diagnostics: &mut Diagnostics,
    ) -> Result<Self> {
        let attributes = spec.key.attributes();

        if let GroupingKey::Composite(list) = &spec.key {
            if list.is_empty() {
                return Err(ReductionError::MalformedCompositeKey {
                    table: table.name().to_string(),
                    reason: "no attributes given".to_string(),
                });
            }
            let mut seen = std::collections::HashSet::new();
            if let Some(duplicate) = list.iter().find(|a| !seen.insert(a.as_str())) {
                return Err(ReductionError::MalformedCompositeKey {
                    table: table.name().to_string(),
                    reason: format!("attribute '{}' listed twice", duplicate),
                });
            }
        }

        for attribute in &attributes {
            if !table.has_column(attribute) {
                return Err(ReductionError::MissingGroupingAttribute {
                    table: table.name().to_string(),
                    attribute: attribute.clone(),
                });
            }
        }

        let mut by_key: BTreeMap<Vec<String>, Vec<String>> = BTreeMap::new();
        let mut ungrouped = Vec::new();
        let mut dropped = Vec::new();

        for entity in table.entities() {
            let values = match &spec.key {
                GroupingKey::Constant(name) => Some(vec![name.clone()]),
                _ => attributes
                    .iter()
                    .map(|a| {
                        entity.get(a).to_key().map(|k| match &spec.standardizer {
                            Some(s) => s.standardize(&k),
                            None => k,
                        })
                    })
                    .collect::<Option<Vec<String>>>(),
            };

            match values {
                Some(values) => by_key.entry(values).or_default().push(entity.id.clone()),
                None => {
                    let action = match spec.missing {
                        MissingKeyPolicy::Drop => {
                            dropped.push(entity.id.clone());
                            "dropped"
                        }
                        MissingKeyPolicy::Keep => {
                            ungrouped.push(entity.id.clone());
                            "left ungrouped"
                        }
                    };
                    diagnostics.warn(
                        WarningKind::MissingGroupValue,
                        table.name(),
                        Some(&attributes.join(",")),
                        format!("'{}' has no grouping value, {}", entity.id, action),
                    );
                }
            }
        }

        let groups: Vec<Group> = by_key
            .into_iter()
            .map(|(key_values, members)| Group {
                new_id: spec.new_identifier(&key_values),
                key_values,
                members,
            })
            .collect();

        let mut claimed: HashMap<&str, &Group> = HashMap::new();
        for group in &groups {
            if let Some(first) = claimed.insert(group.new_id.as_str(), group) {
                return Err(ReductionError::DuplicateGroupIdentifier {
                    table: table.name().to_string(),
                    id: group.new_id.clone(),
                    first: first.key_values.clone(),
                    second: group.key_values.clone(),
                });
            }
        }

        for group in &groups {
            if ungrouped.contains(&group.new_id) {
                return Err(ReductionError::DuplicateIdentifier {
                    table: table.name().to_string(),
                    id: group.new_id.clone(),
                });
            }
            debug!(
                "{}: group '{}' ← {} member(s)",
                table.name(),
                group.new_id,
                group.members.len()
            );
        }

        Ok(Grouping {
            attributes: match &spec.key {
                GroupingKey::Constant(_) => Vec::new(),
                _ => attributes,
            },
            groups,
            ungrouped,
            dropped,
        })
    }

    /// old identifier → new identifier for every grouped entity
    pub fn mapping(&self) -> IdentityMapping {
        let mut mapping = IdentityMapping::new();
        for group in &self.groups {
            for member in &group.members {
                mapping.insert(member, &group.new_id);
            }
        }
        mapping
    }
}

// ============================================================================
// IDENTITY MAPPING
// ============================================================================

/// old identifier → new identifier for one aggregation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityMapping {
    map: HashMap<String, String>,
}

impl IdentityMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, old: &str, new: &str) {
        self.map.insert(old.to_string(), new.to_string());
    }

    pub fn get(&self, old: &str) -> Option<&str> {
        self.map.get(old).map(|s| s.as_str())
    }

    /// `mapping.get(v, v)`: unmapped values pass through
    pub fn apply<'a>(&'a self, value: &'a str) -> &'a str {
        self.get(value).unwrap_or(value)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Distinct new identifiers, sorted
    pub fn targets(&self) -> Vec<&str> {
        let mut targets: Vec<&str> = self.map.values().map(|s| s.as_str()).collect();
        targets.sort_unstable();
        targets.dedup();
        targets
    }
}

// ============================================================================
// TESTS
// ============================================================================
