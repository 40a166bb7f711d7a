// 🏷️ Rule Table + Resolver - Rules as Data
// (component, attribute, class) → rule, with "specific key → fallback default" lookup

use crate::diagnostics::Diagnostics;
use crate::error::{ReductionError, Result};
use crate::model::Value;
use anyhow::Context as AnyhowContext;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// Attribute name of a table-wide default rule
pub const OTHERS: &str = "others";

/// Component name of a global default rule
pub const GLOBAL: &str = "*";

// ============================================================================
// RULE ENTRY
// ============================================================================

/// One row of a rule table, as written in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEntry {
    /// Table the rule applies to (`generators`, or `generators_t` for its series)
    pub component: String,

    /// Attribute name, or `others` for the table default
    pub attribute: String,

    /// Optional class selector (matched against the class attribute, e.g. carrier)
    #[serde(default, alias = "carrier")]
    pub class: Option<String>,

    /// Rule name, e.g. `sum`, `weighted_mean(num_parallel)`, `pick_by(p_nom,max)`
    pub rule: String,

    /// Only used by `fixed`
    #[serde(default)]
    pub value: Option<String>,

    /// Free text, ignored
    #[serde(default)]
    pub notes: Option<String>,
}

impl RuleEntry {
    pub fn new(component: &str, attribute: &str, rule: &str) -> Self {
        RuleEntry {
            component: component.to_string(),
            attribute: attribute.to_string(),
            class: None,
            rule: rule.to_string(),
            value: None,
            notes: None,
        }
    }

    /// Builder: restrict to one class
    pub fn for_class(mut self, class: &str) -> Self {
        self.class = Some(class.to_string());
        self
    }

    /// Builder: fixed value
    pub fn with_value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    /// Class selector with blanks treated as "no class"
    pub fn class_selector(&self) -> Option<&str> {
        self.class
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// Parsed `value` column (Missing when absent)
    pub fn fixed_value(&self) -> Value {
        self.value
            .as_deref()
            .map(Value::parse)
            .unwrap_or(Value::Missing)
    }

    pub(crate) fn invalid(&self, reason: impl Into<String>) -> ReductionError {
        ReductionError::InvalidRule {
            component: self.component.clone(),
            attribute: self.attribute.clone(),
            rule: self.rule.clone(),
            reason: reason.into(),
        }
    }
}

// ============================================================================
// RULE TABLE
// ============================================================================

/// Ordered rule entries; later entries override earlier ones for the same key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleTable {
    entries: Vec<RuleEntry>,
}

impl RuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<RuleEntry>) -> Self {
        RuleTable { entries }
    }

    /// Load rules from a CSV file with a header row
    pub fn from_csv<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path.as_ref())
            .with_context(|| format!("Failed to open rule table: {:?}", path.as_ref()))?;

        let mut entries = Vec::new();
        for (line, row) in reader.deserialize().enumerate() {
            let entry: RuleEntry = row.with_context(|| {
                format!("Failed to parse rule table {:?} row {}", path.as_ref(), line + 2)
            })?;
            entries.push(entry);
        }

        Ok(RuleTable { entries })
    }

    pub fn push(&mut self, entry: RuleEntry) {
        self.entries.push(entry);
    }

    /// Append all entries of `other` (they take precedence)
    pub fn extend(&mut self, other: RuleTable) {
        self.entries.extend(other.entries);
    }

    pub fn entries(&self) -> &[RuleEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// RULE KINDS
// ============================================================================

/// Attribute names a rule may default to when parsing aliases
#[derive(Debug, Clone)]
pub struct ParseContext {
    /// Selector for `pick_by` aliases and the unknown-rule fallback
    pub capacity_attribute: String,

    /// Weight for `weighted_by_circuits`
    pub parallel_attribute: String,
}

impl Default for ParseContext {
    fn default() -> Self {
        ParseContext {
            capacity_attribute: "p_nom".to_string(),
            parallel_attribute: "num_parallel".to_string(),
        }
    }
}

/// A closed rule type that can be parsed from a rule table row
pub trait RuleKind: Sized + Clone {
    fn from_entry(
        entry: &RuleEntry,
        context: &ParseContext,
        diagnostics: &mut Diagnostics,
    ) -> Result<Self>;
}

/// Anything that answers "which rule applies to (component, attribute, class)"
pub trait RuleSource<R> {
    fn rule_for(&self, component: &str, attribute: &str, class: Option<&str>) -> Result<R>;
}

// ============================================================================
// RULE BOOK (pre-indexed resolver)
// ============================================================================

type RuleKey = (String, String, Option<String>);

/// Rule table indexed once per pass for O(1) resolution
#[derive(Debug, Clone)]
pub struct RuleBook<R> {
    exact: HashMap<RuleKey, R>,
    table_defaults: HashMap<String, R>,
    global_default: Option<R>,
}

impl<R: RuleKind> RuleBook<R> {
    /// Parse and index every entry of `table`
    pub fn build(
        table: &RuleTable,
        context: &ParseContext,
        diagnostics: &mut Diagnostics,
    ) -> Result<Self> {
        let mut book = RuleBook::empty();

        for entry in table.entries() {
            let rule = R::from_entry(entry, context, diagnostics)?;
            let component = entry.component.trim();
            let attribute = entry.attribute.trim();

            if attribute == OTHERS {
                if component == GLOBAL {
                    book.global_default = Some(rule);
                } else {
                    book.table_defaults.insert(component.to_string(), rule);
                }
                continue;
            }

            let key = (
                component.to_string(),
                attribute.to_string(),
                entry.class_selector().map(str::to_string),
            );
            book.exact.insert(key, rule);
        }

        Ok(book)
    }

    pub fn empty() -> Self {
        RuleBook {
            exact: HashMap::new(),
            table_defaults: HashMap::new(),
            global_default: None,
        }
    }

    /// Builder: install a global default below everything configured
    pub fn with_global_default(mut self, rule: R) -> Self {
        if self.global_default.is_none() {
            self.global_default = Some(rule);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.table_defaults.is_empty() && self.global_default.is_none()
    }

    /// Exact (component, attribute, class), then (component, attribute, None)
    pub fn specific(&self, component: &str, attribute: &str, class: Option<&str>) -> Option<&R> {
        if let Some(class) = class {
            let key = (
                component.to_string(),
                attribute.to_string(),
                Some(class.to_string()),
            );
            if let Some(rule) = self.exact.get(&key) {
                return Some(rule);
            }
        }
        self.exact
            .get(&(component.to_string(), attribute.to_string(), None))
    }

    /// Table-wide `others`, then the global `others`
    pub fn fallback(&self, component: &str) -> Option<&R> {
        self.table_defaults
            .get(component)
            .or(self.global_default.as_ref())
    }

    /// Full resolution; fails with "no rule defined" naming the key
    pub fn resolve(&self, component: &str, attribute: &str, class: Option<&str>) -> Result<&R> {
        self.specific(component, attribute, class)
            .or_else(|| self.fallback(component))
            .ok_or_else(|| ReductionError::MissingRule {
                component: component.to_string(),
                attribute: attribute.to_string(),
                class: class.map(str::to_string),
            })
    }

    /// Attributes with at least one specific rule for `component`, sorted
    pub fn attributes_for(&self, component: &str) -> Vec<String> {
        let attributes: BTreeSet<&String> = self
            .exact
            .keys()
            .filter(|(c, _, _)| c == component)
            .map(|(_, a, _)| a)
            .collect();
        attributes.into_iter().cloned().collect()
    }

    /// Components named by any rule
    pub fn components(&self) -> BTreeSet<String> {
        self.exact
            .keys()
            .map(|(c, _, _)| c.clone())
            .chain(self.table_defaults.keys().cloned())
            .collect()
    }
}

impl<R: RuleKind> RuleSource<R> for RuleBook<R> {
    fn rule_for(&self, component: &str, attribute: &str, class: Option<&str>) -> Result<R> {
        self.resolve(component, attribute, class).cloned()
    }
}

/// Split `name(arg1,arg2)` into ("name", ["arg1","arg2"]); plain names have no args
pub(crate) fn split_rule_call(rule: &str) -> (String, Vec<String>) {
    let rule = rule.trim();
    match (rule.find('('), rule.ends_with(')')) {
        (Some(open), true) => {
            let name = rule[..open].trim().to_ascii_lowercase();
            let args = rule[open + 1..rule.len() - 1]
                .split(',')
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect();
            (name, args)
        }
        _ => (rule.to_ascii_lowercase(), Vec::new()),
    }
}

// ============================================================================
// TESTS
// ============================================================================
