// 🧮 Attribute Reducer - collapse N rows of one group into a single value
// Closed rule type, resolved once per (table, attribute, class)

use crate::diagnostics::{Diagnostics, WarningKind};
use crate::error::Result;
use crate::model::{Entity, Value};
use crate::rules::{split_rule_call, ParseContext, RuleEntry, RuleKind};
use serde::{Deserialize, Serialize};

// ============================================================================
// RULES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Extreme {
    Max,
    Min,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReductionRule {
    /// Preserves totals
    Sum,

    /// Unweighted mean
    Mean,

    /// Σ(value·weight)/Σ(weight); unweighted mean when Σ(weight)=0
    WeightedMean(String),

    Min,
    Max,

    /// Value from the row with the extreme selector (dominant member)
    PickBy { selector: String, extreme: Extreme },

    /// Ignore group contents
    Fixed(Value),

    /// The group key (or the key component named like the attribute)
    UseGroupKey,

    /// Omit the attribute from the merged entity
    Drop,
}

impl ReductionRule {
    pub fn pick_largest(selector: &str) -> Self {
        ReductionRule::PickBy {
            selector: selector.to_string(),
            extreme: Extreme::Max,
        }
    }

    /// Parse a rule name. `Ok(None)` means the name is not recognised.
    pub fn parse(entry: &RuleEntry, context: &ParseContext) -> Result<Option<Self>> {
        let (name, args) = split_rule_call(&entry.rule);
        let rule = match name.as_str() {
            "sum" => ReductionRule::Sum,
            "mean" => ReductionRule::Mean,
            "min" | "oldest" | "smallest" => ReductionRule::Min,
            "max" | "newest" | "largest" => ReductionRule::Max,
            "weighted_mean" => match args.first() {
                Some(weight) => ReductionRule::WeightedMean(weight.clone()),
                None => return Err(entry.invalid("weighted_mean needs a weight attribute")),
            },
            "weighted_by_circuits" => {
                ReductionRule::WeightedMean(context.parallel_attribute.clone())
            }
            "pick_by" => {
                let selector = args
                    .first()
                    .cloned()
                    .unwrap_or_else(|| context.capacity_attribute.clone());
                let extreme = match args.get(1).map(|a| a.to_ascii_lowercase()) {
                    None => Extreme::Max,
                    Some(a) if a == "max" => Extreme::Max,
                    Some(a) if a == "min" => Extreme::Min,
                    Some(other) => {
                        return Err(entry.invalid(format!("unknown extreme '{}'", other)))
                    }
                };
                ReductionRule::PickBy { selector, extreme }
            }
            "p_nom" => ReductionRule::pick_largest(&context.capacity_attribute),
            "fixed" => {
                let value = entry.fixed_value();
                if value.is_missing() {
                    return Err(entry.invalid("rule 'fixed' requires a value"));
                }
                ReductionRule::Fixed(value)
            }
            "use_group_key" | "group_key" | "carrier" | "cc_group" => ReductionRule::UseGroupKey,
            "drop" | "remove" => ReductionRule::Drop,
            _ => return Ok(None),
        };
        Ok(Some(rule))
    }
}

impl RuleKind for ReductionRule {
    fn from_entry(
        entry: &RuleEntry,
        context: &ParseContext,
        diagnostics: &mut Diagnostics,
    ) -> Result<Self> {
        match ReductionRule::parse(entry, context)? {
            Some(rule) => Ok(rule),
            None => {
                // Unknown names keep the value of the dominant member
                diagnostics.warn(
                    WarningKind::UnknownRule,
                    &entry.component,
                    Some(&entry.attribute),
                    format!(
                        "unknown rule '{}', using pick_by({}, max)",
                        entry.rule, context.capacity_attribute
                    ),
                );
                Ok(ReductionRule::pick_largest(&context.capacity_attribute))
            }
        }
    }
}

// ============================================================================
// GROUP KEY VIEW
// ============================================================================

/// What `UseGroupKey` can see of the group being reduced
#[derive(Debug, Clone, PartialEq)]
pub struct KeyView<'a> {
    /// Grouping attributes in key order
    pub attributes: &'a [String],

    /// Key values, aligned with `attributes`
    pub values: &'a [String],
}

impl KeyView<'_> {
    /// The key component named `attribute` (or the joined key), typed like
    /// the member value it came from. Standardized names stay text.
    fn value_for(&self, rows: &[&Entity], attribute: &str) -> Value {
        let key = match self.attributes.iter().position(|a| a == attribute) {
            Some(position) => self.values[position].clone(),
            None => self.values.join("_"),
        };
        rows.iter()
            .map(|r| r.get(attribute))
            .find(|v| v.to_key().as_deref() == Some(key.as_str()))
            .cloned()
            .unwrap_or(Value::Text(key))
    }
}

// ============================================================================
// REDUCE
// ============================================================================

/// Outcome of reducing one attribute
#[derive(Debug, Clone, PartialEq)]
pub enum Reduced {
    Value(Value),
    Omit,
}

/// Reduce `attribute` over the group `rows` with `rule`.
///
/// Numeric rules skip missing values; if every value is missing the result is
/// missing. A column without numbers keeps its value only when all members
/// agree on it.
pub fn reduce(rows: &[&Entity], attribute: &str, rule: &ReductionRule, key: &KeyView) -> Reduced {
    let value = match rule {
        ReductionRule::Drop => return Reduced::Omit,
        ReductionRule::Fixed(value) => value.clone(),
        ReductionRule::UseGroupKey => key.value_for(rows, attribute),
        ReductionRule::PickBy { selector, extreme } => pick_by(rows, attribute, selector, *extreme),
        ReductionRule::Sum => numeric(rows, attribute, |v| v.iter().sum()),
        ReductionRule::Mean => numeric(rows, attribute, mean),
        ReductionRule::Min => numeric(rows, attribute, |v| v.iter().copied().fold(f64::INFINITY, f64::min)),
        ReductionRule::Max => {
            numeric(rows, attribute, |v| v.iter().copied().fold(f64::NEG_INFINITY, f64::max))
        }
        ReductionRule::WeightedMean(weight) => weighted_mean(rows, attribute, weight),
    };
    Reduced::Value(value)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn numeric(rows: &[&Entity], attribute: &str, f: impl Fn(&[f64]) -> f64) -> Value {
    let values: Vec<f64> = rows.iter().filter_map(|r| r.get(attribute).as_f64()).collect();
    if values.is_empty() {
        return uniform(rows, attribute);
    }
    Value::Number(f(&values))
}

/// The shared non-missing value of a column, if all rows agree
fn uniform(rows: &[&Entity], attribute: &str) -> Value {
    let mut present = rows.iter().map(|r| r.get(attribute)).filter(|v| !v.is_missing());
    match present.next() {
        Some(first) if present.all(|v| v == first) => first.clone(),
        _ => Value::Missing,
    }
}

fn weighted_mean(rows: &[&Entity], attribute: &str, weight: &str) -> Value {
    let pairs: Vec<(f64, f64)> = rows
        .iter()
        .filter_map(|r| {
            r.get(attribute)
                .as_f64()
                .map(|v| (v, r.get(weight).as_f64().unwrap_or(0.0)))
        })
        .collect();
    if pairs.is_empty() {
        return uniform(rows, attribute);
    }

    let total_weight: f64 = pairs.iter().map(|(_, w)| w).sum();
    if total_weight == 0.0 {
        let values: Vec<f64> = pairs.iter().map(|(v, _)| *v).collect();
        return Value::Number(mean(&values));
    }
    Value::Number(pairs.iter().map(|(v, w)| v * w).sum::<f64>() / total_weight)
}

fn pick_by(rows: &[&Entity], attribute: &str, selector: &str, extreme: Extreme) -> Value {
    // First row wins ties so the pick is stable under row order
    let mut best: Option<(f64, &Entity)> = None;
    for row in rows {
        let Some(score) = row.get(selector).as_f64() else {
            continue;
        };
        let better = match (best, extreme) {
            (None, _) => true,
            (Some((current, _)), Extreme::Max) => score > current,
            (Some((current, _)), Extreme::Min) => score < current,
        };
        if better {
            best = Some((score, *row));
        }
    }

    match best {
        Some((_, row)) => row.get(attribute).clone(),
        // No selector values at all: fall back to the first row
        None => rows
            .first()
            .map(|r| r.get(attribute).clone())
            .unwrap_or(Value::Missing),
    }
}

// ============================================================================
// TESTS
// ============================================================================
