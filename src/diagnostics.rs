// ⚠️ Diagnostics - non-fatal data-quality warnings collected during a run
// Structured list (not only log lines) so callers can report or persist it

use serde::{Deserialize, Serialize};
use tracing::warn;

// ============================================================================
// WARNING KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// Entity had no value for the grouping attribute
    MissingGroupValue,

    /// Side-input key matched no entity
    UnmappedGroupKey,

    /// Rule name not recognised; documented fallback applied
    UnknownRule,

    /// Weights summed to zero; equal split applied
    DegenerateWeights,

    /// Merged edge capacity was zero; sentinel substituted
    UnconstrainedCapacity,

    /// Edge connected a node to itself after remapping
    DroppedSelfLoop,

    /// Entity removed because the entity it referenced was removed
    DroppedDependent,

    /// Rule parsed but has no effect where it is configured
    IneffectiveRule,

    /// Resampling disabled for this run
    ResampleSkipped,

    /// A pass found nothing to work on
    EmptyInput,
}

// ============================================================================
// WARNING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub component: String,
    pub attribute: Option<String>,
    pub message: String,
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.attribute {
            Some(attribute) => write!(
                f,
                "[{:?}] {}.{}: {}",
                self.kind, self.component, attribute, self.message
            ),
            None => write!(f, "[{:?}] {}: {}", self.kind, self.component, self.message),
        }
    }
}

// ============================================================================
// DIAGNOSTICS
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning and log it
    pub fn warn(
        &mut self,
        kind: WarningKind,
        component: &str,
        attribute: Option<&str>,
        message: impl Into<String>,
    ) {
        let warning = Warning {
            kind,
            component: component.to_string(),
            attribute: attribute.map(str::to_string),
            message: message.into(),
        };
        warn!("{}", warning);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn count(&self, kind: WarningKind) -> usize {
        self.warnings.iter().filter(|w| w.kind == kind).count()
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_structured_warnings() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.warn(
            WarningKind::MissingGroupValue,
            "buses",
            Some("province"),
            "bus 'b7' has no value",
        );
        diagnostics.warn(WarningKind::ResampleSkipped, "network", None, "no rules");

        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics.count(WarningKind::MissingGroupValue), 1);
        assert_eq!(
            diagnostics.warnings()[0].to_string(),
            "[MissingGroupValue] buses.province: bus 'b7' has no value"
        );
    }
}
