//! Module configuration.
//!
//! [`RelcountConfig`] is what a running module uses: threshold,
//! generalization choice, weighing and inclusion policies as explicit values. [`ModuleSettings`] is the
//! serializable part, for loading registrations from JSON.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::compact::{
    AverageCardinality, GeneralizationStrategy, MostSpecificGeneralization, ThresholdCompactor,
    DEFAULT_THRESHOLD,
};
use crate::policy::{InclusionPolicies, OneForEach, WeighingStrategy};
use crate::{Error, Result};

/// Id of a module registered without one.
pub const DEFAULT_MODULE_ID: &str = "relcount";

/// Runtime configuration of a relationship count module.
#[derive(Clone)]
pub struct RelcountConfig {
    compaction_threshold: usize,
    generalization: Arc<dyn GeneralizationStrategy>,
    weighing: Arc<dyn WeighingStrategy>,
    inclusion: InclusionPolicies,
}

impl RelcountConfig {
    /// Replace the compaction threshold. Zero is rejected.
    pub fn with_threshold(mut self, threshold: usize) -> Result<Self> {
        if threshold == 0 {
            return Err(Error::Config("compaction threshold must be positive".into()));
        }
        self.compaction_threshold = threshold;
        Ok(self)
    }

    /// Replace how compaction picks the generalization to merge into.
    pub fn with_generalization(mut self, generalization: impl GeneralizationStrategy + 'static) -> Self {
        self.generalization = Arc::new(generalization);
        self
    }

    pub fn with_weighing(mut self, weighing: impl WeighingStrategy + 'static) -> Self {
        self.weighing = Arc::new(weighing);
        self
    }

    pub fn with_inclusion_policies(mut self, inclusion: InclusionPolicies) -> Self {
        self.inclusion = inclusion;
        self
    }

    pub fn compaction_threshold(&self) -> usize {
        self.compaction_threshold
    }

    pub fn compactor(&self) -> ThresholdCompactor {
        ThresholdCompactor::with_generalization(self.compaction_threshold, Arc::clone(&self.generalization))
    }

    pub fn weighing(&self) -> &dyn WeighingStrategy {
        self.weighing.as_ref()
    }

    pub fn inclusion(&self) -> &InclusionPolicies {
        &self.inclusion
    }
}

impl Default for RelcountConfig {
    fn default() -> Self {
        Self {
            compaction_threshold: DEFAULT_THRESHOLD,
            generalization: Arc::new(MostSpecificGeneralization),
            weighing: Arc::new(OneForEach),
            inclusion: InclusionPolicies::default(),
        }
    }
}

impl fmt::Debug for RelcountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelcountConfig")
            .field("compaction_threshold", &self.compaction_threshold)
            .field("inclusion", &self.inclusion)
            .finish_non_exhaustive()
    }
}

/// Serializable module registration settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleSettings {
    pub id: String,
    pub compaction_threshold: usize,
    pub generalization: Generalization,
}

/// Serializable choice of [`GeneralizationStrategy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Generalization {
    #[default]
    MostSpecific,
    AverageCardinality,
}

impl ModuleSettings {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(format!("invalid module settings: {e}")))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Config(format!("cannot serialize module settings: {e}")))
    }

    /// Default policies with these settings applied.
    pub fn to_config(&self) -> Result<RelcountConfig> {
        let config = RelcountConfig::default().with_threshold(self.compaction_threshold)?;
        Ok(match self.generalization {
            Generalization::MostSpecific => config,
            Generalization::AverageCardinality => config.with_generalization(AverageCardinality),
        })
    }
}

impl Default for ModuleSettings {
    fn default() -> Self {
        Self {
            id: DEFAULT_MODULE_ID.to_string(),
            compaction_threshold: DEFAULT_THRESHOLD,
            generalization: Generalization::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_zero_threshold_rejected() {
        let err = RelcountConfig::default().with_threshold(0).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(RelcountConfig::default().with_threshold(3).unwrap().compaction_threshold(), 3);
    }

    #[test]
    fn test_settings_defaults_fill_missing_fields() {
        let settings = ModuleSettings::from_json(r#"{"compaction_threshold": 5}"#).unwrap();
        assert_eq!(
            settings,
            ModuleSettings { id: "relcount".into(), compaction_threshold: 5, ..ModuleSettings::default() }
        );
        assert_eq!(ModuleSettings::from_json("{}").unwrap(), ModuleSettings::default());
    }

    #[test]
    fn test_settings_json_roundtrip_and_errors() {
        let settings = ModuleSettings {
            id: "friends".into(),
            compaction_threshold: 7,
            generalization: Generalization::AverageCardinality,
        };
        let json = settings.to_json().unwrap();
        assert_eq!(ModuleSettings::from_json(&json).unwrap(), settings);

        assert!(matches!(ModuleSettings::from_json("not json"), Err(Error::Config(_))));
        let zero = ModuleSettings { compaction_threshold: 0, ..ModuleSettings::default() };
        assert!(matches!(zero.to_config(), Err(Error::Config(_))));
    }

    #[test]
    fn test_generalization_setting() {
        let settings = ModuleSettings::from_json(r#"{"generalization": "average_cardinality"}"#).unwrap();
        assert_eq!(settings.generalization, Generalization::AverageCardinality);
        assert_eq!(settings.to_config().unwrap().compaction_threshold(), DEFAULT_THRESHOLD);
        assert!(ModuleSettings::from_json(r#"{"generalization": "random"}"#).is_err());
    }
}
