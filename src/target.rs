//! Write target coordinates
//!
//! A [`WriteTarget`] is fixed for the duration of one write call. It is
//! derived once from [`WriteConfig`] and optional caller overrides.

use serde::Serialize;

use crate::config::WriteConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteTarget {
    /// Target version, omitted from payloads when unset (base version)
    pub version_id: Option<String>,
    /// Target scenario, omitted from payloads when unset (baseline)
    pub scenario_id: Option<String>,
    pub period_field_name: String,
    pub planning_area: String,
    pub key_figure_name: String,
    pub null_handling_enabled: bool,
}

impl WriteTarget {
    pub fn from_config(config: &WriteConfig) -> Self {
        Self {
            version_id: None,
            scenario_id: None,
            period_field_name: config.default_period_field.clone(),
            planning_area: config.planning_area.clone(),
            key_figure_name: config.key_figure.clone(),
            null_handling_enabled: config.enable_null_handling,
        }
    }

    pub fn with_version(mut self, version_id: Option<String>) -> Self {
        self.version_id = version_id.filter(|v| !v.trim().is_empty());
        self
    }

    pub fn with_scenario(mut self, scenario_id: Option<String>) -> Self {
        self.scenario_id = scenario_id.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_period_field(mut self, period_field: Option<String>) -> Self {
        if let Some(field) = period_field.filter(|f| !f.trim().is_empty()) {
            self.period_field_name = field;
        }
        self
    }

    /// Name of the collection holding the detail records, e.g. `NavSAP1`
    pub fn navigation_property(&self) -> String {
        format!("Nav{}", self.planning_area)
    }

    /// Entity set receiving transaction payloads, e.g. `SAP1Trans`
    pub fn transaction_entity_set(&self) -> String {
        format!("{}Trans", self.planning_area)
    }

    pub fn null_flag_field(&self) -> String {
        format!("{}_isNull", self.key_figure_name)
    }

    /// Same target without version/scenario; parallel batches inherit them
    /// from the transaction opened by `InitiateParallelProcess`
    pub fn without_plan_coordinates(&self) -> Self {
        Self {
            version_id: None,
            scenario_id: None,
            ..self.clone()
        }
    }
}
