// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Evaluation rules
//!
//! Configuration of backend-executed scorers. Rules are only edited here;
//! execution happens server side and is observed through [`RuleExecution`]
//! and [`RuleAnalytics`].

use crate::column::ColumnRegistry;
use crate::condition::{self, FilterCondition};
use crate::error::ValidationErrors;
use crate::preset::PresetFilter;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub const MAX_RULE_NAME_LENGTH: usize = 100;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.]*)\s*\}\}").expect("placeholder pattern is valid")
});

/// Distinct `{{name}}` placeholders in `template`, in first-seen order.
pub fn extract_placeholders(template: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    PLACEHOLDER
        .captures_iter(template)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleStatus {
    Active,
    #[default]
    Inactive,
    Paused,
}

impl RuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleStatus::Active => "active",
            RuleStatus::Inactive => "inactive",
            RuleStatus::Paused => "paused",
        }
    }
}

impl fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetScope {
    #[default]
    Span,
    Trace,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFieldType {
    Numeric,
    Categorical,
    Boolean,
}

/// One field of an LLM scorer's structured output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: OutputFieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scorer_type", rename_all = "lowercase")]
pub enum ScorerConfig {
    Llm {
        messages: Vec<PromptMessage>,
        model: String,
        provider: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        temperature: Option<f64>,
        #[serde(default)]
        output_schema: Vec<OutputField>,
    },
    Builtin {
        scorer_name: String,
        #[serde(default)]
        config: serde_json::Value,
    },
    Regex {
        pattern: String,
        score_name: String,
        #[serde(default = "default_match_score")]
        match_score: f64,
        #[serde(default)]
        no_match_score: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        capture_group: Option<usize>,
    },
}

fn default_match_score() -> f64 {
    1.0
}

impl ScorerConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            ScorerConfig::Llm { .. } => "llm",
            ScorerConfig::Builtin { .. } => "builtin",
            ScorerConfig::Regex { .. } => "regex",
        }
    }

    /// Placeholders referenced by an LLM prompt; empty for other scorers.
    pub fn placeholders(&self) -> Vec<String> {
        let ScorerConfig::Llm { messages, .. } = self else {
            return Vec::new();
        };
        let joined = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        extract_placeholders(&joined)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableSource {
    SpanInput,
    SpanOutput,
    SpanAttribute,
    TraceInput,
    TraceOutput,
    TraceMetadata,
}

/// Binds a prompt placeholder to a span or trace data path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableMapping {
    pub variable_name: String,
    pub source: VariableSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRule {
    pub id: String,
    pub project_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: RuleStatus,
    #[serde(default)]
    pub target_scope: TargetScope,
    /// Empty means every span name
    #[serde(default)]
    pub span_names: Vec<String>,
    pub sampling_rate: f64,
    #[serde(default)]
    pub filters: Vec<PresetFilter>,
    pub scorer: ScorerConfig,
    #[serde(default)]
    pub variable_mapping: Vec<VariableMapping>,
    #[serde(default)]
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EvaluationRule {
    pub fn is_active(&self) -> bool {
        self.status == RuleStatus::Active
    }
}

fn validate_name(name: &str, errors: &mut ValidationErrors) {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        errors.push("name", "Name is required");
    } else if trimmed.chars().count() > MAX_RULE_NAME_LENGTH {
        errors.push(
            "name",
            format!("Name must be at most {} characters", MAX_RULE_NAME_LENGTH),
        );
    }
}

fn validate_sampling_rate(rate: f64, errors: &mut ValidationErrors) {
    if !(0.0..=1.0).contains(&rate) {
        errors.push("sampling_rate", "Sampling rate must be between 0 and 1");
    }
}

fn validate_span_names(names: &[String], errors: &mut ValidationErrors) {
    if names.iter().any(|n| n.trim().is_empty()) {
        errors.push("span_names", "Span names cannot be blank");
    }
}

fn validate_filters(filters: &[PresetFilter], errors: &mut ValidationErrors) {
    let registry = ColumnRegistry::spans();
    for (index, filter) in filters.iter().enumerate() {
        let condition: FilterCondition = filter.to_condition(registry);
        if let Err(e) = condition::validate(&condition, registry) {
            errors.push(format!("filters[{}]", index), e.to_string());
        }
    }
}

/// `mapping` of `None` means the mapping is unknown here, so placeholder
/// coverage is left to the server.
fn validate_scorer(
    scorer: &ScorerConfig,
    mapping: Option<&[VariableMapping]>,
    errors: &mut ValidationErrors,
) {
    match scorer {
        ScorerConfig::Llm {
            messages,
            model,
            provider,
            temperature,
            output_schema,
        } => {
            if messages.iter().all(|m| m.content.trim().is_empty()) {
                errors.push("scorer.messages", "At least one prompt message is required");
            }
            if model.trim().is_empty() {
                errors.push("scorer.model", "Model is required");
            }
            if provider.trim().is_empty() {
                errors.push("scorer.provider", "Provider is required");
            }
            if let Some(t) = temperature {
                if !(0.0..=2.0).contains(t) {
                    errors.push("scorer.temperature", "Temperature must be between 0 and 2");
                }
            }
            for (index, field) in output_schema.iter().enumerate() {
                if field.name.trim().is_empty() {
                    errors.push(format!("scorer.output_schema[{}].name", index), "Field name is required");
                }
                match field.field_type {
                    OutputFieldType::Numeric => {
                        if let (Some(min), Some(max)) = (field.min, field.max) {
                            if min >= max {
                                errors.push(
                                    format!("scorer.output_schema[{}].max", index),
                                    "Maximum must be greater than minimum",
                                );
                            }
                        }
                    }
                    OutputFieldType::Categorical if field.categories.is_empty() => {
                        errors.push(
                            format!("scorer.output_schema[{}].categories", index),
                            "At least one category is required",
                        );
                    }
                    _ => {}
                }
            }
            if let Some(mapping) = mapping {
                for placeholder in scorer.placeholders() {
                    if !mapping.iter().any(|m| m.variable_name == placeholder) {
                        errors.push(
                            "variable_mapping",
                            format!("No mapping for variable '{{{{{}}}}}'", placeholder),
                        );
                    }
                }
            }
        }
        ScorerConfig::Builtin { scorer_name, .. } => {
            if scorer_name.trim().is_empty() {
                errors.push("scorer.scorer_name", "Scorer name is required");
            }
        }
        ScorerConfig::Regex {
            pattern,
            score_name,
            capture_group,
            ..
        } => {
            if score_name.trim().is_empty() {
                errors.push("scorer.score_name", "Score name is required");
            }
            match Regex::new(pattern) {
                Err(e) => errors.push("scorer.pattern", format!("Invalid pattern: {}", e)),
                Ok(re) => {
                    if let Some(group) = capture_group {
                        if *group >= re.captures_len() {
                            errors.push(
                                "scorer.capture_group",
                                format!("Pattern has no capture group {}", group),
                            );
                        }
                    }
                }
            }
        }
    }
}

/// Body of `POST /v1/projects/{pid}/evaluations/rules`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRuleRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub target_scope: TargetScope,
    #[serde(default)]
    pub span_names: Vec<String>,
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: f64,
    #[serde(default)]
    pub filters: Vec<PresetFilter>,
    pub scorer: ScorerConfig,
    #[serde(default)]
    pub variable_mapping: Vec<VariableMapping>,
    /// Start active instead of inactive
    #[serde(default)]
    pub activate: bool,
}

fn default_sampling_rate() -> f64 {
    1.0
}

impl CreateRuleRequest {
    pub fn new(name: impl Into<String>, scorer: ScorerConfig) -> Self {
        Self {
            name: name.into(),
            description: None,
            target_scope: TargetScope::default(),
            span_names: Vec::new(),
            sampling_rate: default_sampling_rate(),
            filters: Vec::new(),
            scorer,
            variable_mapping: Vec::new(),
            activate: false,
        }
    }

    /// Every form error at once, before any request is made.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        validate_name(&self.name, &mut errors);
        validate_sampling_rate(self.sampling_rate, &mut errors);
        validate_span_names(&self.span_names, &mut errors);
        validate_filters(&self.filters, &mut errors);
        validate_scorer(&self.scorer, Some(&self.variable_mapping), &mut errors);
        errors.into_result()
    }
}

/// Body of `PUT /v1/projects/{pid}/evaluations/rules/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateRuleRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_scope: Option<TargetScope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_names: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<PresetFilter>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scorer: Option<ScorerConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable_mapping: Option<Vec<VariableMapping>>,
}

impl UpdateRuleRequest {
    /// Validates only the fields being changed. A new scorer is checked
    /// against the new mapping if one is given, else against `current`.
    /// Without either, placeholder coverage is not checked.
    pub fn validate(&self, current: Option<&EvaluationRule>) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();
        if let Some(name) = &self.name {
            validate_name(name, &mut errors);
        }
        if let Some(rate) = self.sampling_rate {
            validate_sampling_rate(rate, &mut errors);
        }
        if let Some(names) = &self.span_names {
            validate_span_names(names, &mut errors);
        }
        if let Some(filters) = &self.filters {
            validate_filters(filters, &mut errors);
        }
        let scorer = self.scorer.as_ref().or(current.map(|r| &r.scorer));
        if let Some(scorer) = scorer {
            let mapping = self
                .variable_mapping
                .as_deref()
                .or(current.map(|r| r.variable_mapping.as_slice()));
            if self.scorer.is_some() || self.variable_mapping.is_some() {
                validate_scorer(scorer, mapping, &mut errors);
            }
        }
        errors.into_result()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerType {
    Automatic,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleExecution {
    pub id: String,
    pub rule_id: String,
    pub project_id: String,
    pub status: ExecutionStatus,
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub spans_matched: u64,
    #[serde(default)]
    pub spans_scored: u64,
    #[serde(default)]
    pub errors_count: u64,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
}

/// Per-span outcome within an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanResult {
    pub span_id: String,
    pub trace_id: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionDetail {
    pub execution: RuleExecution,
    #[serde(default)]
    pub span_results: Vec<SpanResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBucket {
    pub bucket: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleAnalytics {
    pub rule_id: String,
    pub period: String,
    pub total_executions: u64,
    pub total_spans_scored: u64,
    /// 0..=1
    pub success_rate: f64,
    #[serde(default)]
    pub average_score: Option<f64>,
    #[serde(default)]
    pub score_distribution: Vec<ScoreBucket>,
    #[serde(default)]
    pub error_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Dry run of a rule against recent spans. Nothing is persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRuleRequest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trace_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSummary {
    pub spans_matched: u64,
    pub spans_scored: u64,
    #[serde(default)]
    pub errors_count: u64,
    #[serde(default)]
    pub average_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRuleResponse {
    pub summary: TestSummary,
    #[serde(default)]
    pub results: Vec<SpanResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRuleRequest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trace_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRuleResponse {
    pub execution_id: String,
    #[serde(default)]
    pub message: Option<String>,
}
