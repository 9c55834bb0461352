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

//! Evaluation rule endpoints.

use crate::client::{patch_row, remove_row, SpanlensClient};
use crate::error::{ClientError, Result};
use reqwest::Method;
use serde_json::Value;
use spanlens_core::{
    ApiParams, CreateRuleRequest, EvaluationRule, ExecutionDetail, Page, RuleAnalytics,
    RuleExecution, RuleStatus, TestRuleRequest, TestRuleResponse, TriggerRuleRequest,
    TriggerRuleResponse, UpdateRuleRequest,
};

fn rules_path(project_id: &str) -> String {
    format!("/v1/projects/{}/evaluations/rules", project_id)
}

fn rule_path(project_id: &str, rule_id: &str) -> String {
    format!("{}/{}", rules_path(project_id), rule_id)
}

fn cache_prefix(project_id: &str) -> String {
    format!("rules:{}:", project_id)
}

fn list_prefix(project_id: &str) -> String {
    format!("rules:{}:list:", project_id)
}

fn detail_key(project_id: &str, rule_id: &str) -> String {
    format!("rules:{}:detail:{}", project_id, rule_id)
}

impl SpanlensClient {
    /// List rules. `params` is usually [`spanlens_core::to_api_params`] of
    /// the rules table state.
    #[tracing::instrument(skip(self, params))]
    pub async fn list_rules(
        &self,
        project_id: &str,
        params: &ApiParams,
    ) -> Result<Page<EvaluationRule>> {
        let key = format!("{}{}", list_prefix(project_id), params.cache_key());
        self.get_cached(
            key,
            self.config().list_ttl,
            &rules_path(project_id),
            &params.to_query_pairs(),
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_rule(&self, project_id: &str, rule_id: &str) -> Result<EvaluationRule> {
        self.get_cached_data(
            detail_key(project_id, rule_id),
            self.config().detail_ttl,
            &rule_path(project_id, rule_id),
        )
        .await
    }

    /// Create a rule. The form is validated before any request is made.
    #[tracing::instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_rule(
        &self,
        project_id: &str,
        request: &CreateRuleRequest,
    ) -> Result<EvaluationRule> {
        request.validate()?;
        let body = serde_json::to_value(request)?;
        let rule: EvaluationRule = self
            .request_data(Method::POST, &rules_path(project_id), Some(&body))
            .await?;
        self.invalidate(&[list_prefix(project_id)]);
        tracing::info!(rule_id = %rule.id, "Rule created");
        Ok(rule)
    }

    /// Update a rule. A new scorer sent without a mapping is checked against
    /// the stored rule's mapping.
    #[tracing::instrument(skip(self, request))]
    pub async fn update_rule(
        &self,
        project_id: &str,
        rule_id: &str,
        request: &UpdateRuleRequest,
    ) -> Result<EvaluationRule> {
        if request.scorer.is_some() && request.variable_mapping.is_none() {
            let current = self.get_rule(project_id, rule_id).await?;
            request.validate(Some(&current))?;
        } else {
            request.validate(None)?;
        }
        let body = serde_json::to_value(request)?;
        let rule: EvaluationRule = self
            .request_data(Method::PUT, &rule_path(project_id, rule_id), Some(&body))
            .await?;
        self.invalidate(&[cache_prefix(project_id)]);
        tracing::info!(rule_id, "Rule updated");
        Ok(rule)
    }

    /// Delete a rule, removing it from cached lists before the request.
    #[tracing::instrument(skip(self))]
    pub async fn delete_rule(&self, project_id: &str, rule_id: &str) -> Result<()> {
        let snapshot = self
            .cache()
            .update_matching(&list_prefix(project_id), |cached| remove_row(cached, "id", rule_id));
        let path = rule_path(project_id, rule_id);
        let request = self.send(Method::DELETE, &path, &[], None);
        self.optimistic("delete rule", snapshot, &[cache_prefix(project_id)], request)
            .await
            .map(drop)
    }

    #[tracing::instrument(skip(self))]
    pub async fn activate_rule(&self, project_id: &str, rule_id: &str) -> Result<()> {
        self.set_rule_status(project_id, rule_id, RuleStatus::Active).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn deactivate_rule(&self, project_id: &str, rule_id: &str) -> Result<()> {
        self.set_rule_status(project_id, rule_id, RuleStatus::Inactive).await
    }

    async fn set_rule_status(
        &self,
        project_id: &str,
        rule_id: &str,
        status: RuleStatus,
    ) -> Result<()> {
        let snapshot = self.cache().update_matching(&cache_prefix(project_id), |cached| {
            patch_row(cached, "id", rule_id, "status", Value::from(status.as_str()))
        });
        let action = match status {
            RuleStatus::Active => "activate",
            _ => "deactivate",
        };
        let path = format!("{}/{}", rule_path(project_id, rule_id), action);
        let request = self.send(Method::POST, &path, &[], None);
        self.optimistic("change rule status", snapshot, &[cache_prefix(project_id)], request)
            .await
            .map(drop)
    }

    /// Dry run against recent spans. Nothing is stored.
    #[tracing::instrument(skip(self, request))]
    pub async fn test_rule(
        &self,
        project_id: &str,
        rule_id: &str,
        request: &TestRuleRequest,
    ) -> Result<TestRuleResponse> {
        let body = serde_json::to_value(request)?;
        let path = format!("{}/test", rule_path(project_id, rule_id));
        self.request_data(Method::POST, &path, Some(&body)).await
    }

    /// Start a manual execution.
    #[tracing::instrument(skip(self, request))]
    pub async fn trigger_rule(
        &self,
        project_id: &str,
        rule_id: &str,
        request: &TriggerRuleRequest,
    ) -> Result<TriggerRuleResponse> {
        let body = serde_json::to_value(request)?;
        let path = format!("{}/trigger", rule_path(project_id, rule_id));
        let response: TriggerRuleResponse =
            self.request_data(Method::POST, &path, Some(&body)).await?;
        tracing::info!(execution_id = %response.execution_id, "Rule triggered");
        Ok(response)
    }

    /// Executions change state while running, so they are never cached.
    #[tracing::instrument(skip(self))]
    pub async fn list_executions(
        &self,
        project_id: &str,
        rule_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<Page<RuleExecution>> {
        let path = format!("{}/executions", rule_path(project_id, rule_id));
        let query = [
            ("page".to_string(), page.max(1).to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        self.request(Method::GET, &path, &query, None).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_execution(
        &self,
        project_id: &str,
        rule_id: &str,
        execution_id: &str,
    ) -> Result<RuleExecution> {
        let path = format!("{}/executions/{}", rule_path(project_id, rule_id), execution_id);
        self.request_data(Method::GET, &path, None).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_execution_detail(
        &self,
        project_id: &str,
        rule_id: &str,
        execution_id: &str,
    ) -> Result<ExecutionDetail> {
        let path = format!(
            "{}/executions/{}/detail",
            rule_path(project_id, rule_id),
            execution_id
        );
        self.request_data(Method::GET, &path, None).await
    }

    /// Most recent execution, or `None` if the rule never ran.
    #[tracing::instrument(skip(self))]
    pub async fn get_latest_execution(
        &self,
        project_id: &str,
        rule_id: &str,
    ) -> Result<Option<RuleExecution>> {
        let path = format!("{}/executions/latest", rule_path(project_id, rule_id));
        match self.request_data::<Option<RuleExecution>>(Method::GET, &path, None).await {
            Ok(execution) => Ok(execution),
            Err(ClientError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Aggregates over `period` (e.g. `24h`, `7d`, `30d`).
    #[tracing::instrument(skip(self))]
    pub async fn get_rule_analytics(
        &self,
        project_id: &str,
        rule_id: &str,
        period: &str,
    ) -> Result<RuleAnalytics> {
        let key = format!("{}analytics:{}:{}", cache_prefix(project_id), rule_id, period);
        let path = format!("{}/analytics", rule_path(project_id, rule_id));
        let query = [("period".to_string(), period.to_string())];
        let envelope: spanlens_core::Envelope<RuleAnalytics> = self
            .get_cached(key, self.config().list_ttl, &path, &query)
            .await?;
        Ok(envelope.data)
    }
}
