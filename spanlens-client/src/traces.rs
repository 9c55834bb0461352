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

//! Trace, span and score endpoints.

use crate::client::{patch_row, remove_row, SpanlensClient};
use crate::error::{ClientError, Result};
use reqwest::Method;
use serde_json::{json, Value};
use spanlens_core::{
    ApiParams, AttributeCatalog, AttributeKey, FilterOptions, Page, Score, Span, Trace,
    TraceUpdate,
};

const TRACES_PATH: &str = "/v1/traces";
const SPANS_PATH: &str = "/v1/spans";
const SCORES_PATH: &str = "/v1/scores";

const TRACES_PREFIX: &str = "traces:";

fn trace_path(trace_id: &str) -> String {
    format!("{}/{}", TRACES_PATH, trace_id)
}

impl SpanlensClient {
    #[tracing::instrument(skip(self, params))]
    pub async fn list_traces(&self, params: &ApiParams) -> Result<Page<Trace>> {
        let key = format!("traces:list:{}", params.cache_key());
        self.get_cached(key, self.config().list_ttl, TRACES_PATH, &params.to_query_pairs())
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_trace(&self, trace_id: &str) -> Result<Trace> {
        self.get_cached_data(
            format!("traces:detail:{}", trace_id),
            self.config().detail_ttl,
            &trace_path(trace_id),
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_trace_spans(&self, trace_id: &str) -> Result<Vec<Span>> {
        self.get_cached_data(
            format!("traces:spans:{}", trace_id),
            self.config().detail_ttl,
            &format!("{}/spans", trace_path(trace_id)),
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_trace_scores(&self, trace_id: &str) -> Result<Vec<Score>> {
        self.get_cached_data(
            format!("traces:scores:{}", trace_id),
            self.config().detail_ttl,
            &format!("{}/scores", trace_path(trace_id)),
        )
        .await
    }

    #[tracing::instrument(skip(self, update))]
    pub async fn update_trace(&self, trace_id: &str, update: &TraceUpdate) -> Result<Trace> {
        let body = serde_json::to_value(update)?;
        let trace: Trace = self
            .request_data(Method::PUT, &trace_path(trace_id), Some(&body))
            .await?;
        self.invalidate(&[TRACES_PREFIX.to_string()]);
        tracing::info!(trace_id, "Trace updated");
        Ok(trace)
    }

    /// Replace the tag set of a trace.
    #[tracing::instrument(skip(self))]
    pub async fn update_trace_tags(&self, trace_id: &str, tags: &[String]) -> Result<()> {
        let snapshot = self.cache().update_matching(TRACES_PREFIX, |cached| {
            patch_row(cached, "trace_id", trace_id, "tags", json!(tags))
        });
        let path = format!("{}/tags", trace_path(trace_id));
        let body = json!({ "tags": tags });
        let request = self.send(Method::PUT, &path, &[], Some(&body));
        self.optimistic("update tags", snapshot, &[TRACES_PREFIX.to_string()], request)
            .await
            .map(drop)
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_trace_bookmark(&self, trace_id: &str, bookmarked: bool) -> Result<()> {
        let snapshot = self.cache().update_matching(TRACES_PREFIX, |cached| {
            patch_row(cached, "trace_id", trace_id, "bookmarked", Value::Bool(bookmarked))
        });
        let path = format!("{}/bookmark", trace_path(trace_id));
        let body = json!({ "bookmarked": bookmarked });
        let request = self.send(Method::PUT, &path, &[], Some(&body));
        self.optimistic("bookmark trace", snapshot, &[TRACES_PREFIX.to_string()], request)
            .await
            .map(drop)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_trace(&self, trace_id: &str) -> Result<()> {
        let snapshot = self
            .cache()
            .update_matching("traces:list:", |cached| remove_row(cached, "trace_id", trace_id));
        let path = trace_path(trace_id);
        let request = self.send(Method::DELETE, &path, &[], None);
        self.optimistic("delete trace", snapshot, &[TRACES_PREFIX.to_string()], request)
            .await
            .map(drop)
    }

    /// Not offered by the API yet. Fails without making a request.
    pub async fn bulk_delete_traces(&self, trace_ids: &[String]) -> Result<()> {
        tracing::error!(count = trace_ids.len(), "Bulk delete is not implemented");
        Err(ClientError::NotImplemented("Bulk delete"))
    }

    /// Not offered by the API yet. Fails without making a request.
    pub async fn export_traces(&self, _params: &ApiParams) -> Result<Vec<u8>> {
        tracing::error!("Trace export is not implemented");
        Err(ClientError::NotImplemented("Export"))
    }

    #[tracing::instrument(skip(self, params))]
    pub async fn list_spans(&self, params: &ApiParams) -> Result<Page<Span>> {
        let key = format!("spans:list:{}", params.cache_key());
        self.get_cached(key, self.config().list_ttl, SPANS_PATH, &params.to_query_pairs())
            .await
    }

    #[tracing::instrument(skip(self, params))]
    pub async fn list_scores(&self, params: &ApiParams) -> Result<Page<Score>> {
        let key = format!("scores:list:{}", params.cache_key());
        self.get_cached(key, self.config().list_ttl, SCORES_PATH, &params.to_query_pairs())
            .await
    }

    /// Dropdown values for the filter builder.
    #[tracing::instrument(skip(self))]
    pub async fn get_filter_options(&self) -> Result<FilterOptions> {
        self.get_cached_data(
            "filter-options".to_string(),
            self.config().filter_options_ttl,
            &format!("{}/filter-options", TRACES_PATH),
        )
        .await
    }

    /// Attribute keys seen in ingested spans and resources.
    #[tracing::instrument(skip(self))]
    pub async fn get_trace_attributes(&self) -> Result<AttributeCatalog> {
        let keys: Vec<AttributeKey> = self
            .get_cached_data(
                "attributes".to_string(),
                self.config().filter_options_ttl,
                &format!("{}/attributes", TRACES_PATH),
            )
            .await?;
        Ok(AttributeCatalog::new(keys))
    }
}
