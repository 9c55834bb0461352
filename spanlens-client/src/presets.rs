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

//! Saved filter preset endpoints.

use crate::client::{remove_row, SpanlensClient};
use crate::error::Result;
use reqwest::Method;
use spanlens_core::{
    CreatePresetRequest, FilterPreset, Page, PresetTable, UpdatePresetRequest, ValidationErrors,
};

fn presets_path(project_id: &str) -> String {
    format!("/v1/projects/{}/filter-presets", project_id)
}

fn preset_path(project_id: &str, preset_id: &str) -> String {
    format!("{}/{}", presets_path(project_id), preset_id)
}

fn cache_prefix(project_id: &str) -> String {
    format!("presets:{}:", project_id)
}

impl SpanlensClient {
    /// Presets saved for one table.
    #[tracing::instrument(skip(self))]
    pub async fn list_presets(
        &self,
        project_id: &str,
        table: PresetTable,
    ) -> Result<Page<FilterPreset>> {
        let key = format!("{}list:{}", cache_prefix(project_id), table);
        let query = [("table_name".to_string(), table.as_str().to_string())];
        self.get_cached(key, self.config().list_ttl, &presets_path(project_id), &query)
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_preset(&self, project_id: &str, preset_id: &str) -> Result<FilterPreset> {
        self.get_cached_data(
            format!("{}detail:{}", cache_prefix(project_id), preset_id),
            self.config().detail_ttl,
            &preset_path(project_id, preset_id),
        )
        .await
    }

    #[tracing::instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_preset(
        &self,
        project_id: &str,
        request: &CreatePresetRequest,
    ) -> Result<FilterPreset> {
        request.validate()?;
        let body = serde_json::to_value(request)?;
        let preset: FilterPreset = self
            .request_data(Method::POST, &presets_path(project_id), Some(&body))
            .await?;
        self.invalidate(&[cache_prefix(project_id)]);
        tracing::info!(preset_id = %preset.id, "Preset saved");
        Ok(preset)
    }

    #[tracing::instrument(skip(self, request))]
    pub async fn update_preset(
        &self,
        project_id: &str,
        preset_id: &str,
        request: &UpdatePresetRequest,
    ) -> Result<FilterPreset> {
        if request.is_empty() {
            let mut errors = ValidationErrors::default();
            errors.push("preset", "Nothing to update");
            return Err(errors.into());
        }
        request.validate()?;
        let body = serde_json::to_value(request)?;
        let preset: FilterPreset = self
            .request_data(Method::PATCH, &preset_path(project_id, preset_id), Some(&body))
            .await?;
        self.invalidate(&[cache_prefix(project_id)]);
        tracing::info!(preset_id, "Preset updated");
        Ok(preset)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_preset(&self, project_id: &str, preset_id: &str) -> Result<()> {
        let prefix = cache_prefix(project_id);
        let snapshot = self.cache().update_matching(&format!("{}list:", prefix), |cached| {
            remove_row(cached, "id", preset_id)
        });
        let path = preset_path(project_id, preset_id);
        let request = self.send(Method::DELETE, &path, &[], None);
        self.optimistic("delete preset", snapshot, &[prefix], request)
            .await
            .map(drop)
    }
}
