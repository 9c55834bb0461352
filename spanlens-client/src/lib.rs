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

//! Spanlens Client
//!
//! Async REST client for the spanlens dashboard API: traces, spans, scores,
//! evaluation rules and saved filter presets. Reads are cached with a short
//! TTL and retried on transient failures. Status changes and deletes are
//! applied to cached data first and rolled back if the server rejects them.

pub mod client;
pub mod config;
pub mod error;
pub mod presets;
pub mod retry;
pub mod rules;
pub mod traces;

pub use client::{ClientConfig, SpanlensClient, API_KEY_HEADER};
pub use config::DashboardConfig;
pub use error::{ClientError, Result};
pub use retry::RetryPolicy;
