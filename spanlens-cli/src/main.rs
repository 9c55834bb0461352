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

//! Spanlens CLI
//!
//! Command-line front end for the spanlens dashboard: inspect column
//! metadata, work with shareable filter URLs, and browse traces, rules and
//! saved presets through the REST API.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use spanlens_client::{DashboardConfig, SpanlensClient};
use spanlens_core::condition::validate;
use spanlens_core::url_codec::decode_condition;
use spanlens_core::{
    encode_filters, to_api_params, ApiParams, CreatePresetRequest, CreateRuleRequest,
    FilterState, PresetTable, TableKind, TableSpec, TableState, TestRuleRequest,
    TriggerRuleRequest,
};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "spanlens=info,spanlens_client=info,spanlens_core=warn";

#[derive(Parser)]
#[command(name = "spanlens")]
#[command(about = "Spanlens - LLM trace dashboard from the terminal", long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/spanlens/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Project to use instead of the configured one
    #[arg(short, long, env = "SPANLENS_PROJECT_ID")]
    project: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show filterable columns of a table
    Columns {
        /// traces, spans or rules
        table: String,
    },

    /// Encode, decode and check `filters` URL parameters
    Filters {
        #[command(subcommand)]
        command: FilterCommands,
    },

    /// Show the API parameters a table URL query string maps to
    Params {
        table: String,
        /// e.g. "page=2&filters=total_cost:>:0.01"
        #[arg(default_value = "")]
        query: String,
    },

    /// Trace commands
    Traces {
        #[command(subcommand)]
        command: TraceCommands,
    },

    /// Span commands
    Spans {
        #[command(subcommand)]
        command: ListCommand,
    },

    /// Score commands
    Scores {
        #[command(subcommand)]
        command: ListCommand,
    },

    /// Evaluation rule commands
    Rules {
        #[command(subcommand)]
        command: RuleCommands,
    },

    /// Saved filter preset commands
    Presets {
        #[command(subcommand)]
        command: PresetCommands,
    },
}

#[derive(Subcommand)]
enum FilterCommands {
    /// Decode a `filters` parameter into conditions
    Decode { table: String, filters: String },

    /// Encode `column:operator:value` conditions into a `filters` parameter
    Encode {
        table: String,
        #[arg(short, long = "filter", required = true)]
        filters: Vec<String>,
    },

    /// Report every condition that would be dropped or rejected
    Check {
        table: String,
        /// A full query string or a bare `filters` value
        query: String,
    },
}

#[derive(Subcommand)]
enum ListCommand {
    /// List with the given table URL query string
    List {
        #[arg(short, long, default_value = "")]
        query: String,
    },
}

#[derive(Subcommand)]
enum TraceCommands {
    /// List traces with the given table URL query string
    List {
        #[arg(short, long, default_value = "")]
        query: String,
    },
    /// Show one trace
    Get { trace_id: String },
    /// Show the spans of a trace
    Spans { trace_id: String },
    /// Show the scores of a trace
    Scores { trace_id: String },
    /// Replace the tags of a trace
    Tag { trace_id: String, tags: Vec<String> },
    /// Bookmark a trace
    Bookmark {
        trace_id: String,
        /// Remove the bookmark instead
        #[arg(long)]
        off: bool,
    },
    /// Delete a trace
    Delete { trace_id: String },
    /// Show discovered attribute keys
    Attributes,
    /// Show filter dropdown values
    FilterOptions,
}

#[derive(Subcommand)]
enum RuleCommands {
    /// List rules with the given table URL query string
    List {
        #[arg(short, long, default_value = "")]
        query: String,
    },
    Get { rule_id: String },
    /// Create a rule from a JSON file
    Create {
        #[arg(short, long)]
        file: PathBuf,
    },
    Activate { rule_id: String },
    Deactivate { rule_id: String },
    Delete { rule_id: String },
    /// Dry run a rule against recent spans
    Test {
        rule_id: String,
        #[arg(long = "trace-id")]
        trace_ids: Vec<String>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Start a manual execution
    Trigger {
        rule_id: String,
        #[arg(long = "trace-id")]
        trace_ids: Vec<String>,
        #[arg(long)]
        sample_limit: Option<u32>,
    },
    /// List executions of a rule
    Executions {
        rule_id: String,
        #[arg(long, default_value = "1")]
        page: u32,
        #[arg(long, default_value = "20")]
        limit: u32,
    },
    /// Show one execution
    Execution {
        rule_id: String,
        execution_id: String,
        /// Include per-span results
        #[arg(long)]
        detail: bool,
    },
    /// Show the most recent execution
    Latest { rule_id: String },
    /// Show aggregates for a period
    Analytics {
        rule_id: String,
        #[arg(long, default_value = "7d")]
        period: String,
    },
}

#[derive(Subcommand)]
enum PresetCommands {
    /// List presets for a table
    List {
        table: String,
        /// Only presets whose name or description contains this text
        #[arg(long)]
        search: Option<String>,
    },
    Get { preset_id: String },
    /// Save the filters and search of a table URL as a preset
    Save {
        table: String,
        name: String,
        #[arg(short, long, default_value = "")]
        query: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        public: bool,
    },
    /// Print the table URL query string a preset restores
    Load { preset_id: String },
    Delete { preset_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let mut config = DashboardConfig::load(cli.config.clone())?;
    if let Some(project) = &cli.project {
        config.api.project_id = Some(project.clone());
    }
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Commands::Columns { table } => show_columns(parse_table(&table)?),
        Commands::Filters { command } => handle_filter_command(command),
        Commands::Params { table, query } => {
            let spec = parse_table(&table)?.spec();
            let state = TableState::from_query_string(&query, spec);
            print_json(&to_api_params(&state, spec)?)
        }
        Commands::Traces { command } => {
            handle_trace_command(command, &connect(&config)?).await
        }
        Commands::Spans {
            command: ListCommand::List { query },
        } => {
            let params = table_params(TableKind::Spans, &query)?;
            let page = connect(&config)?.list_spans(&params).await?;
            for span in &page.data {
                println!(
                    "{}  {:<32} {:>9} {}",
                    span.span_id,
                    truncate(&span.span_name, 32),
                    format_ms(span.duration),
                    span.model_name.as_deref().unwrap_or("-")
                );
            }
            print_page_footer(page.pagination.page, page.total_pages(), page.pagination.total);
            Ok(())
        }
        Commands::Scores {
            command: ListCommand::List { query },
        } => {
            let params = passthrough_params(&query);
            let page = connect(&config)?.list_scores(&params).await?;
            for score in &page.data {
                println!("{}  {:<24} {}", score.trace_id, score.name, score.display_value());
            }
            print_page_footer(page.pagination.page, page.total_pages(), page.pagination.total);
            Ok(())
        }
        Commands::Rules { command } => handle_rule_command(command, &connect(&config)?).await,
        Commands::Presets { command } => {
            handle_preset_command(command, &connect(&config)?, config.filters.max_filters).await
        }
    }
}

fn init_logging(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn connect(config: &DashboardConfig) -> Result<SpanlensClient> {
    SpanlensClient::new(config.client_config()).context("Failed to create API client")
}

fn parse_table(raw: &str) -> Result<TableKind> {
    TableKind::parse(raw).ok_or_else(|| anyhow!("Unknown table '{}' (expected traces, spans or rules)", raw))
}

fn preset_table(raw: &str) -> Result<PresetTable> {
    PresetTable::parse(raw)
        .ok_or_else(|| anyhow!("Presets exist for traces and spans only, not '{}'", raw))
}

fn table_params(kind: TableKind, query: &str) -> Result<ApiParams> {
    let spec = kind.spec();
    let state = TableState::from_query_string(query, spec);
    Ok(to_api_params(&state, spec)?)
}

/// Scores have no table state; the query string is sent as given.
fn passthrough_params(query: &str) -> ApiParams {
    url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
        .fold(ApiParams::new(), |params, (key, value)| {
            params.with(key.into_owned(), value.into_owned())
        })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_page_footer(page: u32, total_pages: u64, total: u64) {
    println!("-- page {} of {} ({} total)", page, total_pages.max(1), total);
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut short: String = text.chars().take(width.saturating_sub(1)).collect();
    short.push('…');
    short
}

fn format_ms(duration: Option<f64>) -> String {
    match duration {
        Some(ms) if ms >= 1000.0 => format!("{:.2}s", ms / 1000.0),
        Some(ms) => format!("{:.0}ms", ms),
        None => "-".to_string(),
    }
}

fn show_columns(kind: TableKind) -> Result<()> {
    let spec = kind.spec();
    for def in spec.registry.iter() {
        let operators: Vec<&str> = def.operators.iter().map(|op| op.symbol()).collect();
        let id = if def.dynamic {
            format!("{}.<key>", def.id)
        } else {
            def.id.clone()
        };
        let sortable = if spec.is_sortable(&def.id) { " (sortable)" } else { "" };
        println!("{:<28} {:<10} {}{}", id, def.column_type.as_str(), operators.join(" "), sortable);
        if !def.options.is_empty() {
            let options: Vec<String> = def
                .options
                .iter()
                .map(|o| format!("{}={}", o.value, o.label))
                .collect();
            println!("{:<28} options: {}", "", options.join(", "));
        }
    }
    Ok(())
}

/// The `filters` value of a query string, or the input itself when it has
/// no `filters=` parameter.
fn filters_param(query: &str) -> String {
    if !query.contains("filters=") {
        return query.to_string();
    }
    url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
        .find(|(key, _)| key == "filters")
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default()
}

fn handle_filter_command(command: FilterCommands) -> Result<()> {
    match command {
        FilterCommands::Decode { table, filters } => {
            let spec = parse_table(&table)?.spec();
            print_json(&spanlens_core::decode_filters(&filters, spec.registry))
        }
        FilterCommands::Encode { table, filters } => {
            let spec = parse_table(&table)?.spec();
            let mut conditions = Vec::with_capacity(filters.len());
            for raw in &filters {
                let condition = decode_condition(raw, spec.registry)
                    .ok_or_else(|| anyhow!("Cannot parse filter '{}'", raw))?;
                validate(&condition, spec.registry)
                    .with_context(|| format!("Invalid filter '{}'", raw))?;
                conditions.push(condition);
            }
            println!("{}", encode_filters(&conditions));
            Ok(())
        }
        FilterCommands::Check { table, query } => {
            let spec = parse_table(&table)?.spec();
            check_filters(&filters_param(&query), spec)
        }
    }
}

fn check_filters(raw: &str, spec: &TableSpec) -> Result<()> {
    let mut problems = 0;
    for segment in raw.split(',').filter(|s| !s.trim().is_empty()) {
        match decode_condition(segment, spec.registry) {
            None => {
                problems += 1;
                println!("✗ {}  dropped: cannot parse or unknown column/operator", segment);
            }
            Some(condition) => match validate(&condition, spec.registry) {
                Ok(()) => println!("✓ {}", segment),
                Err(e) => {
                    problems += 1;
                    println!("✗ {}  {}", segment, e);
                }
            },
        }
    }
    if problems > 0 {
        bail!("{} filter(s) would not be applied", problems);
    }
    Ok(())
}

async fn handle_trace_command(command: TraceCommands, client: &SpanlensClient) -> Result<()> {
    match command {
        TraceCommands::List { query } => {
            let page = client.list_traces(&table_params(TableKind::Traces, &query)?).await?;
            for trace in &page.data {
                println!(
                    "{}{} {:<32} {:>9} {:>8} {}",
                    if trace.bookmarked { "★ " } else { "  " },
                    trace.trace_id,
                    truncate(&trace.name, 32),
                    format_ms(trace.duration),
                    trace
                        .total_cost
                        .map(|c| format!("${:.4}", c))
                        .unwrap_or_else(|| "-".to_string()),
                    if trace.has_error() { "error" } else { "" }
                );
            }
            print_page_footer(page.pagination.page, page.total_pages(), page.pagination.total);
        }
        TraceCommands::Get { trace_id } => print_json(&client.get_trace(&trace_id).await?)?,
        TraceCommands::Spans { trace_id } => {
            let spans = client.get_trace_spans(&trace_id).await?;
            for span in &spans {
                let indent = if span.is_root() { "" } else { "  " };
                println!(
                    "{}{} {} {}",
                    indent,
                    span.span_id,
                    span.span_name,
                    format_ms(span.duration)
                );
            }
        }
        TraceCommands::Scores { trace_id } => {
            for score in client.get_trace_scores(&trace_id).await? {
                println!("{:<24} {}", score.name, score.display_value());
            }
        }
        TraceCommands::Tag { trace_id, tags } => {
            client.update_trace_tags(&trace_id, &tags).await?;
            println!("✓ Tags updated");
        }
        TraceCommands::Bookmark { trace_id, off } => {
            client.set_trace_bookmark(&trace_id, !off).await?;
            println!("✓ Bookmark {}", if off { "removed" } else { "added" });
        }
        TraceCommands::Delete { trace_id } => {
            client.delete_trace(&trace_id).await?;
            println!("✓ Deleted trace {}", trace_id);
        }
        TraceCommands::Attributes => {
            let catalog = client.get_trace_attributes().await?;
            for column in catalog.columns() {
                println!("{}", column);
            }
        }
        TraceCommands::FilterOptions => print_json(&client.get_filter_options().await?)?,
    }
    Ok(())
}

async fn handle_rule_command(command: RuleCommands, client: &SpanlensClient) -> Result<()> {
    let project = client.default_project()?.to_string();
    match command {
        RuleCommands::List { query } => {
            let page = client
                .list_rules(&project, &table_params(TableKind::Rules, &query)?)
                .await?;
            for rule in &page.data {
                println!(
                    "{}  {:<32} {:<8} {:<8} {:.0}%",
                    rule.id,
                    truncate(&rule.name, 32),
                    rule.status,
                    rule.scorer.kind(),
                    rule.sampling_rate * 100.0
                );
            }
            print_page_footer(page.pagination.page, page.total_pages(), page.pagination.total);
        }
        RuleCommands::Get { rule_id } => print_json(&client.get_rule(&project, &rule_id).await?)?,
        RuleCommands::Create { file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {:?}", file))?;
            let request: CreateRuleRequest =
                serde_json::from_str(&content).context("Invalid rule definition")?;
            let rule = client.create_rule(&project, &request).await?;
            println!("✓ Created rule {} ({})", rule.name, rule.id);
        }
        RuleCommands::Activate { rule_id } => {
            client.activate_rule(&project, &rule_id).await?;
            println!("✓ Rule activated");
        }
        RuleCommands::Deactivate { rule_id } => {
            client.deactivate_rule(&project, &rule_id).await?;
            println!("✓ Rule deactivated");
        }
        RuleCommands::Delete { rule_id } => {
            client.delete_rule(&project, &rule_id).await?;
            println!("✓ Rule deleted");
        }
        RuleCommands::Test {
            rule_id,
            trace_ids,
            limit,
        } => {
            let request = TestRuleRequest {
                trace_ids,
                limit,
                time_range: None,
            };
            print_json(&client.test_rule(&project, &rule_id, &request).await?)?;
        }
        RuleCommands::Trigger {
            rule_id,
            trace_ids,
            sample_limit,
        } => {
            let request = TriggerRuleRequest {
                trace_ids,
                time_range: None,
                sample_limit,
            };
            let response = client.trigger_rule(&project, &rule_id, &request).await?;
            println!("✓ Execution {} started", response.execution_id);
        }
        RuleCommands::Executions {
            rule_id,
            page,
            limit,
        } => {
            let executions = client.list_executions(&project, &rule_id, page, limit).await?;
            for execution in &executions.data {
                println!(
                    "{}  {:?}  scored {}/{}  errors {}",
                    execution.id,
                    execution.status,
                    execution.spans_scored,
                    execution.spans_matched,
                    execution.errors_count
                );
            }
            print_page_footer(
                executions.pagination.page,
                executions.total_pages(),
                executions.pagination.total,
            );
        }
        RuleCommands::Execution {
            rule_id,
            execution_id,
            detail,
        } => {
            if detail {
                print_json(
                    &client
                        .get_execution_detail(&project, &rule_id, &execution_id)
                        .await?,
                )?;
            } else {
                print_json(&client.get_execution(&project, &rule_id, &execution_id).await?)?;
            }
        }
        RuleCommands::Latest { rule_id } => {
            match client.get_latest_execution(&project, &rule_id).await? {
                Some(execution) => print_json(&execution)?,
                None => println!("✗ Rule has not run yet"),
            }
        }
        RuleCommands::Analytics { rule_id, period } => {
            print_json(&client.get_rule_analytics(&project, &rule_id, &period).await?)?
        }
    }
    Ok(())
}

async fn handle_preset_command(
    command: PresetCommands,
    client: &SpanlensClient,
    max_filters: usize,
) -> Result<()> {
    let project = client.default_project()?.to_string();
    match command {
        PresetCommands::List { table, search } => {
            let page = client.list_presets(&project, preset_table(&table)?).await?;
            let query = search.unwrap_or_default();
            for preset in page.data.iter().filter(|p| p.matches(&query)) {
                println!(
                    "{}  {:<32} {} filter(s){}",
                    preset.id,
                    truncate(&preset.name, 32),
                    preset.filters.len(),
                    if preset.is_public { "  public" } else { "" }
                );
            }
        }
        PresetCommands::Get { preset_id } => {
            print_json(&client.get_preset(&project, &preset_id).await?)?
        }
        PresetCommands::Save {
            table,
            name,
            query,
            description,
            public,
        } => {
            let table = preset_table(&table)?;
            let spec = parse_table(table.as_str())?.spec();
            let builder: FilterState =
                TableState::from_query_string(&query, spec).filter_state(max_filters);
            let mut request = CreatePresetRequest::capture(name, table, &builder).public(public);
            if let Some(description) = description {
                request = request.with_description(description);
            }
            let preset = client.create_preset(&project, &request).await?;
            println!("✓ Saved preset {} ({})", preset.name, preset.id);
        }
        PresetCommands::Load { preset_id } => {
            let preset = client.get_preset(&project, &preset_id).await?;
            let spec = parse_table(preset.table_name.as_str())?.spec();
            let builder =
                FilterState::from_preset(&preset, preset.table_name.registry(), max_filters);
            let mut state = TableState::new(spec);
            state.apply_filter_state(&builder);
            println!("{}", state.to_query_string(spec));
        }
        PresetCommands::Delete { preset_id } => {
            client.delete_preset(&project, &preset_id).await?;
            println!("✓ Preset deleted");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_param_from_query_string() {
        assert_eq!(
            filters_param("page=2&filters=name%3ACONTAINS%3Achat&search=x"),
            "name:CONTAINS:chat"
        );
        assert_eq!(filters_param("name:CONTAINS:chat"), "name:CONTAINS:chat");
    }

    #[test]
    fn test_check_filters_reports_problems() {
        let spec = TableKind::Traces.spec();
        assert!(check_filters("name:CONTAINS:chat", spec).is_ok());
        assert!(check_filters("name:CONTAINS:chat,bogus:=:1", spec).is_err());
    }

    #[test]
    fn test_passthrough_params() {
        let params = passthrough_params("?page=3&name=accuracy");
        assert_eq!(params.to_query_string(), "name=accuracy&page=3");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer name", 5), "a lo…");
    }
}
