//! CLI command implementations
//!
//! `merge` replays a captured fan-out: every shard's complete resultset (or
//! its error) is read from JSON, merged under the given spec and printed as
//! one response. `validate` only checks a spec.

use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::{MergeConfig, MAX_TXN_TIMEOUT_MS};
use crate::merge::{
    check_dist_txn_resultset, MergeDriver, MergeError, MergePoll, MergeSpec, ShardStream,
    ShardTxnOutcome, TxnContext, TxnSignal,
};
use crate::observability::{log_event, Event, Logger, MetricsRegistry, Severity};
use crate::row::Row;

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{read_json_file, read_request, write_error, write_response};

/// Captured fan-out: one entry per shard, plus an optional transaction
#[derive(Debug, Clone, Deserialize)]
pub struct ShardInput {
    pub shards: Vec<CapturedShard>,
    #[serde(default)]
    pub txn: Option<CapturedTxn>,
}

/// One shard's complete resultset
#[derive(Debug, Clone, Deserialize)]
pub struct CapturedShard {
    /// Shard id (defaults to the position in `shards`)
    #[serde(default)]
    pub id: Option<usize>,
    #[serde(default)]
    pub rows: Vec<Row>,
    /// Error the shard reported after sending `rows`
    #[serde(default)]
    pub error: Option<String>,
    /// Logical-to-physical column mapping for this shard's rows
    #[serde(default)]
    pub field_index: Option<Vec<usize>>,
}

/// Transaction signals captured alongside the resultsets
#[derive(Debug, Clone, Deserialize)]
pub struct CapturedTxn {
    pub xid: String,
    /// Participant shard ids (defaults to every shard)
    #[serde(default)]
    pub participants: Option<Vec<usize>>,
    #[serde(default)]
    pub outcomes: Vec<CapturedOutcome>,
}

/// A transaction signal and its arrival offset from transaction start
#[derive(Debug, Clone, Deserialize)]
pub struct CapturedOutcome {
    pub shard: usize,
    pub signal: TxnSignal,
    #[serde(default)]
    pub elapsed_ms: u64,
}

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Merge {
            spec,
            shards,
            config,
        } => merge(&spec, shards.as_deref(), config.as_deref()),
        Command::Validate { spec } => validate(&spec),
    }
}

/// Merge captured shard resultsets and write the merged rows
pub fn merge(spec_path: &Path, shards_path: Option<&Path>, config_path: Option<&Path>) -> CliResult<()> {
    let result = load_config(config_path).and_then(|config| {
        let spec = load_spec(spec_path)?;
        let input: ShardInput = match shards_path {
            Some(path) => read_json_file(path)?,
            None => serde_json::from_value(read_request()?)?,
        };
        let metrics = Arc::new(MetricsRegistry::new());
        merge_captured(spec, input, &config, &metrics)
    });
    respond(result)
}

/// Validate a merge spec and describe it
pub fn validate(spec_path: &Path) -> CliResult<()> {
    let result = load_spec(spec_path).and_then(|spec| {
        let spec = spec.validate()?;
        Ok(json!({
            "valid": true,
            "width": spec.width,
            "order_by": spec.order_by.len(),
            "group_by": spec.group_by.len(),
            "aggregates": spec.aggregates.len(),
            "having": spec.having.is_some(),
            "offset": spec.limit.offset,
            "count": spec.limit.count,
            "unbounded": spec.limit.is_unbounded(),
        }))
    });
    respond(result)
}

fn respond(result: CliResult<Value>) -> CliResult<()> {
    match result {
        Ok(data) => write_response(data),
        Err(e) => {
            write_error(e.code_str(), e.message())?;
            Err(e)
        }
    }
}

/// Loads the config (or defaults) and applies its log level
pub fn load_config(path: Option<&Path>) -> CliResult<MergeConfig> {
    let config = match path {
        Some(path) => MergeConfig::load(path)?,
        None => MergeConfig::default(),
    };
    Logger::set_min_severity(config.severity().unwrap_or(Severity::Info));

    let source = path.map_or_else(|| "defaults".to_string(), |p| p.display().to_string());
    log_event(
        Event::ConfigLoaded,
        &[
            ("source", &source),
            ("max_shards", &config.max_shards.to_string()),
            ("failure_policy", config.failure_policy.as_str()),
        ],
    );
    Ok(config)
}

/// Reads a merge spec. A spec that does not parse is a configuration error.
pub fn load_spec(path: &Path) -> CliResult<MergeSpec> {
    let raw: Value = read_json_file(path)?;
    serde_json::from_value(raw)
        .map_err(|e| CliError::from(MergeError::invalid_spec(e.to_string())))
}

/// Runs one merge over captured resultsets and builds the response body
pub fn merge_captured(
    spec: MergeSpec,
    input: ShardInput,
    config: &MergeConfig,
    metrics: &Arc<MetricsRegistry>,
) -> CliResult<Value> {
    let shard_ids: Vec<usize> = input
        .shards
        .iter()
        .enumerate()
        .map(|(slot, shard)| shard.id.unwrap_or(slot))
        .collect();

    let streams: Vec<ShardStream> = input
        .shards
        .into_iter()
        .zip(&shard_ids)
        .map(|(shard, &id)| {
            let mut stream = ShardStream::new(id);
            if let Some(field_index) = shard.field_index {
                stream = stream.with_field_index(field_index);
            }
            stream.push_rows(shard.rows);
            match shard.error {
                Some(reason) => stream.fail(reason),
                None => stream.finish(),
            }
            stream
        })
        .collect();

    let mut driver = MergeDriver::new(spec, streams, config)?.with_metrics(Arc::clone(metrics));
    if input.txn.is_some() {
        driver = driver.hold_for_transaction();
    }

    // Every captured stream is complete, so one poll always finishes
    let status = match driver.poll() {
        MergePoll::Done(status) => status,
        MergePoll::NotReady | MergePoll::Closed => {
            return Err(CliError::invalid_input("captured shard input is incomplete"));
        }
    };
    let summary = status.into_result()?;

    let mut txn_verdict = Value::Null;
    if let Some(txn) = input.txn {
        let ctx = TxnContext::new(
            txn.xid,
            txn.participants.unwrap_or_else(|| shard_ids.clone()),
            config.txn_timeout(),
        );
        let outcomes: Vec<ShardTxnOutcome> = txn
            .outcomes
            .iter()
            .map(|o| {
                let elapsed = o.elapsed_ms.min(MAX_TXN_TIMEOUT_MS + 1) as i64;
                ShardTxnOutcome::at(
                    o.shard,
                    o.signal,
                    ctx.started_at + Duration::milliseconds(elapsed),
                )
            })
            .collect();

        let verdict = check_dist_txn_resultset(driver.output_mut(), &ctx, &outcomes)?;
        txn_verdict = serde_json::to_value(&verdict)?;
        verdict.into_result(&ctx.xid)?;
    }

    let rows = driver.take_output().drain();
    Ok(json!({
        "merge_id": driver.merge_id().to_string(),
        "rows": rows,
        "summary": summary,
        "txn": txn_verdict,
        "finished_at": Utc::now().to_rfc3339(),
    }))
}
