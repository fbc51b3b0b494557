//! Risk scorer entrypoint. Config, artifacts and model are loaded once; any
//! failure there exits before a single request is read.
//!
//! Usage:
//!   risk-scorer              score newline-delimited requests from stdin
//!   risk-scorer <file>       score one request envelope from a file
//!   risk-scorer --health     print readiness and exit

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use txn_risk_scorer::{
    config::{resolve_workers, ServiceConfig},
    logging::StructuredLogger,
    model, PredictError, PredictRequest, PredictionService, ReferenceStats, Schema,
};

fn build_service(config: &ServiceConfig) -> Result<PredictionService> {
    let schema = Schema::load(&config.artifacts.schema_path).with_context(|| {
        format!(
            "loading feature schema {}",
            config.artifacts.schema_path.display()
        )
    })?;
    let stats = ReferenceStats::load_or_default(&config.artifacts.stats_path).with_context(|| {
        format!(
            "loading reference statistics {}",
            config.artifacts.stats_path.display()
        )
    })?;
    let model = model::load(&config.model)
        .with_context(|| format!("loading model {}", config.model.path.display()))?;

    Ok(PredictionService::new(
        Arc::new(schema),
        Arc::new(stats),
        model,
        config.decision.clone(),
    ))
}

fn malformed_request() -> Value {
    json!({ "error": "malformed_request" })
}

/// Answer one request envelope. Envelope problems are answered, never fatal.
fn respond(service: &PredictionService, body: &str) -> Value {
    let request: PredictRequest = match serde_json::from_str(body) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "malformed request");
            return malformed_request();
        }
    };
    match service.predict(request) {
        Ok(response) => serde_json::to_value(&response).unwrap_or_else(|e| {
            error!(error = %e, "response serialization failed");
            json!({ "error": "internal_error" })
        }),
        Err(PredictError::EmptyBatch) => json!({ "error": "empty_request" }),
    }
}

/// One newline-delimited input line.
#[derive(Debug, PartialEq)]
enum Line {
    Blank,
    Body(String),
    NotUtf8,
}

impl Line {
    fn decode(raw: Vec<u8>) -> Self {
        match String::from_utf8(raw) {
            Ok(text) if text.trim().is_empty() => Line::Blank,
            Ok(text) => Line::Body(text),
            Err(e) => {
                warn!(error = %e, "request is not valid UTF-8");
                Line::NotUtf8
            }
        }
    }
}

/// A line that is not UTF-8 is still answered, in order.
fn answer(service: &PredictionService, line: Line) -> Value {
    match line {
        Line::Body(body) => respond(service, &body),
        Line::Blank | Line::NotUtf8 => malformed_request(),
    }
}

fn score_file(service: &PredictionService, path: &Path) -> Result<()> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("reading request {}", path.display()))?;
    let response = respond(service, &body);
    StructuredLogger::emit_json(&response, &mut std::io::stdout().lock())?;
    Ok(())
}

/// Requests are scored concurrently (bounded by `workers`); responses are
/// written in input order.
async fn serve_stdin(service: Arc<PredictionService>, workers: usize) -> Result<()> {
    let semaphore = Arc::new(Semaphore::new(workers));
    let (tx, mut rx) = mpsc::channel::<JoinHandle<Vec<u8>>>(workers * 2);

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(handle) = rx.recv().await {
            let line = handle.await?;
            stdout.write_all(&line).await?;
            stdout.flush().await?;
        }
        Ok::<_, anyhow::Error>(())
    });

    info!(workers, "reading requests from stdin");
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut raw = Vec::new();
    let mut received: u64 = 0;
    loop {
        if reader.read_until(b'\n', &mut raw).await? == 0 {
            break;
        }
        let line = match Line::decode(std::mem::take(&mut raw)) {
            Line::Blank => continue,
            line => line,
        };
        received += 1;

        let permit = semaphore.clone().acquire_owned().await?;
        let service = service.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let response = answer(&service, line);
            let mut buf = Vec::new();
            if let Err(e) = StructuredLogger::emit_json(&response, &mut buf) {
                error!(error = %e, "failed to encode response");
            }
            buf
        });
        if tx.send(handle).await.is_err() {
            break;
        }
    }

    drop(tx);
    writer.await??;
    info!(requests = received, "input closed");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::var("RISK_SCORER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.json"));
    let config = ServiceConfig::load(&config_path)?;

    StructuredLogger::init(config.log.json, &config.log.level);
    info!(config = %config_path.display(), "risk scorer starting");

    let service = match build_service(&config) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            error!(error = %format!("{e:#}"), "startup failed");
            return Err(e);
        }
    };
    let health = service.health();
    info!(
        features = health.features,
        model = %health.model,
        block_threshold = config.decision.block_threshold,
        "service ready"
    );

    match std::env::args().nth(1) {
        Some(arg) if arg == "--health" => {
            StructuredLogger::emit_json(&health, &mut std::io::stdout().lock())?;
            Ok(())
        }
        Some(path) => score_file(&service, Path::new(&path)),
        None => serve_stdin(service, resolve_workers(config.pipeline.workers)).await,
    }
}
