//! State Import Binary
//!
//! Imports a discovery snapshot into a state document and, optionally,
//! configuration text.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `IMPORT_SNAPSHOT`: path to the JSON discovery snapshot (required)
//! - `IMPORT_CONFIG`: path to a JSON import config (optional)
//! - `IMPORT_STATE_OUT`: state output path (default: terraform.tfstate)
//! - `IMPORT_HCL_OUT`: configuration output path (optional)
//! - `IMPORT_INCLUDE`, `IMPORT_EXCLUDE`, `IMPORT_TAGS`, `IMPORT_INTERPOLATE`: filter overrides
//! - `RUST_LOG`: Log level filter (default: info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: json)
//!
//! ## Usage
//!
//! ```bash
//! IMPORT_SNAPSHOT=snapshot.json IMPORT_HCL_OUT=main.tf LOG_FORMAT=pretty cargo run --bin state_import
//! ```

use std::time::Instant;

use tracing::{error, info};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use import_kernel::writer::Writer;
use import_kernel::{FileTarget, HclWriter, ImportConfig, Importer, InMemoryReader, StateWriter};

/// Initialize the tracing subscriber with JSON or pretty format
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "state_import=info,import_kernel=info".into());

    if log_format == "pretty" {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE)
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .flatten_event(true)
            )
            .init();
    }
}

fn load_config() -> Result<ImportConfig, Box<dyn std::error::Error>> {
    let mut config = match std::env::var("IMPORT_CONFIG") {
        Ok(path) if !path.is_empty() => {
            info!(path = %path, "loading import config");
            ImportConfig::from_json_file(path)?
        }
        _ => ImportConfig::default(),
    };
    config.apply_env_overrides()?;
    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let version = env!("CARGO_PKG_VERSION");
    info!(version = version, "Starting state import");

    let snapshot = match std::env::var("IMPORT_SNAPSHOT") {
        Ok(path) if !path.is_empty() => path,
        _ => {
            error!("IMPORT_SNAPSHOT not set");
            return Err("IMPORT_SNAPSHOT is required".into());
        }
    };
    let state_out =
        std::env::var("IMPORT_STATE_OUT").unwrap_or_else(|_| "terraform.tfstate".to_string());
    let hcl_out = std::env::var("IMPORT_HCL_OUT").ok().filter(|p| !p.is_empty());

    let config = load_config()?;
    let reader = InMemoryReader::from_path(&snapshot)?;
    info!(snapshot = %snapshot, "snapshot loaded");

    let started = Instant::now();
    let mut state = StateWriter::new(FileTarget::new(&state_out));
    let mut hcl = hcl_out.as_ref().map(|path| HclWriter::new(FileTarget::new(path)));

    let mut writers: Vec<&mut dyn Writer> = Vec::new();
    writers.push(&mut state);
    if let Some(hcl) = hcl.as_mut() {
        writers.push(hcl);
    }

    let summary = Importer::new(&reader, &config).run(&mut writers)?;

    info!(
        state = %state_out,
        config = hcl_out.as_deref().unwrap_or("-"),
        lineage = %state.lineage(),
        written = summary.written,
        references = summary.references,
        latency_ms = started.elapsed().as_millis() as u64,
        "State import complete"
    );

    Ok(())
}
