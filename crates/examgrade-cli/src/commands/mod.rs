pub mod analysis;
pub mod batch;
pub mod check;
pub mod history;
pub mod import;
pub mod init;
pub mod models;
pub mod run;

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use examgrade_core::events::to_sse_frame;
use examgrade_providers::{load_config_from, GraderConfig};
use examgrade_store::SqliteStore;

/// Load the config and open its database.
fn open_store(config_path: Option<&Path>) -> Result<(GraderConfig, SqliteStore)> {
    let config = load_config_from(config_path)?;
    let store = SqliteStore::open(&config.database)?;
    Ok((config, store))
}

/// Write one event frame to stdout and flush it.
fn write_frame<T: Serialize>(out: &mut impl Write, event: &T) -> Result<()> {
    let frame = to_sse_frame(event).context("failed to encode event")?;
    out.write_all(frame.as_bytes())?;
    out.flush()?;
    Ok(())
}

/// Split a comma-separated list, dropping blanks.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_splitting() {
        assert_eq!(split_list("llama3.2:1b, qwen3:4b,"), vec!["llama3.2:1b", "qwen3:4b"]);
        assert!(split_list(" , ").is_empty());
    }

    #[test]
    fn frames_are_flushed_whole() {
        let mut out = Vec::new();
        write_frame(&mut out, &serde_json::json!({"done": true})).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "data: {\"done\":true}\n\n");
    }
}
