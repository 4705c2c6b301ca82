// Copyright 2025 the Runebender Xilem Authors
// SPDX-License-Identifier: Apache-2.0

//! Runebender Sync: the live-editing backend for collaborative glyph editing.
//!
//! Clients read glyphs through a [`GlyphHandler`] and change them with
//! path-addressed [`Change`]s. The handler keeps a cache coherent with
//! the font sources on disk, commits edits immediately and writes them
//! back in the background.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod backend;
pub mod changes;
pub mod error;
pub mod handler;
pub mod model;
pub mod settings;

pub use backend::{Backend, MemoryBackend, SourceVersion, UfoBackend};
pub use changes::{Change, ChangeBody, FunctionRegistry, PathKey, apply_change};
pub use error::{ChangeError, HandlerError};
pub use handler::{ChangeNotification, EditRecord, GlyphHandler, PersistStatus};
pub use model::{PackedPath, VariableGlyph};
pub use settings::HandlerConfig;

const USAGE: &str = "Usage: runebender-sync <font.ufo|font.designspace> <get GLYPH | apply EDITS.jsonl | list>";

/// Entry point for the `runebender-sync` command
pub async fn run() -> Result<()> {
    // Initialize tracing subscriber (can be controlled via RUST_LOG env var)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("runebender_sync=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;
    let config = HandlerConfig::from_env()?;
    let backend = Arc::new(UfoBackend::open(command.font_path())?);

    if let Command::List { .. } = command {
        for name in backend.glyph_names()? {
            println!("{name}");
        }
        return Ok(());
    }

    let handler = GlyphHandler::new(backend, FunctionRegistry::glyph_changes(), config);
    let result = match &command {
        Command::Get { glyph, .. } => print_glyph(&handler, glyph).await,
        Command::Apply { edits, .. } => {
            handler.start().await?;
            apply_edits(&handler, edits).await
        }
        Command::List { .. } => Ok(()),
    };
    handler.stop().await;
    result
}

// ============================================================================
// COMMANDS
// ============================================================================

#[derive(Debug, PartialEq)]
enum Command {
    Get { font: PathBuf, glyph: String },
    Apply { font: PathBuf, edits: PathBuf },
    List { font: PathBuf },
}

impl Command {
    fn parse(args: &[String]) -> Result<Self> {
        let font = match args.first() {
            Some(path) => PathBuf::from(path),
            None => bail!("{USAGE}"),
        };
        if !font.exists() {
            bail!("Path does not exist: {}\n{USAGE}", font.display());
        }
        match (args.get(1).map(String::as_str), args.get(2)) {
            (Some("get"), Some(glyph)) => Ok(Self::Get {
                font,
                glyph: glyph.clone(),
            }),
            (Some("apply"), Some(edits)) => Ok(Self::Apply {
                font,
                edits: PathBuf::from(edits),
            }),
            (Some("list"), None) => Ok(Self::List { font }),
            _ => bail!("{USAGE}"),
        }
    }

    fn font_path(&self) -> &Path {
        match self {
            Self::Get { font, .. } | Self::Apply { font, .. } | Self::List { font } => font,
        }
    }
}

/// One line of an edits file
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditLine {
    change: Change,
    #[serde(default = "Change::empty")]
    rollback_change: Change,
    #[serde(default)]
    comment: String,
}

async fn print_glyph(handler: &GlyphHandler, name: &str) -> Result<()> {
    let glyph = handler.get(name).await?;
    println!("{}", serde_json::to_string_pretty(&*glyph)?);
    Ok(())
}

/// Apply newline-delimited edits, then report each one's write status
async fn apply_edits(handler: &GlyphHandler, path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read edits from {}", path.display()))?;

    let mut records = Vec::new();
    let mut rejected = 0;
    for (number, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let outcome = match serde_json::from_str::<EditLine>(line) {
            Ok(edit) => handler
                .edit(edit.change, edit.rollback_change, edit.comment, None)
                .await
                .map_err(anyhow::Error::from),
            Err(e) => Err(anyhow::Error::from(e)),
        };
        match outcome {
            Ok(record) => records.push(record),
            Err(e) => {
                rejected += 1;
                tracing::error!("Line {}: {:#}", number + 1, e);
            }
        }
    }

    handler.flush().await;
    let mut failed = 0;
    for record in &records {
        let outcome = match record.persisted().await {
            Ok(()) => "committed".to_string(),
            Err(e) => {
                failed += 1;
                e.to_string()
            }
        };
        println!("{}\t{}\t{}", record.id(), record.glyph_name(), outcome);
    }

    if rejected + failed > 0 {
        bail!("{rejected} edits rejected, {failed} edits not written");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_commands() {
        let dir = tempfile::TempDir::new().unwrap();
        let font = dir.path().to_str().unwrap();

        assert_eq!(
            Command::parse(&args(&[font, "get", "A"])).unwrap(),
            Command::Get {
                font: PathBuf::from(font),
                glyph: "A".to_string()
            }
        );
        assert!(matches!(
            Command::parse(&args(&[font, "apply", "edits.jsonl"])).unwrap(),
            Command::Apply { .. }
        ));
        assert!(matches!(
            Command::parse(&args(&[font, "list"])).unwrap(),
            Command::List { .. }
        ));
        assert!(Command::parse(&args(&[font, "get"])).is_err());
        assert!(Command::parse(&args(&[font, "explode", "A"])).is_err());
        assert!(Command::parse(&args(&["/no/such/font.ufo", "list"])).is_err());
        assert!(Command::parse(&[]).is_err());
    }

    #[test]
    fn test_edit_line_accepts_compact_keys() {
        let line = r#"{"change": {"p": ["glyphs", "A", "layers", 0, "glyph", "path"], "f": "=xy", "a": [0, 20, 55]}, "comment": "Test edit"}"#;
        let edit: EditLine = serde_json::from_str(line).unwrap();
        assert!(edit.change.is_leaf());
        assert_eq!(edit.rollback_change, Change::empty());
        assert_eq!(edit.comment, "Test edit");
    }

    #[tokio::test]
    async fn test_apply_edits_reports_rejections() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("edits.jsonl");
        std::fs::write(
            &path,
            concat!(
                r#"{"change": {"path": ["glyphs", "A"], "function": "=", "args": ["name", "A"]}}"#,
                "\n\n",
                r#"{"change": {"path": ["glyphs", "A"], "function": "nope", "args": []}}"#,
                "\n",
            ),
        )
        .unwrap();

        let backend = Arc::new(MemoryBackend::with_glyphs([VariableGlyph {
            name: "A".to_string(),
            sources: Vec::new(),
            layers: Vec::new(),
        }]));
        let handler = GlyphHandler::with_backend(backend.clone());
        let err = apply_edits(&handler, &path).await.unwrap_err();
        assert!(err.to_string().contains("1 edits rejected"));
        assert_eq!(handler.history().len(), 1);
        assert_eq!(backend.store_count(), 1);
    }
}
