//! Schemata CLI
//!
//! Command-line access to the scoring engine:
//! - scoring a response set (`score`)
//! - building a sealed export payload (`export`)
//! - validating a payload before it is stored or sent (`validate`)
//! - inspecting the persona table and the registry (`personas`, `registry`)

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};

use schemata_core::{parse_response_map, score_responses, EngineConfig, RawResponse, Registry};
use schemata_export::{build_export, validate_export_value, verify_and_seal, ExportMetadata};

mod logging;

#[derive(Parser)]
#[command(name = "schemata")]
#[command(author, version, about = "Schemata: schema activation scoring and export")]
struct Cli {
    #[command(flatten)]
    log: logging::LogArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score a response set and print scores, ranking and the top three.
    Score {
        /// Responses JSON: `{key: value}` map or an array of response rows.
        input: PathBuf,
        /// Engine config JSON (missing fields take defaults).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Score an in-progress set (no completeness requirement).
        #[arg(long)]
        partial: bool,
        /// Mapping version the responses were collected against.
        #[arg(long)]
        mapping_version: Option<String>,
    },

    /// Build a checksummed export payload from a complete response set.
    Export {
        input: PathBuf,
        #[arg(long)]
        respondent: String,
        #[arg(long)]
        assessment: String,
        /// RFC 3339 completion time.
        #[arg(long, value_parser = parse_timestamp)]
        completed_at: Option<DateTime<Utc>>,
        /// RFC 3339 export time (defaults to now).
        #[arg(long, value_parser = parse_timestamp)]
        exported_at: Option<DateTime<Utc>>,
        /// Write the payload here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Validate an export payload and list every problem found.
    Validate {
        input: PathBuf,
        /// Print issues as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the persona table, or resolve one legacy key to its schema.
    Personas {
        #[arg(long)]
        alias: Option<String>,
    },

    /// Check the embedded registry and print a summary.
    Registry,
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 timestamp {s:?}: {e}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log);

    // A broken registry stops the process here, before any command runs.
    let registry = Registry::load().context("schema registry failed its integrity checks")?;

    match cli.command {
        Commands::Score {
            input,
            config,
            partial,
            mapping_version,
        } => cmd_score(registry, &input, config.as_deref(), partial, mapping_version),
        Commands::Export {
            input,
            respondent,
            assessment,
            completed_at,
            exported_at,
            out,
        } => cmd_export(
            registry,
            &input,
            ExportMetadata {
                respondent_id: respondent,
                assessment_id: assessment,
                completed_at,
                exported_at: exported_at.unwrap_or_else(Utc::now),
            },
            out.as_deref(),
        ),
        Commands::Validate { input, json } => cmd_validate(registry, &input, json),
        Commands::Personas { alias } => cmd_personas(registry, alias.as_deref()),
        Commands::Registry => cmd_registry(registry),
    }
}

pub(crate) fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    EngineConfig::from_json(&text).with_context(|| format!("invalid config {}", path.display()))
}

pub(crate) fn load_responses(path: &Path) -> Result<Vec<RawResponse>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read responses {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("responses {} are not valid JSON", path.display()))?;
    parse_response_map(&value).map_err(|e| anyhow!("{}: {e}", path.display()))
}

fn cmd_score(
    registry: &Registry,
    input: &Path,
    config: Option<&Path>,
    partial: bool,
    mapping_version: Option<String>,
) -> Result<()> {
    let mut config = load_config(config)?;
    if partial {
        config.require_completeness = false;
    }
    if mapping_version.is_some() {
        config.expected_mapping_version = mapping_version;
    }

    let responses = load_responses(input)?;
    tracing::info!(responses = responses.len(), input = %input.display(), "scoring");

    let outcome = score_responses(registry, &responses, &config).map_err(|e| {
        eprintln!("{} {}", "error".red().bold(), e.user_message());
        anyhow!(e)
    })?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn cmd_export(
    registry: &Registry,
    input: &Path,
    metadata: ExportMetadata,
    out: Option<&Path>,
) -> Result<()> {
    let responses = load_responses(input)?;
    let payload = build_export(registry, &responses, &metadata)
        .with_context(|| format!("cannot export {}", input.display()))?;

    let text = verify_and_seal(registry, &payload).map_err(|issues| {
        for issue in &issues {
            eprintln!("{} {}: {}", "invalid".red().bold(), issue.field, issue.problem);
        }
        anyhow!("export payload failed validation ({} problems)", issues.len())
    })?;

    match out {
        Some(path) => {
            fs::write(path, format!("{text}\n"))
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!(
                "{} {} (sha256 {})",
                "wrote".green().bold(),
                path.display().to_string().bold(),
                payload.provenance.checksum_sha256
            );
        }
        None => println!("{text}"),
    }
    Ok(())
}

fn cmd_validate(registry: &Registry, input: &Path, json: bool) -> Result<()> {
    let text = fs::read_to_string(input)
        .with_context(|| format!("failed to read payload {}", input.display()))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("payload {} is not valid JSON", input.display()))?;

    match validate_export_value(registry, &value) {
        Ok(()) => {
            if json {
                println!("[]");
            }
            eprintln!("{} {}", "ok".green().bold(), input.display());
            Ok(())
        }
        Err(issues) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&issues)?);
            } else {
                for issue in &issues {
                    println!("{} {}: {}", "✗".red(), issue.field.bold(), issue.problem);
                }
            }
            Err(anyhow!(
                "{} failed validation ({} problems)",
                input.display(),
                issues.len()
            ))
        }
    }
}

fn cmd_personas(registry: &Registry, alias: Option<&str>) -> Result<()> {
    let table = registry.personas();
    match alias {
        Some(key) => {
            let schema = table
                .resolve_alias(key)
                .ok_or_else(|| anyhow!("no schema known as {key:?}"))?;
            let persona = table.get(schema);
            println!(
                "{} {} → {} ({})",
                "→".yellow(),
                key,
                schema.to_string().bold(),
                persona.public_name
            );
        }
        None => println!("{}", serde_json::to_string_pretty(&table.to_v1())?),
    }
    Ok(())
}

fn cmd_registry(registry: &Registry) -> Result<()> {
    eprintln!(
        "{} mapping {} ({} items, {} personas, table {})",
        "ok".green().bold(),
        registry.mapping_version().bold(),
        registry.items().len(),
        registry.personas().iter().count(),
        registry.personas().version()
    );
    Ok(())
}
