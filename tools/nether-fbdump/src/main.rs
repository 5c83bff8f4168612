//! nether-fbdump - Nethercore table-buffer dump tool
//!
//! Decodes a binary file (a .nczxscene by default) through a TOML schema and
//! prints every field as an indented tree or as JSON. Field-level read errors
//! are printed inline and logged; only a broken root or schema is fatal.

mod render;

use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{Level, debug, warn};
use tracing_subscriber::EnvFilter;

use nether_fb::decode::{DEFAULT_MAX_DEPTH, DEFAULT_MAX_TABLES, DecodeOptions, Decoder};
use nether_fb::schema::Schema;
use nether_fb::verify::{VerifyOptions, open_root_strict};
use nether_fb::{Buffer, RootOptions, Table, open_root_with, scene};

#[derive(Parser)]
#[command(name = "nether-fbdump")]
#[command(about = "Dump Nethercore table-buffer files")]
#[command(version)]
struct Cli {
    /// Binary file to dump
    file: PathBuf,

    /// Schema file (default: bundled scene schema)
    #[arg(short, long)]
    schema: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Validate the whole buffer before dumping
    #[arg(long)]
    strict: bool,

    /// Deepest table nesting to expand
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// Most tables to expand; shared subtables count once per visit
    #[arg(long, default_value_t = DEFAULT_MAX_TABLES)]
    max_tables: usize,

    /// Elements shown per vector (default: all)
    #[arg(long)]
    max_elements: Option<usize>,

    /// Accept files whose identifier does not match the schema
    #[arg(long)]
    no_identifier_check: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries only the dump.
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .init();

    run(&cli)
}

fn run(cli: &Cli) -> Result<()> {
    let schema = load_schema(cli.schema.as_deref())?;

    let bytes = std::fs::read(&cli.file)
        .with_context(|| format!("Failed to read {}", cli.file.display()))?;
    let buffer = Buffer::with_endian(bytes, schema.endian());
    debug!(
        file = %cli.file.display(),
        bytes = buffer.len(),
        root_type = %schema.root_table().name,
        "Loaded buffer"
    );

    let root = open(cli, &buffer, &schema)?;

    let options = DecodeOptions {
        max_depth: cli.max_depth,
        max_elements: cli.max_elements.unwrap_or(usize::MAX),
        max_tables: cli.max_tables,
    };
    let decoded = Decoder::with_options(&schema, options).decode_root(&root);

    let failures = decoded.failures();
    for (field, err) in &failures {
        warn!(
            file = %cli.file.display(),
            field = %field,
            kind = ?err.kind(),
            "{err}"
        );
    }
    debug!(failures = failures.len(), "Decoded root");

    let mut out = std::io::stdout().lock();
    match cli.format {
        Format::Text => render::write_text(&mut out, &decoded)?,
        Format::Json => {
            serde_json::to_writer_pretty(&mut out, &render::to_json(&decoded))?;
            writeln!(out)?;
        }
    }
    Ok(())
}

fn load_schema(path: Option<&Path>) -> Result<Schema> {
    match path {
        Some(path) => {
            Schema::load(path).with_context(|| format!("Failed to load schema {}", path.display()))
        }
        None => scene::scene_schema().context("Bundled scene schema is invalid"),
    }
}

fn open(cli: &Cli, buffer: &Buffer, schema: &Schema) -> Result<Table> {
    if cli.strict {
        let options = VerifyOptions {
            max_depth: cli.max_depth,
            max_tables: cli.max_tables,
            check_identifier: !cli.no_identifier_check,
            ..VerifyOptions::default()
        };
        return open_root_strict(buffer, schema, &options)
            .with_context(|| format!("Strict check of {} failed", cli.file.display()));
    }

    let options = if cli.no_identifier_check {
        RootOptions::default()
    } else {
        schema.root_options()
    };
    open_root_with(buffer, &options)
        .with_context(|| format!("Failed to open root table of {}", cli.file.display()))
}
