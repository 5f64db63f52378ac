//! # pnp-twin CLI
//!
//! Command-line utilities for inspecting property topics and documents.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pnp_twin_core::{
    extract_version, AckPayloadBuilder, ComponentRegistry, DocumentCursor, JsonReader, JsonWriter,
    PropertyError, PropertyFilter, ResponseKind, TokenStream, TokenWriter,
};
use pnp_twin_proto::topics::DEFAULT_PREFIX;
use pnp_twin_proto::{RequestKind, TopicScheme};
use serde_json::{json, Value};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// Largest payload `ack` will build.
const ACK_BUFFER_LIMIT: usize = 64 * 1024;

#[derive(Debug, Parser)]
#[command(name = "pnp-twin", version, about = "Device twin property utilities")]
struct Cli {
    /// Topic prefix
    #[arg(long, global = true, default_value = DEFAULT_PREFIX)]
    prefix: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Classify an inbound topic
    Classify {
        /// Topic to classify
        topic: String,
    },
    /// Build an outbound request topic
    Topic {
        /// Request kind
        #[arg(value_enum)]
        kind: RequestArg,
        /// Correlation id
        rid: String,
    },
    /// List the properties of a document
    Walk {
        /// JSON document
        file: PathBuf,
        /// Document kind
        #[arg(long, value_enum)]
        kind: DocumentArg,
        /// Walk the reported section of a GET response
        #[arg(long)]
        reported: bool,
        /// Registered component name (repeatable)
        #[arg(long = "component")]
        components: Vec<String>,
    },
    /// Print the version of a document
    Version {
        /// JSON document
        file: PathBuf,
        /// Document kind
        #[arg(long, value_enum)]
        kind: DocumentArg,
    },
    /// Build a writable-property acknowledgement
    Ack {
        /// Property name
        #[arg(long)]
        property: String,
        /// Status code
        #[arg(long)]
        code: u16,
        /// Version being acknowledged
        #[arg(long)]
        version: i64,
        /// Component the property belongs to
        #[arg(long)]
        component: Option<String>,
        /// Optional description
        #[arg(long)]
        description: Option<String>,
        /// Property value as JSON
        #[arg(long, allow_hyphen_values = true)]
        value: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RequestArg {
    Get,
    Patch,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DocumentArg {
    Get,
    Patch,
}

impl From<DocumentArg> for ResponseKind {
    fn from(kind: DocumentArg) -> Self {
        match kind {
            DocumentArg::Get => Self::DocumentGet,
            DocumentArg::Patch => Self::DesiredPatch,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = run(cli)?;
    println!("{output}");
    Ok(())
}

fn run(cli: Cli) -> Result<String> {
    let scheme = TopicScheme::new(cli.prefix);

    match cli.command {
        Command::Classify { topic } => classify(&scheme, &topic),
        Command::Topic { kind, rid } => {
            let kind = match kind {
                RequestArg::Get => RequestKind::DocumentGet,
                RequestArg::Patch => RequestKind::ReportedPatch,
            };
            Ok(scheme.topic(kind, &rid)?)
        }
        Command::Walk {
            file,
            kind,
            reported,
            components,
        } => {
            let payload = read_document(&file)?;
            let filter = if reported {
                PropertyFilter::AllReportedByDevice
            } else {
                PropertyFilter::WriteableOnly
            };
            walk(
                &payload,
                kind.into(),
                filter,
                &ComponentRegistry::new(components),
            )
        }
        Command::Version { file, kind } => {
            let payload = read_document(&file)?;
            let mut stream = JsonReader::from_slice(&payload)?;
            stream.advance()?;
            Ok(extract_version(&mut stream, kind.into())?.to_string())
        }
        Command::Ack {
            property,
            code,
            version,
            component,
            description,
            value,
        } => {
            let value: Value = serde_json::from_str(&value).context("Invalid --value JSON")?;
            ack(
                component.as_deref(),
                &property,
                code,
                version,
                description.as_deref(),
                &value,
            )
        }
    }
}

fn read_document(file: &Path) -> Result<Vec<u8>> {
    fs::read(file).with_context(|| format!("Failed to read {}", file.display()))
}

fn classify(scheme: &TopicScheme, topic: &str) -> Result<String> {
    let Some(descriptor) = scheme.classify(topic)? else {
        bail!("Not a property topic: {topic}");
    };

    let summary = json!({
        "kind": descriptor.kind.to_string(),
        "rid": descriptor.correlation_id,
        "status": descriptor.status,
        "version": descriptor.version,
    });
    Ok(summary.to_string())
}

fn walk(
    payload: &[u8],
    kind: ResponseKind,
    filter: PropertyFilter,
    registry: &ComponentRegistry,
) -> Result<String> {
    let mut stream = JsonReader::from_slice(payload)?;
    stream.advance()?;
    let mut cursor = DocumentCursor::new(stream, registry, kind, filter)?;

    let mut output = String::new();
    while let Some(property) = cursor.next_property()? {
        let value = cursor.read_value()?;
        if !output.is_empty() {
            output.push('\n');
        }
        match property.component {
            Some(component) => write!(output, "{component}/{} = {value}", property.name)?,
            None => write!(output, "{} = {value}", property.name)?,
        }
    }
    Ok(output)
}

fn ack(
    component: Option<&str>,
    property: &str,
    code: u16,
    version: i64,
    description: Option<&str>,
    value: &Value,
) -> Result<String> {
    let mut capacity = 256;
    loop {
        let mut buffer = vec![0; capacity];
        match write_ack(&mut buffer, component, property, code, version, description, value) {
            Ok(len) => {
                buffer.truncate(len);
                return Ok(String::from_utf8(buffer)?);
            }
            Err(PropertyError::InsufficientBuffer { .. }) if capacity < ACK_BUFFER_LIMIT => {
                capacity *= 4;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

fn write_ack(
    buffer: &mut [u8],
    component: Option<&str>,
    property: &str,
    code: u16,
    version: i64,
    description: Option<&str>,
    value: &Value,
) -> pnp_twin_core::Result<usize> {
    let mut writer = JsonWriter::new(buffer);
    let mut builder = AckPayloadBuilder::new(&mut writer)?;
    if let Some(component) = component {
        builder.begin_component(component)?;
    }
    builder.begin_status(property, code, version, description)?;
    builder.writer().value(value)?;
    builder.end_status()?;
    if component.is_some() {
        builder.end_component()?;
    }
    builder.finish()?;
    Ok(writer.len())
}
