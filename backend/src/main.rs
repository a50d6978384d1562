//! swcload CLI - ingest, inspect and export SWC neuron tracings
//!
//! # Main Commands
//!
//! ```bash
//! swcload serve                                  # Start HTTP server (port 5000)
//! swcload ingest cell.swc --annotator jdoe       # Store a tracing
//! swcload export <tracing-id>                    # Base64 export envelope
//! swcload export <tracing-id> --raw              # Plain SWC text
//! ```
//!
//! # Inspection Commands
//!
//! ```bash
//! swcload parse cell.swc                         # Parse summary (JSON with --json)
//! swcload structures                             # Structure identifier catalog
//! swcload tracings                               # Stored tracings
//! swcload delete <tracing-id>                    # Delete a tracing
//! ```

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use swcload::{
    parse_file, validate_topology, Ingestor, ServiceConfig, SwcStore, TracingQuery,
    TransformClient, UploadMetadata,
};

#[derive(Parser)]
#[command(name = "swcload")]
#[command(about = "Ingest, store and export SWC neuron tracings", long_about = None)]
struct Cli {
    /// SQLite database file (overrides SWC_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start HTTP server
    Serve {
        /// Port to listen on (overrides SWC_API_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Parse an SWC file and report what would be stored
    Parse {
        /// Input SWC file
        input: PathBuf,

        /// Print the full parse result as JSON
        #[arg(long)]
        json: bool,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Store an SWC file as a new tracing
    Ingest {
        /// Input SWC file
        input: PathBuf,

        /// Annotator name
        #[arg(short, long)]
        annotator: String,

        /// Neuron id in the external catalog
        #[arg(short, long)]
        neuron: Option<String>,

        /// Tracing structure id (axon/dendrite)
        #[arg(short, long)]
        structure: Option<String>,
    },

    /// Export a stored tracing
    Export {
        /// Tracing id
        id: String,

        /// Write plain SWC text instead of the base64 JSON envelope
        #[arg(long)]
        raw: bool,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List structure identifiers
    Structures,

    /// List stored tracings
    Tracings {
        /// Only tracings of this neuron
        #[arg(short, long)]
        neuron: Option<String>,

        /// Maximum number of tracings
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Delete a tracing and its nodes
    Delete {
        /// Tracing id
        id: String,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = ServiceConfig::from_env().with_overrides(None, cli.db);

    let result = match cli.command {
        Commands::Serve { port } => cmd_serve(config.with_overrides(port, None)).await,

        Commands::Parse {
            input,
            json,
            output,
        } => cmd_parse(&input, json, output.as_deref()),

        Commands::Ingest {
            input,
            annotator,
            neuron,
            structure,
        } => {
            let metadata = UploadMetadata {
                annotator,
                neuron_id: neuron,
                tracing_structure_id: structure,
            };
            cmd_ingest(&config, &input, metadata).await
        }

        Commands::Export { id, raw, output } => {
            cmd_export(&config, &id, raw, output.as_deref()).await
        }

        Commands::Structures => cmd_structures(&config).await,

        Commands::Tracings { neuron, limit } => cmd_tracings(&config, neuron, limit).await,

        Commands::Delete { id } => cmd_delete(&config, &id).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

/// Open (and seed if needed) the configured store.
fn open_ingestor(config: &ServiceConfig) -> Result<Ingestor, Box<dyn std::error::Error>> {
    let store = SwcStore::open(&config.db_path)?;
    if store.seed_if_required()? {
        eprintln!("🌱 Seeded structure catalogs in {}", config.db_path.display());
    }
    Ok(Ingestor::new(
        Arc::new(store),
        TransformClient::new(config.transform.clone()),
    ))
}

async fn cmd_serve(config: ServiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    swcload::server::start_server(config).await
}

fn cmd_parse(input: &Path, json: bool, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing SWC: {}", input.display());

    let result = parse_file(input)?;

    eprintln!("   Encoding: {}", result.encoding);
    eprintln!("   Rows: {}", result.rows.len());
    eprintln!("   Roots: {} ({} converted to soma)", result.soma_count, result.forced_soma_count);
    eprintln!(
        "   Offset: {} {} {}",
        result.janelia_offset.x, result.janelia_offset.y, result.janelia_offset.z
    );
    if !result.skipped.is_empty() {
        eprintln!("   Skipped lines: {}", result.skipped.len());
        for skipped in result.skipped.iter().take(5) {
            eprintln!("     - line {}: {}", skipped.line, skipped.reason);
        }
    }

    match validate_topology(&result) {
        Ok(()) => eprintln!("✅ Topology valid"),
        Err(e) => eprintln!("❌ {}", e),
    }

    if json {
        let content = serde_json::to_string_pretty(&result)?;
        write_output(&content, output)?;
    }

    Ok(())
}

async fn cmd_ingest(
    config: &ServiceConfig,
    input: &Path,
    metadata: UploadMetadata,
) -> Result<(), Box<dyn std::error::Error>> {
    let ingestor = open_ingestor(config)?;
    let outcome = ingestor.create_from_file(metadata, input).await?;

    eprintln!(
        "✅ Stored tracing {} ({} nodes)",
        outcome.tracing.id, outcome.node_count
    );
    if !outcome.transform_submission.submitted {
        if let Some(ref error) = outcome.transform_submission.error {
            eprintln!("   ⚠️  Transform not requested: {}", error);
        }
    }
    println!("{}", outcome.tracing.id);
    Ok(())
}

async fn cmd_export(
    config: &ServiceConfig,
    id: &str,
    raw: bool,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let ingestor = open_ingestor(config)?;

    let content = if raw {
        ingestor.export_text(id).await?
    } else {
        ingestor
            .export(id)
            .await?
            .map(|export| serde_json::to_string_pretty(&export))
            .transpose()?
    };

    match content {
        Some(content) => write_output(&content, output),
        None => Err(format!("No nodes stored for tracing: {}", id).into()),
    }
}

async fn cmd_structures(config: &ServiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    let ingestor = open_ingestor(config)?;
    for s in ingestor.structure_identifiers().await? {
        println!(
            "  {} {:<18} {:<18} {}{}",
            s.value,
            s.name,
            s.swc_name,
            s.id,
            if s.mutable { "" } else { " (fixed)" }
        );
    }
    Ok(())
}

async fn cmd_tracings(
    config: &ServiceConfig,
    neuron: Option<String>,
    limit: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let ingestor = open_ingestor(config)?;
    let page = ingestor
        .tracings(TracingQuery {
            limit,
            neuron_ids: neuron.map(|n| vec![n]),
            ..Default::default()
        })
        .await?;

    if page.tracings.is_empty() {
        eprintln!("📋 No tracings stored yet.");
        eprintln!("   Use 'swcload ingest <file> --annotator <name>' to add one.");
        return Ok(());
    }

    eprintln!(
        "📋 Tracings ({} of {} matching, {} total):\n",
        page.tracings.len(),
        page.match_count,
        page.total_count
    );
    for t in page.tracings {
        let nodes = ingestor.node_count(&t.id).await?;
        println!("  📄 {} ({})", t.filename, t.id);
        println!("     Annotator: {}", t.annotator);
        if let Some(ref neuron) = t.neuron_id {
            println!("     Neuron: {}", neuron);
        }
        println!("     Nodes: {}", nodes);
        println!("     Updated: {}", t.updated_at);
        println!();
    }
    Ok(())
}

async fn cmd_delete(config: &ServiceConfig, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let ingestor = open_ingestor(config)?;
    let outcome = ingestor.delete_tracing(id).await?;
    eprintln!(
        "🗑️  Tracing deleted: {} ({} nodes)",
        outcome.id, outcome.node_count
    );
    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
