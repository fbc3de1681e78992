//! Polis CLI: policy ontology backend with an MCP server.
//!
//! Usage:
//!   polis [--db path] [--config file] [--log filter] init
//!   polis seed [--file ontology.yaml]
//!   polis graph [--pretty]
//!   polis mcp

use clap::{Parser, Subcommand};
use polis::config::{CliOverrides, PolisConfig};
use polis::graph::GraphAssembler;
use polis::seed::{Ontology, Seeder};
use polis::{OpenStore, SqliteStore};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "polis", version, about = "Policy ontology, relation graph and PRIME evaluation backend")]
struct Cli {
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log filter, e.g. `debug` or `polis=trace`
    #[arg(long, global = true)]
    log: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and its schema
    Init,
    /// Load an ontology; the built-in one when no file is given
    Seed {
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Print the visualization graph as JSON
    Graph {
        #[arg(long)]
        pretty: bool,
    },
    /// Start the MCP (Model Context Protocol) server on stdio
    Mcp,
}

/// Logs go to stderr so stdout stays free for the MCP transport.
fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_store(config: &PolisConfig) -> Result<SqliteStore, String> {
    SqliteStore::open(&config.db_path)
        .map_err(|e| format!("failed to open database at {}: {}", config.db_path.display(), e))
}

fn cmd_init(config: &PolisConfig) -> i32 {
    match open_store(config) {
        Ok(_) => {
            println!("Initialized {}", config.db_path.display());
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_seed(config: &PolisConfig, file: Option<PathBuf>) -> i32 {
    let ontology = match file {
        Some(ref path) => Ontology::from_path(path),
        None => Ontology::builtin(),
    };
    let ontology = match ontology {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let store = match open_store(config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    match Seeder::new(&store).seed(&ontology) {
        Ok(report) => {
            println!(
                "Seeded: {} inserted, {} already present, {} skipped",
                report.inserted, report.existing, report.skipped
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_graph(config: &PolisConfig, pretty: bool) -> i32 {
    let store = match open_store(config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let graph = match GraphAssembler::new(&store).build() {
        Ok(g) => g,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let rendered = if pretty {
        serde_json::to_string_pretty(&graph)
    } else {
        serde_json::to_string(&graph)
    };
    match rendered {
        Ok(json) => {
            println!("{}", json);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let config = match PolisConfig::resolve(CliOverrides {
        db_path: cli.db,
        log: cli.log,
        config: cli.config,
    }) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    init_tracing(&config.log);

    let code = match cli.command {
        Commands::Init => cmd_init(&config),
        Commands::Seed { file } => cmd_seed(&config, file),
        Commands::Graph { pretty } => cmd_graph(&config, pretty),
        Commands::Mcp => polis::mcp::run_mcp_server(&config),
    };
    std::process::exit(code);
}
