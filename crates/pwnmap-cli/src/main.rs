//! pwnmap CLI - Command-line interface for pwnmap
//!
//! Loads object caches dumped from a directory, works out who can take
//! over what, and exports attack graphs around interesting targets.

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "pwnmap")]
#[command(author = "pwnmap Contributors")]
#[command(version)]
#[command(about = "Privilege escalation graphs for Active Directory", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Object caches to analyze.
#[derive(Args)]
struct Input {
    /// Cache files produced by the dump step
    #[arg(required = true)]
    caches: Vec<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration to .pwnmap/config.json
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Build an attack graph and write it to a file
    Export {
        #[command(flatten)]
        input: Input,

        /// Filter selecting the target objects (defaults to the configured query)
        #[arg(short, long)]
        query: Option<String>,

        /// Follow edges away from the targets instead of towards them
        #[arg(long)]
        inverted: bool,

        /// Only follow these methods (comma separated)
        #[arg(short, long, value_delimiter = ',')]
        methods: Vec<String>,

        /// graphviz or cytoscapejs
        #[arg(short, long, default_value = "cytoscapejs")]
        format: String,

        /// Output file (defaults to a name derived from the domain)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Maximum hops from the targets
        #[arg(short, long)]
        depth: Option<usize>,
    },

    /// List objects matching an LDAP filter
    Query {
        /// Filter, e.g. "(&(objectClass=user)(_passwordnoexpire=1))"
        filter: String,

        #[command(flatten)]
        input: Input,

        /// Maximum results to print
        #[arg(short, long, default_value = "25")]
        limit: usize,

        /// Also list who can pwn each result
        #[arg(long)]
        why: bool,
    },

    /// Show object and edge counts
    Status {
        #[command(flatten)]
        input: Input,

        /// Output as JSON instead of formatted text
        #[arg(long)]
        json: bool,
    },

    /// List the pwn methods that would be evaluated
    Methods {
        /// Caches whose schema may enable extra methods
        caches: Vec<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let result = match cli.command {
        Commands::Init { path } => commands::init(&path),
        Commands::Export {
            input,
            query,
            inverted,
            methods,
            format,
            output,
            depth,
        } => commands::export(
            &input.caches,
            commands::ExportOptions {
                query,
                inverted,
                methods,
                format,
                output,
                depth,
            },
        ),
        Commands::Query {
            filter,
            input,
            limit,
            why,
        } => commands::query(&input.caches, &filter, limit, why),
        Commands::Status { input, json } => commands::status(&input.caches, json),
        Commands::Methods { caches } => commands::methods(&caches),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}
