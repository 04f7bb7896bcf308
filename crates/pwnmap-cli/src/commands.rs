//! CLI command implementations.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use pwnmap_graph::config::{CONFIG_DIR, CONFIG_FILE};
use pwnmap_graph::{
    Analysis, AnalysisConfig, AnalyzerRegistry, Direction, ExportFormat, Pipeline,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_DIR).join(CONFIG_FILE)
}

fn load_config() -> Result<AnalysisConfig> {
    Ok(AnalysisConfig::load_or_default(&config_path(Path::new(".")))?)
}

/// Loads the caches and runs the whole analysis with progress output.
fn analyze(caches: &[PathBuf], config: AnalysisConfig) -> Result<Analysis> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message("Loading objects...");

    let pipeline = Pipeline::new(config);
    let graph = pipeline.load(caches)?;
    spinner.finish_and_clear();
    println!(
        "{} Loaded {} objects from {} cache file(s)",
        "✓".green(),
        graph.len().to_string().cyan(),
        caches.len()
    );

    let bar = ProgressBar::no_length();
    bar.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} Analyzing who can pwn who ... {pos} objects ({per_sec})")?,
    );
    let analysis = pipeline.run(graph, |_| bar.inc(1));
    bar.finish_and_clear();

    println!(
        "{} Detected {} ways to pwn objects",
        "✓".green(),
        analysis.evaluation.edges_added.to_string().cyan()
    );
    Ok(analysis)
}

/// Write the default configuration.
pub fn init(path: &Path) -> Result<()> {
    let config_path = config_path(path);

    if config_path.exists() {
        println!("{} Already initialized", "✓".green());
        return Ok(());
    }

    AnalysisConfig::default().save(&config_path)?;

    println!("{} Initialized pwnmap in {}", "✓".green(), path.display());
    println!("  Edit {} to change the analysis defaults", config_path.display().to_string().cyan());

    Ok(())
}

pub struct ExportOptions {
    pub query: Option<String>,
    pub inverted: bool,
    pub methods: Vec<String>,
    pub format: String,
    pub output: Option<PathBuf>,
    pub depth: Option<usize>,
}

/// Build an attack graph around the selected objects and write it out.
pub fn export(caches: &[PathBuf], options: ExportOptions) -> Result<()> {
    // Fail on usage errors before the expensive part.
    let format: ExportFormat = options.format.parse()?;
    let mut config = load_config()?;
    if let Some(depth) = options.depth {
        config.max_depth = depth;
    }
    let query = options
        .query
        .clone()
        .unwrap_or_else(|| config.default_query.clone());
    pwnmap_core::parse_query_strict(&query)?;

    let analysis = analyze(caches, config)?;

    let seeds = analysis.select(&query)?;
    if seeds.is_empty() {
        println!("{} No objects match {}", "⚠".yellow(), query.cyan());
        return Ok(());
    }
    println!("Finding most valuable assets ...");

    let methods = analysis.method_filter(&options.methods)?;
    let direction = if options.inverted {
        Direction::Inverted
    } else {
        Direction::Normal
    };
    let attack = analysis.build(&seeds, &methods, direction);
    let export = analysis.export(&attack);

    let output = options.output.unwrap_or_else(|| {
        let domain = analysis.domain().unwrap_or_else(|| "unknown".to_string());
        PathBuf::from(format.default_file_name(&domain))
    });
    export.write(&output, format)?;

    println!(
        "{} Exported {} nodes and {} edges to {}",
        "✓".green(),
        export.nodes.len().to_string().cyan(),
        export.edges.len().to_string().cyan(),
        output.display()
    );

    Ok(())
}

/// List objects matching a filter.
pub fn query(caches: &[PathBuf], filter: &str, limit: usize, why: bool) -> Result<()> {
    pwnmap_core::parse_query_strict(filter)?;
    let analysis = analyze(caches, load_config()?)?;
    let matches = analysis.select(filter)?;

    if matches.is_empty() {
        println!("No matches found for \"{}\"", filter);
        return Ok(());
    }

    println!("Found {} matches:\n", matches.len());

    for &id in matches.iter().take(limit) {
        let Some(object) = analysis.graph.get(id) else {
            continue;
        };
        println!(
            "  {} {} {}",
            object.object_type().to_string().yellow(),
            object.label().cyan(),
            format!("({})", object.dn()).dimmed()
        );
        if why {
            for (method, attacker) in analysis.graph.pwnable_by(id) {
                if let Some(attacker) = analysis.graph.get(attacker) {
                    println!("    {} {}", method.to_string().red(), attacker.label());
                }
            }
        }
    }
    if matches.len() > limit {
        println!("  ... and {} more", matches.len() - limit);
    }

    Ok(())
}

#[derive(Serialize)]
struct StatusReport {
    objects: usize,
    memberships: usize,
    pwn_edges: usize,
    by_type: BTreeMap<String, usize>,
    by_method: BTreeMap<String, usize>,
    trusts: Vec<String>,
}

/// Show counts per object type and per method.
pub fn status(caches: &[PathBuf], json: bool) -> Result<()> {
    let analysis = analyze(caches, load_config()?)?;
    let stats = analysis.graph.stats();

    let report = StatusReport {
        objects: stats.objects,
        memberships: stats.memberships,
        pwn_edges: stats.pwn_edges,
        by_type: analysis
            .graph
            .count_by_type()
            .into_iter()
            .map(|(kind, count)| (kind.to_string(), count))
            .collect(),
        by_method: analysis
            .graph
            .count_by_method()
            .into_iter()
            .map(|(method, count)| (method.to_string(), count))
            .collect(),
        trusts: analysis
            .classification
            .trusts
            .iter()
            .map(|trust| format!("{} ({})", trust.partner, trust.direction))
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "pwnmap Status".cyan().bold());
    println!();
    println!("  {} {}", "Objects:".dimmed(), report.objects);
    println!("  {} {}", "Memberships:".dimmed(), report.memberships);
    println!("  {} {}", "Pwn edges:".dimmed(), report.pwn_edges);
    if let Some(domain) = analysis.domain() {
        println!("  {} {}", "Domain:".dimmed(), domain);
    }

    println!("\n{}", "Objects by type".bold());
    for (kind, count) in &report.by_type {
        println!("  {:<28} {}", kind, count);
    }

    println!("\n{}", "Edges by method".bold());
    for (method, count) in &report.by_method {
        println!("  {:<28} {}", method, count);
    }

    if !report.trusts.is_empty() {
        println!("\n{}", "Trusts".bold());
        for trust in &report.trusts {
            println!("  {}", trust);
        }
    }

    Ok(())
}

/// List registered pwn methods.
pub fn methods(caches: &[PathBuf]) -> Result<()> {
    let methods = if caches.is_empty() {
        AnalyzerRegistry::with_builtin().freeze().methods()
    } else {
        analyze(caches, load_config()?)?.registry().methods()
    };

    println!("{}", "Pwn methods".cyan().bold());
    for method in methods {
        println!("  {}", method);
    }
    Ok(())
}
