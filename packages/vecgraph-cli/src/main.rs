//! vecgraph CLI
//!
//! Analyzes C source files and builds computation graphs for vectorization.
//!
//! # Usage
//!
//! ```bash
//! vecgraph kernels.c
//! vecgraph kernels.c --function sum_array --visualize --output-dir out/
//! vecgraph --bf16-demo --visualize
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use vecgraph_ir::features::compute_graph::bf16_demo::build_bf16_dot_product_demo;
use vecgraph_ir::pipeline::{analyze_file, AnalysisConfig, AnalysisOutcome};

#[derive(Parser)]
#[command(name = "vecgraph")]
#[command(about = "Compute Graph Analysis Tool - builds vectorization IR from C sources", long_about = None)]
struct Cli {
    /// Input source file(s)
    #[arg(value_name = "FILE")]
    inputs: Vec<PathBuf>,

    /// Enable verbose output (full graph dumps, debug logging)
    #[arg(long)]
    verbose: bool,

    /// Summarize and dump each surviving compute graph
    #[arg(long)]
    dump_graphs: bool,

    /// Generate DOT files (per graph and per CPG/ICFG/PDG per function)
    #[arg(long)]
    visualize: bool,

    /// Run the registered rewrite patterns on every graph
    #[arg(long)]
    test_patterns: bool,

    /// Output directory for generated files
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Analyze only the named function
    #[arg(long)]
    function: Option<String>,

    /// Override the backward/forward trace depth caps
    #[arg(long)]
    max_depth: Option<u32>,

    /// Write a JSON summary report next to the other outputs
    #[arg(long)]
    json_summary: bool,

    /// Run the manually-constructed BF16 dot product demo graph
    #[arg(long)]
    bf16_demo: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("vecgraph={default_level},vecgraph_ir={default_level}"))),
        )
        .with_target(false)
        .init();

    if cli.bf16_demo {
        run_bf16_demo(&cli);
        if cli.inputs.is_empty() {
            return ExitCode::SUCCESS;
        }
    }

    if cli.inputs.is_empty() {
        eprintln!("error: no input files specified");
        eprintln!("usage: vecgraph <input.c> [options]");
        return ExitCode::FAILURE;
    }

    let config = AnalysisConfig {
        verbose: cli.verbose,
        dump_graphs: cli.dump_graphs,
        visualize: cli.visualize,
        test_patterns: cli.test_patterns,
        output_dir: cli.output_dir.clone(),
        target_function: cli.function.clone(),
        max_depth: cli.max_depth,
        ..Default::default()
    };

    print_banner(&cli);

    for input in &cli.inputs {
        match analyze_file(input, &config) {
            Ok(outcome) => {
                print_outcome(&cli, &outcome);
                if cli.json_summary {
                    if let Err(err) = write_json_summary(&cli, input, &outcome) {
                        error!(%err, "failed to write JSON summary");
                        return ExitCode::FAILURE;
                    }
                }
            }
            Err(err) => {
                eprintln!("error: {err}");
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}

fn print_banner(cli: &Cli) {
    println!("=== vecgraph: compute graph analysis ===");
    println!("  verbose:          {}", cli.verbose);
    println!("  dump graphs:      {}", cli.dump_graphs);
    println!("  visualize:        {}", cli.visualize);
    println!("  pattern matching: {}", cli.test_patterns);
    println!("  output dir:       {}", cli.output_dir.display());
    if let Some(function) = &cli.function {
        println!("  target function:  {function}");
    }
    if let Some(depth) = cli.max_depth {
        println!("  max depth:        {depth}");
    }
    println!();
}

fn print_outcome(cli: &Cli, outcome: &AnalysisOutcome) {
    let report = &outcome.report;
    println!("Analyzed: {}", report.file);

    for func in &report.functions {
        println!(
            "  {}: {} anchors ({} ranked), {} graphs, {} nodes, {} edges",
            func.name, func.raw_anchors, func.ranked_anchors, func.graphs, func.nodes, func.edges
        );
        if cli.test_patterns {
            println!("    pattern matches: {}", func.pattern_matches);
        }
    }

    if cli.dump_graphs {
        for (func_name, set) in &outcome.graph_sets {
            println!("\n--- graphs for {func_name} ---");
            print!("{}", set.dump());
            for graph in set.graphs() {
                println!("{}", graph.summary());
                if cli.verbose {
                    print!("{}", graph.dump());
                }
            }
        }
    }

    for path in &report.dot_files {
        println!("  generated: {}", path.display());
    }

    println!(
        "\nTotals: {} graphs, {} nodes, {} edges",
        report.total_graphs, report.total_nodes, report.total_edges
    );
    let stats = &report.statistics;
    println!(
        "CPG: {} functions, {} ICFG nodes, {} PDG nodes, {} data deps, {} control deps, {} call sites",
        stats.functions, stats.icfg_nodes, stats.pdg_nodes, stats.data_deps, stats.control_deps,
        stats.call_sites
    );
}

fn write_json_summary(
    cli: &Cli,
    input: &PathBuf,
    outcome: &AnalysisOutcome,
) -> std::io::Result<()> {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "analysis".to_string());
    let path = cli.output_dir.join(format!("{stem}_summary.json"));
    std::fs::create_dir_all(&cli.output_dir)?;
    let json = serde_json::to_string_pretty(&outcome.report)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    std::fs::write(&path, json)?;
    println!("  generated: {}", path.display());
    Ok(())
}

fn run_bf16_demo(cli: &Cli) {
    println!("=== BF16 dot product demo (manual graph construction) ===");
    println!("  for (i = 0; i < n; ++i)");
    println!("      sumf += to_fp32(x[i]) * to_fp32(y[i]);");
    println!();

    let graph = build_bf16_dot_product_demo();
    println!("{}", graph.summary());
    if cli.verbose || cli.dump_graphs {
        print!("{}", graph.dump());
    }

    println!("  NEON mapping:");
    println!("    ArrayAccess(x[i])            -> vld1q_bf16(x+i)");
    println!("    ArrayAccess(y[i])            -> vld1q_bf16(y+i)");
    println!("    Call(to_fp32) x2 + Mul + Add -> vbfdotq_f32(acc, vx, vy)");
    println!("    horizontal sum               -> vaddvq_f32(acc)");

    if cli.visualize {
        let path = cli.output_dir.join("bf16_dot_product.dot");
        let dot = vecgraph_ir::features::viz::compute_graph_to_dot_standalone(&graph);
        if std::fs::create_dir_all(&cli.output_dir).is_ok() && std::fs::write(&path, dot).is_ok() {
            println!("  generated: {}", path.display());
        }
    }
}
