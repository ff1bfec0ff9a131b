//! Per-translation-unit analysis pipeline: parse, build the CPG, discover
//! anchors, grow compute graphs, maintain the graph set, emit outputs.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::errors::{Result, VecgraphError};
use crate::features::anchor::AnchorFinder;
use crate::features::compute_graph::{
    register_stock_patterns, ComputeGraphBuilder, ComputeGraphSet, PatternMatcher, TraceLimits,
};
use crate::features::cpg::{CpgContext, CpgStatistics};
use crate::features::viz;
use crate::frontend::parser::parse_translation_unit;

/// Driver-level configuration (the CLI surface maps onto this)
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub verbose: bool,
    pub dump_graphs: bool,
    pub visualize: bool,
    pub test_patterns: bool,
    pub output_dir: PathBuf,
    /// Restrict analysis to one function
    pub target_function: Option<String>,
    /// Overrides both the backward and forward trace caps
    pub max_depth: Option<u32>,
    pub min_loop_depth: u32,
    pub include_non_loop_ops: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            dump_graphs: false,
            visualize: false,
            test_patterns: false,
            output_dir: PathBuf::from("."),
            target_function: None,
            max_depth: None,
            min_loop_depth: 0,
            include_non_loop_ops: true,
        }
    }
}

impl AnalysisConfig {
    pub fn trace_limits(&self) -> TraceLimits {
        let mut limits = TraceLimits::default();
        if let Some(depth) = self.max_depth {
            limits.max_backward_depth = depth;
            limits.max_forward_depth = depth;
        }
        limits
    }
}

/// Per-function counters for the summary block
#[derive(Debug, Clone, Serialize)]
pub struct FunctionReport {
    pub name: String,
    pub raw_anchors: usize,
    pub ranked_anchors: usize,
    pub graphs: usize,
    pub nodes: usize,
    pub edges: usize,
    pub pattern_matches: usize,
}

/// Whole-run summary, serializable for the JSON report
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub file: String,
    pub functions: Vec<FunctionReport>,
    pub statistics: CpgStatistics,
    pub total_graphs: usize,
    pub total_nodes: usize,
    pub total_edges: usize,
    pub dot_files: Vec<PathBuf>,
}

/// Full pipeline result: the context and graphs stay alive for the caller
/// (dumps, pattern queries, further export).
pub struct AnalysisOutcome {
    pub cpg: CpgContext,
    pub graph_sets: Vec<(String, ComputeGraphSet)>,
    pub report: AnalysisReport,
}

pub fn analyze_file(path: &Path, config: &AnalysisConfig) -> Result<AnalysisOutcome> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| VecgraphError::Io(e))?;
    let file_name = path.display().to_string();
    analyze_source(&source, &file_name, config)
}

pub fn analyze_source(
    source: &str,
    file_name: &str,
    config: &AnalysisConfig,
) -> Result<AnalysisOutcome> {
    info!(file = file_name, "analyzing translation unit");
    let tu = parse_translation_unit(source, file_name)?;
    let cpg = CpgContext::build_full(tu);

    let mut matcher = PatternMatcher::new();
    if config.test_patterns {
        register_stock_patterns(&mut matcher);
    }

    let functions: Vec<_> = cpg
        .tu()
        .user_functions()
        .filter(|f| {
            config
                .target_function
                .as_ref()
                .map(|target| &f.name == target)
                .unwrap_or(true)
        })
        .map(|f| (f.id, f.name.clone()))
        .collect();
    info!(count = functions.len(), "functions to analyze");

    let mut graph_sets = Vec::new();
    let mut function_reports = Vec::new();
    let mut dot_files = Vec::new();
    let mut total_graphs = 0usize;
    let mut total_nodes = 0usize;
    let mut total_edges = 0usize;

    for (func, func_name) in functions {
        debug!(function = %func_name, "running anchor discovery");
        let mut finder = AnchorFinder::new(&cpg);
        finder.set_min_loop_depth(config.min_loop_depth);
        finder.set_include_non_loop_ops(config.include_non_loop_ops);
        let raw_anchors = finder.find_anchors_in_function(func);
        let ranked = finder.filter_and_rank_anchors(&raw_anchors);

        let mut builder = ComputeGraphBuilder::with_limits(&cpg, config.trace_limits());
        let mut set = ComputeGraphSet::new();
        for anchor in &ranked {
            let graph = builder.build_from_anchor(anchor);
            if !graph.is_empty() {
                set.add_graph(graph);
            }
        }

        set.deduplicate();
        set.merge_overlapping();
        set.sort_by_score();

        let mut pattern_matches = 0usize;
        if config.test_patterns {
            for graph in set.graphs() {
                for name in matcher.registered_patterns() {
                    pattern_matches += matcher.find_matches(graph, &name).len();
                }
            }
        }

        let nodes: usize = set.graphs().iter().map(|g| g.node_count()).sum();
        let edges: usize = set.graphs().iter().map(|g| g.edge_count()).sum();
        total_graphs += set.len();
        total_nodes += nodes;
        total_edges += edges;

        if config.visualize {
            let func_dir = config.output_dir.clone();
            for (idx, graph) in set.graphs().iter().enumerate() {
                let path = func_dir.join(format!("{func_name}_cg_{idx}.dot"));
                viz::write_dot_file(&path, &viz::compute_graph_to_dot(graph, &cpg))?;
                dot_files.push(path);
            }
            let icfg_path = func_dir.join(format!("{func_name}_icfg.dot"));
            viz::write_dot_file(&icfg_path, &viz::icfg_to_dot(&cpg, func))?;
            dot_files.push(icfg_path);
            let pdg_path = func_dir.join(format!("{func_name}_pdg.dot"));
            viz::write_dot_file(&pdg_path, &viz::pdg_to_dot(&cpg, func))?;
            dot_files.push(pdg_path);
            let cpg_path = func_dir.join(format!("{func_name}_cpg.dot"));
            viz::write_dot_file(&cpg_path, &viz::cpg_to_dot(&cpg, func))?;
            dot_files.push(cpg_path);
        }

        function_reports.push(FunctionReport {
            name: func_name.clone(),
            raw_anchors: raw_anchors.len(),
            ranked_anchors: ranked.len(),
            graphs: set.len(),
            nodes,
            edges,
            pattern_matches,
        });
        graph_sets.push((func_name, set));
    }

    let statistics = cpg.statistics();
    cpg.print_statistics();

    let report = AnalysisReport {
        file: file_name.to_string(),
        functions: function_reports,
        statistics,
        total_graphs,
        total_nodes,
        total_edges,
        dot_files,
    };

    Ok(AnalysisOutcome {
        cpg,
        graph_sets,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
float dot(const float *a, const float *b, int n) {
    float sum = 0.0f;
    for (int i = 0; i < n; ++i) {
        sum += a[i] * b[i];
    }
    return sum;
}
";

    #[test]
    fn test_pipeline_builds_graphs() {
        let outcome =
            analyze_source(SAMPLE, "dot.c", &AnalysisConfig::default()).expect("analysis runs");
        assert_eq!(outcome.report.functions.len(), 1);
        let report = &outcome.report.functions[0];
        assert_eq!(report.name, "dot");
        assert!(report.ranked_anchors >= 1);
        assert!(report.graphs >= 1);
        assert!(report.nodes > 0);
    }

    #[test]
    fn test_pipeline_target_function_filter() {
        let src = format!("{SAMPLE}\nvoid other(int *p) {{ p[0] = p[0] + 1; }}\n");
        let config = AnalysisConfig {
            target_function: Some("other".to_string()),
            ..Default::default()
        };
        let outcome = analyze_source(&src, "two.c", &config).unwrap();
        assert_eq!(outcome.report.functions.len(), 1);
        assert_eq!(outcome.report.functions[0].name, "other");
    }

    #[test]
    fn test_pipeline_visualize_writes_dot_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = AnalysisConfig {
            visualize: true,
            output_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let outcome = analyze_source(SAMPLE, "dot.c", &config).unwrap();
        assert!(!outcome.report.dot_files.is_empty());
        for path in &outcome.report.dot_files {
            assert!(path.exists(), "{path:?} missing");
            let content = std::fs::read_to_string(path).unwrap();
            assert!(content.starts_with("digraph"));
        }
    }

    #[test]
    fn test_pipeline_pattern_matching() {
        let config = AnalysisConfig {
            test_patterns: true,
            ..Default::default()
        };
        let outcome = analyze_source(SAMPLE, "dot.c", &config).unwrap();
        assert!(outcome.report.functions[0].pattern_matches > 0);
    }

    #[test]
    fn test_pipeline_json_report() {
        let outcome = analyze_source(SAMPLE, "dot.c", &AnalysisConfig::default()).unwrap();
        let json = serde_json::to_string_pretty(&outcome.report).unwrap();
        assert!(json.contains("\"total_graphs\""));
    }
}
