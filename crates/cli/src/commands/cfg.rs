use async_trait::async_trait;
use clap::Args;
use std::error::Error;
use tangle_core::parser::input_to_source;
use tangle_core::report::FlatteningReport;
use tangle_transform::obfuscator::{obfuscate_source, presets};

#[derive(Args)]
pub struct CfgArgs {
    /// Input JavaScript source, or a file path prefixed with @
    pub input: String,
    /// Random seed for transform application (default: 42).
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// Output file for Graphviz .dot (default: stdout)
    #[arg(short, long)]
    output: Option<String>,
}

#[async_trait]
impl super::Command for CfgArgs {
    async fn execute(self) -> Result<(), Box<dyn Error>> {
        let (source, _) = input_to_source(&self.input)?;
        let result = obfuscate_source(&source, presets::default_obfuscation(Some(self.seed)))?;
        tracing::info!("{} target(s) flattened", result.targets_flattened);

        let dot = generate_dot(&result.reports);
        super::write_output(self.output.as_deref(), &dot)
    }
}

/// One `digraph` per flattened target; an empty graph when nothing was flattened.
fn generate_dot(reports: &[FlatteningReport]) -> String {
    if reports.is_empty() {
        return String::from("digraph CFG {\n}\n");
    }
    reports.iter().map(FlatteningReport::to_dot).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_reports_give_empty_graph() {
        assert_eq!(generate_dot(&[]), "digraph CFG {\n}\n");
    }

    #[test]
    fn test_one_graph_per_target() {
        let report = |target: &str| FlatteningReport {
            target: target.into(),
            state_vars: vec![],
            dispatch_name: "d".into(),
            start_label: "s".into(),
            end_label: "e".into(),
            relocated_entries: vec![],
            blocks: vec![],
            edges: vec![],
            scopes: vec![],
        };
        let dot = generate_dot(&[report("f"), report("g")]);
        assert_eq!(dot.matches("digraph").count(), 2);
        assert!(dot.contains("digraph \"g\""));
    }
}
