//! trace.rs

use crate::compute::{ComputationGraph, InputDescription, NodeDescription, NodeKey, NodeState};
use crate::store::Series;
use std::collections::HashMap;
use std::fmt::Write;

/// Renders the dependency tree under `target` with each node's state, the
/// filter version of its value, and a short value summary.
pub fn format_trace(graph: &ComputationGraph, target: &NodeKey) -> String {
    let mut tracer = Tracer { graph, visited_at_level: HashMap::new(), output: String::new() };

    match graph.describe(target) {
        Some(desc) => {
            let _ = writeln!(tracer.output, "TRACE for node '{}' (filter v{}):", target, graph.filter().version());
            let _ = writeln!(tracer.output, "--------------------------------------------------");
            tracer.trace_node(desc, 1, "");
        }
        None => {
            let _ = writeln!(tracer.output, "Error: unknown node {}", target);
        }
    }
    tracer.output
}

struct Tracer<'a> {
    graph: &'a ComputationGraph,
    visited_at_level: HashMap<NodeKey, usize>,
    output: String,
}

impl Tracer<'_> {
    fn trace_node(&mut self, desc: NodeDescription, level: usize, prefix: &str) {
        if let Some(&first_seen) = self.visited_at_level.get(&desc.key) {
            let _ = writeln!(self.output, "{}-> {} (Ref to L{})", prefix, desc.key, first_seen);
            return;
        }
        self.visited_at_level.insert(desc.key.clone(), level);

        let _ = writeln!(
            self.output,
            "{}[L{}] {} = {} <{}> {}",
            prefix,
            level,
            desc.key,
            desc.operation,
            format_status(desc.status.state, desc.status.last_computed_version),
            format_value(desc.value.as_deref()),
        );

        let stem = build_child_stem(prefix);
        let count = desc.inputs.len();
        for (i, input) in desc.inputs.into_iter().enumerate() {
            let connector = if i + 1 == count { "`--" } else { "|--" };
            let child_prefix = format!("{}{}", stem, connector);
            match input {
                InputDescription::Node(key) => match self.graph.describe(&key) {
                    Some(child) => self.trace_node(child, level + 1, &child_prefix),
                    None => {
                        let _ = writeln!(self.output, "{}{} (collected)", child_prefix, key);
                    }
                },
                InputDescription::Series(id) => {
                    let summary = match self.graph.store().get(&id) {
                        Ok(s) => format_value(Some(&*s)),
                        Err(e) => format!("[Err: {}]", e),
                    };
                    let _ = writeln!(self.output, "{}series {} {}", child_prefix, id, summary);
                }
                InputDescription::Selection(criteria) => {
                    let matched = self.graph.store().select(&criteria);
                    let rendered: Vec<String> = criteria.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                    let _ = writeln!(
                        self.output,
                        "{}select {{{}}} -> {} series",
                        child_prefix,
                        rendered.join(", "),
                        matched.len()
                    );
                }
            }
        }
    }
}

fn format_status(state: NodeState, version: Option<u64>) -> String {
    match version {
        Some(v) => format!("{} v{}", state, v),
        None => state.to_string(),
    }
}

fn format_value(series: Option<&Series>) -> String {
    let Some(s) = series else { return "[?]".to_string() };
    let last = s.values().iter().rev().flatten().next();
    match last {
        Some(v) => format!("[len={}, last={:.3}]", s.len(), v),
        None => format!("[len={}, all missing]", s.len()),
    }
}

fn build_child_stem(current_prefix: &str) -> String {
    current_prefix.replace("`--", "   ").replace("|--", "|  ")
}
