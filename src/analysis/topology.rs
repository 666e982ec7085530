//! topology.rs

use std::collections::{BTreeMap, HashMap};

/// Performs a Topological Sort using Depth-First Search (DFS) over a
/// name -> dependency-names map.
///
/// Returns names ordered so that every dependency appears before its consumer.
/// Dependencies that are not keys of the map (series ids, forward references)
/// are treated as leaves and do not appear in the output.
///
/// On a cycle, returns the path that closes it, e.g. `["a", "b", "a"]`.
pub fn sort(edges: &BTreeMap<String, Vec<String>>) -> Result<Vec<String>, Vec<String>> {
    let mut order = Vec::with_capacity(edges.len());
    let mut state: HashMap<&str, VisitState> = HashMap::with_capacity(edges.len());
    let mut stack: Vec<&str> = Vec::new();

    // BTreeMap iteration keeps the output deterministic for equal inputs.
    for name in edges.keys() {
        if !state.contains_key(name.as_str()) {
            visit(name, edges, &mut state, &mut stack, &mut order)?;
        }
    }

    Ok(order)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Visiting, // Used for cycle detection
    Visited,
}

fn visit<'a>(
    node: &'a str,
    edges: &'a BTreeMap<String, Vec<String>>,
    state: &mut HashMap<&'a str, VisitState>,
    stack: &mut Vec<&'a str>,
    order: &mut Vec<String>,
) -> Result<(), Vec<String>> {
    match state.get(node) {
        Some(VisitState::Visited) => return Ok(()),
        Some(VisitState::Visiting) => {
            let start = stack.iter().position(|n| *n == node).unwrap_or(0);
            let mut cycle: Vec<String> = stack[start..].iter().map(|s| s.to_string()).collect();
            cycle.push(node.to_string());
            return Err(cycle);
        }
        None => {}
    }

    let Some(deps) = edges.get(node) else {
        return Ok(());
    };

    state.insert(node, VisitState::Visiting);
    stack.push(node);

    for dep in deps {
        visit(dep, edges, state, stack, order)?;
    }

    stack.pop();
    state.insert(node, VisitState::Visited);
    order.push(node.to_string());
    Ok(())
}
