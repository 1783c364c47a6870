//! Topological layering for `DependencyOrdered` stages: within a
//! topological layer, execution is parallel. Built on `petgraph`,
//! narrowed to Kahn's layered variant so the planner can run each layer
//! as one `parallel` batch instead of one node at a time.

use std::collections::HashMap;

use gitaudit_core::{GitopsError, GitopsResult};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

/// Returns `actions` grouped into layers: layer 0 has no dependencies,
/// layer N depends only on actions in layers `< N`. Errors on a cycle or
/// on a dependency naming an action absent from `actions`.
pub fn layer_order(actions: &[String], dependencies: &HashMap<String, Vec<String>>) -> GitopsResult<Vec<Vec<String>>> {
    let mut graph = DiGraph::<String, ()>::new();
    let mut nodes: HashMap<String, NodeIndex> = HashMap::new();
    for action in actions {
        nodes.insert(action.clone(), graph.add_node(action.clone()));
    }

    for (action, deps) in dependencies {
        let Some(&to) = nodes.get(action) else {
            return Err(GitopsError::validation(format!("dependency entry for unknown action '{action}'")));
        };
        for dep in deps {
            let Some(&from) = nodes.get(dep) else {
                return Err(GitopsError::validation(format!("action '{action}' depends on unknown action '{dep}'")));
            };
            graph.add_edge(from, to, ());
        }
    }

    let mut remaining: std::collections::HashSet<NodeIndex> = graph.node_indices().collect();
    let mut layers = Vec::new();

    while !remaining.is_empty() {
        let ready: Vec<NodeIndex> = remaining
            .iter()
            .copied()
            .filter(|&n| graph.edges_directed(n, Direction::Incoming).all(|e| !remaining.contains(&e.source())))
            .collect();

        if ready.is_empty() {
            return Err(GitopsError::validation("cyclic dependency among stage actions"));
        }

        let mut layer: Vec<String> = ready.iter().map(|&n| graph[n].clone()).collect();
        layer.sort();
        layers.push(layer);
        for n in ready {
            remaining.remove(&n);
        }
    }

    Ok(layers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn independent_actions_land_in_one_layer() {
        let actions = vec!["a".to_string(), "b".to_string()];
        let layers = layer_order(&actions, &HashMap::new()).unwrap();
        assert_eq!(layers, vec![vec!["a".to_string(), "b".to_string()]]);
    }

    #[test]
    fn a_chain_produces_one_action_per_layer() {
        let actions = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let mut deps = HashMap::new();
        deps.insert("b".to_string(), vec!["a".to_string()]);
        deps.insert("c".to_string(), vec!["b".to_string()]);
        let layers = layer_order(&actions, &deps).unwrap();
        assert_eq!(layers, vec![vec!["a".to_string()], vec!["b".to_string()], vec!["c".to_string()]]);
    }

    #[test]
    fn a_cycle_is_rejected() {
        let actions = vec!["a".to_string(), "b".to_string()];
        let mut deps = HashMap::new();
        deps.insert("a".to_string(), vec!["b".to_string()]);
        deps.insert("b".to_string(), vec!["a".to_string()]);
        assert!(layer_order(&actions, &deps).is_err());
    }

    #[test]
    fn diamond_dependencies_join_before_the_final_layer() {
        let actions = vec!["a".to_string(), "b".to_string(), "c".to_string(), "d".to_string()];
        let mut deps = HashMap::new();
        deps.insert("b".to_string(), vec!["a".to_string()]);
        deps.insert("c".to_string(), vec!["a".to_string()]);
        deps.insert("d".to_string(), vec!["b".to_string(), "c".to_string()]);
        let layers = layer_order(&actions, &deps).unwrap();
        assert_eq!(layers, vec![vec!["a".to_string()], vec!["b".to_string(), "c".to_string()], vec!["d".to_string()]]);
    }
}
