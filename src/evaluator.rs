use crate::error::{ModelError, Result};
use crate::nodes::{Node, NodeId, NodeStore};
use crate::schema::BinaryOp;
use log::trace;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

/// Evaluates the subgraph reachable from `roots` in topological order and
/// returns the value of every visited node.
///
/// Order within the reachable set is Kahn's algorithm with ties broken by
/// ascending node id, so two evaluations of the same store are identical.
pub fn evaluate(nodes: &NodeStore, roots: &[NodeId]) -> Result<BTreeMap<NodeId, f64>> {
    let reachable = collect_reachable(nodes, roots);

    let mut indegree: BTreeMap<NodeId, usize> = BTreeMap::new();
    let mut parents: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
    for &id in &reachable {
        indegree.entry(id).or_insert(0);
        if let Node::Op { left, right, .. } = nodes.get(id) {
            *indegree.get_mut(&id).expect("just inserted") += 2;
            parents.entry(*left).or_default().push(id);
            parents.entry(*right).or_default().push(id);
        }
    }

    let mut ready: BinaryHeap<Reverse<NodeId>> = BinaryHeap::new();
    for &id in &reachable {
        if indegree[&id] == 0 {
            ready.push(Reverse(id));
        }
    }

    let mut order = Vec::with_capacity(reachable.len());
    while let Some(Reverse(id)) = ready.pop() {
        order.push(id);
        if let Some(dependents) = parents.get(&id) {
            for &dependent in dependents {
                let remaining = indegree.get_mut(&dependent).expect("dependent is reachable");
                *remaining -= 1;
                if *remaining == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }
    }

    // The builder rejects cycles before nodes are admitted; a shortfall here
    // means the store was corrupted.
    if order.len() != reachable.len() {
        let stuck: Vec<String> = reachable
            .iter()
            .copied()
            .filter(|id| indegree[id] != 0)
            .map(|id| nodes.get(id).label().to_string())
            .collect();
        return Err(ModelError::Cycle { path: stuck });
    }

    let mut results: BTreeMap<NodeId, f64> = BTreeMap::new();
    for id in order {
        let value = match nodes.get(id) {
            Node::Leaf { value, .. } => *value,
            Node::Op {
                op,
                left,
                right,
                label,
            } => {
                let lhs = results[left];
                let rhs = results[right];
                if *op == BinaryOp::Div && rhs == 0.0 {
                    return Err(ModelError::DivisionByZero {
                        node: id,
                        label: label.clone(),
                    });
                }
                match op {
                    BinaryOp::Add => lhs + rhs,
                    BinaryOp::Sub => lhs - rhs,
                    BinaryOp::Mul => lhs * rhs,
                    BinaryOp::Div => lhs / rhs,
                }
            }
        };
        trace!("evaluated {}: {} = {value}", id, nodes.get(id).label());
        results.insert(id, value);
    }

    Ok(results)
}

fn collect_reachable(nodes: &NodeStore, roots: &[NodeId]) -> BTreeSet<NodeId> {
    let mut reachable = BTreeSet::new();
    let mut pending: Vec<NodeId> = roots.to_vec();
    while let Some(id) = pending.pop() {
        if !reachable.insert(id) {
            continue;
        }
        if let Node::Op { left, right, .. } = nodes.get(id) {
            pending.push(*left);
            pending.push(*right);
        }
    }
    reachable
}
