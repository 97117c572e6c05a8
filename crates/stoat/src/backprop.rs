use crate::array::Array;
use crate::error::{Error, Result};
use crate::op::{NodeId, OpKind};
use crate::tensor::GraphInner;

// Backpropagation — Reverse-mode automatic differentiation
//
// HOW IT WORKS:
//
//   1. Forward pass: operator applications build a DAG where each node
//      records the Op that created it, with handles to its parents.
//
//   2. backward() topologically sorts the subgraph reachable from the root
//      by following parent edges (leaves first, root last).
//
//   3. Starting with grad(root) = 1.0 elementwise, the order is walked in
//      reverse. For each node with an op, the chain rule deposits that op's
//      local derivatives into the parents' grad accumulators.
//
// GRADIENT RULES (g = the visited node's accumulated grad):
//
//   Add:  a.grad += g            b.grad += g
//   Sub:  a.grad += g            b.grad -= g
//   Mul:  a.grad += g * b        b.grad += g * a
//   Div:  a.grad += g / b        b.grad -= g * a / b²
//
// ACCUMULATION: contributions always sum into the existing grad, never
// overwrite it. A node consumed by several ops (fan-out) receives the sum
// of all contributions — the multivariate chain rule over a DAG, not a
// tree. The reverse-topological order guarantees every consumer has
// deposited its contribution before the node's own op runs.
//
// For example: y = x + x, then x.grad = 1 + 1 = 2.

/// DFS visitation states. `InProgress` marks nodes on the current DFS path;
/// reaching one again means a back edge, i.e. a cycle.
#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Post-order over every node reachable from `root` via parent edges:
/// a node appears only after all of its parents, so the root comes last.
///
/// Iterative DFS with an explicit stack, so deep op chains cannot overflow
/// the call stack. A node reachable along multiple paths (diamonds from
/// fan-out) is emitted exactly once. Cycles cannot arise from construction;
/// the check is defensive and fails with [`Error::CycleDetected`].
pub(crate) fn topo_order<A: Array>(graph: &GraphInner<A>, root: NodeId) -> Result<Vec<NodeId>> {
    enum Frame {
        Enter(NodeId),
        Exit(NodeId),
    }

    let mut marks = vec![Mark::Unvisited; graph.nodes.len()];
    let mut order = Vec::new();
    let mut stack = vec![Frame::Enter(root)];

    while let Some(frame) = stack.pop() {
        match frame {
            Frame::Enter(id) => match marks[id.0] {
                Mark::Done => {}
                Mark::InProgress => return Err(Error::CycleDetected),
                Mark::Unvisited => {
                    marks[id.0] = Mark::InProgress;
                    stack.push(Frame::Exit(id));
                    if let Some(op) = &graph.nodes[id.0].op {
                        for &parent in op.parents() {
                            stack.push(Frame::Enter(parent));
                        }
                    }
                }
            },
            Frame::Exit(id) => {
                marks[id.0] = Mark::Done;
                order.push(id);
            }
        }
    }

    Ok(order)
}

/// Compute gradients of `root` with respect to every reachable node.
///
/// Takes the whole arena mutably: the pass has exclusive access to every
/// node it can reach for its entire duration. All validation (leaf check,
/// cycle check) runs before the first grad is touched, so a failure leaves
/// every accumulator untouched.
pub(crate) fn backward<A: Array>(graph: &mut GraphInner<A>, root: NodeId) -> Result<()> {
    if graph.nodes[root.0].is_leaf {
        return Err(Error::InvalidBackwardTarget);
    }

    let order = topo_order(graph, root)?;

    // Seed: d(root)/d(root) = 1 elementwise.
    let root_shape = graph.nodes[root.0].value.shape().to_vec();
    graph.nodes[root.0].grad = A::ones(&root_shape);

    // Walk root-to-leaf. Leaves appear in the order (their grads were
    // accumulated into) but have no op to invoke.
    for &id in order.iter().rev() {
        let Some(op) = graph.nodes[id.0].op.clone() else {
            continue;
        };
        let gradient = graph.nodes[id.0].grad.clone();
        accumulate(graph, op.kind(), op.parents(), &gradient)?;
    }

    Ok(())
}

/// Apply one op's backward formula: deposit local derivatives scaled by the
/// incoming gradient into the parents' accumulators.
fn accumulate<A: Array>(
    graph: &mut GraphInner<A>,
    kind: OpKind,
    parents: &[NodeId],
    gradient: &A,
) -> Result<()> {
    let [a, b] = parents else {
        crate::bail!("{:?} expects 2 parents, got {}", kind, parents.len());
    };
    let (a, b) = (*a, *b);
    let a_value = graph.nodes[a.0].value.clone();
    let b_value = graph.nodes[b.0].value.clone();

    match kind {
        OpKind::Add => {
            add_to_grad(graph, a, gradient)?;
            add_to_grad(graph, b, gradient)?;
        }
        OpKind::Sub => {
            add_to_grad(graph, a, gradient)?;
            sub_from_grad(graph, b, gradient)?;
        }
        OpKind::Mul => {
            add_to_grad(graph, a, &gradient.mul(&b_value)?)?;
            add_to_grad(graph, b, &gradient.mul(&a_value)?)?;
        }
        OpKind::Div => {
            add_to_grad(graph, a, &gradient.div(&b_value)?)?;
            sub_from_grad(graph, b, &gradient.mul(&a_value)?.div(&b_value.powi(2))?)?;
        }
    }
    Ok(())
}

fn add_to_grad<A: Array>(graph: &mut GraphInner<A>, id: NodeId, delta: &A) -> Result<()> {
    let grad = graph.nodes[id.0].grad.add(delta)?;
    graph.nodes[id.0].grad = grad;
    Ok(())
}

fn sub_from_grad<A: Array>(graph: &mut GraphInner<A>, id: NodeId, delta: &A) -> Result<()> {
    let grad = graph.nodes[id.0].grad.sub(delta)?;
    graph.nodes[id.0].grad = grad;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::Value;
    use crate::node::Node;
    use crate::op::Op;
    use ndarray::ArrayD;

    type NdInner = GraphInner<ArrayD<f64>>;

    fn leaf(graph: &mut NdInner, v: f64) -> NodeId {
        let id = NodeId(graph.nodes.len());
        graph.nodes.push(Node::leaf(Value::Scalar(v)).unwrap());
        id
    }

    fn result(graph: &mut NdInner, v: f64, op: Op) -> NodeId {
        let id = NodeId(graph.nodes.len());
        graph.nodes.push(Node::result(Value::Scalar(v), op).unwrap());
        id
    }

    #[test]
    fn test_topo_order_respects_parent_edges() {
        // w = (x + y) * x
        let mut g = NdInner { nodes: Vec::new() };
        let x = leaf(&mut g, 2.0);
        let y = leaf(&mut g, 3.0);
        let s = result(&mut g, 5.0, Op::binary(OpKind::Add, x, y));
        let w = result(&mut g, 10.0, Op::binary(OpKind::Mul, s, x));

        let order = topo_order(&g, w).unwrap();
        assert_eq!(order.len(), 4);
        assert_eq!(*order.last().unwrap(), w);
        let pos = |id: NodeId| order.iter().position(|&o| o == id).unwrap();
        assert!(pos(x) < pos(s));
        assert!(pos(y) < pos(s));
        assert!(pos(s) < pos(w));
    }

    #[test]
    fn test_diamond_visited_once() {
        let mut g = NdInner { nodes: Vec::new() };
        let x = leaf(&mut g, 2.0);
        let one = leaf(&mut g, 1.0);
        let two = leaf(&mut g, 2.0);
        let y = result(&mut g, 3.0, Op::binary(OpKind::Add, x, one));
        let z = result(&mut g, 4.0, Op::binary(OpKind::Mul, x, two));
        let w = result(&mut g, 7.0, Op::binary(OpKind::Add, y, z));

        let order = topo_order(&g, w).unwrap();
        assert_eq!(order.len(), 6);
        assert_eq!(order.iter().filter(|&&o| o == x).count(), 1);
    }

    #[test]
    fn test_unreachable_nodes_excluded() {
        let mut g = NdInner { nodes: Vec::new() };
        let a = leaf(&mut g, 1.0);
        let b = leaf(&mut g, 2.0);
        let c = result(&mut g, 3.0, Op::binary(OpKind::Add, a, b));
        let _unused = leaf(&mut g, 9.0);

        let order = topo_order(&g, c).unwrap();
        assert_eq!(order.len(), 3);
    }

    #[test]
    fn test_cycle_detected() {
        // Forge an arena where a node is its own ancestor. The public API
        // cannot build this; the traversal must still refuse it.
        let mut g = NdInner { nodes: Vec::new() };
        let a = leaf(&mut g, 1.0);
        let b = result(&mut g, 2.0, Op::binary(OpKind::Add, a, NodeId(2)));
        let c = result(&mut g, 3.0, Op::binary(OpKind::Add, b, a));
        assert_eq!(c, NodeId(2));

        assert!(matches!(topo_order(&g, c), Err(Error::CycleDetected)));
    }

    #[test]
    fn test_backward_on_leaf_rejected_before_any_mutation() {
        let mut g = NdInner { nodes: Vec::new() };
        let a = leaf(&mut g, 1.0);
        assert!(matches!(
            backward(&mut g, a),
            Err(Error::InvalidBackwardTarget)
        ));
        assert_eq!(g.nodes[a.0].grad.to_vec(), vec![0.0]);
    }

    #[test]
    fn test_failed_backward_leaves_grads_untouched() {
        let mut g = NdInner { nodes: Vec::new() };
        let a = leaf(&mut g, 1.0);
        let b = result(&mut g, 2.0, Op::binary(OpKind::Add, a, NodeId(1)));
        // b references itself: cycle. No grad may change, not even the seed.
        assert!(matches!(backward(&mut g, b), Err(Error::CycleDetected)));
        assert_eq!(g.nodes[b.0].grad.to_vec(), vec![0.0]);
        assert_eq!(g.nodes[a.0].grad.to_vec(), vec![0.0]);
    }
}
