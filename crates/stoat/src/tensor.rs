use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::array::{Array, Value};
use crate::backprop;
use crate::error::{Error, Result};
use crate::node::Node;
use crate::op::{NodeId, Op, OpKind};

// Tensor — Handle into the computation graph
//
// ARCHITECTURE:
//
//   Nodes live in an arena (a plain Vec) owned by the graph; every handle —
//   Graph and Tensor alike — shares the arena through Rc. A Tensor is just
//   the arena pointer plus a NodeId, so cloning one is O(1) and ops record
//   parent NodeIds instead of live references. The arena and every node in
//   it are reclaimed together once the last handle drops.
//
// MEMORY & CONCURRENCY MODEL:
//
//   Rc<RefCell<...>> rather than Arc<RwLock<...>>: the engine is
//   single-threaded and synchronous by design, and backward() needs
//   exclusive access to every reachable node for its whole duration (its
//   `+=` accumulations are not atomic). Taking one borrow_mut() for the
//   entire pass makes that single-writer requirement a property of the
//   types instead of a convention.
//
// Graph construction is eager: each operator application immediately runs
// the forward formula and pushes the Node/Op pair into the arena.

pub(crate) struct GraphInner<A: Array> {
    pub(crate) nodes: Vec<Node<A>>,
}

/// Builder and owner of a computation graph.
///
/// All tensors combined by an operator must come from the same graph.
///
/// # Example
/// ```
/// use stoat::NdGraph;
///
/// let g = NdGraph::new();
/// let a = g.leaf(3.0)?;
/// let b = g.leaf(4.0)?;
/// let c = a.add(&b)?;
/// assert_eq!(c.to_vec(), vec![7.0]);
/// # Ok::<(), stoat::Error>(())
/// ```
pub struct Graph<A: Array> {
    inner: Rc<RefCell<GraphInner<A>>>,
}

// Manual Clone: Rc::clone is cheap, and both handles address the same arena.
impl<A: Array> Clone for Graph<A> {
    fn clone(&self) -> Self {
        Graph {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A: Array> Default for Graph<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Array> Graph<A> {
    /// Create an empty graph.
    pub fn new() -> Self {
        Graph {
            inner: Rc::new(RefCell::new(GraphInner { nodes: Vec::new() })),
        }
    }

    /// Create a leaf tensor from caller-supplied data.
    ///
    /// Scalars are promoted to single-element arrays; a zero-element array
    /// fails with [`Error::InvalidValueType`]. The gradient accumulator
    /// starts as zeros of the value's shape.
    pub fn leaf(&self, value: impl Into<Value<A>>) -> Result<Tensor<A>> {
        Ok(insert(&self.inner, Node::leaf(value.into())?))
    }

    /// Create a result tensor from an already-computed forward value and the
    /// operation that produced it.
    ///
    /// This is the raw form of what the operator entry points do; it is
    /// exposed so callers can record externally computed operations. Every
    /// parent handle must point into this graph.
    pub fn result(&self, value: impl Into<Value<A>>, op: Op) -> Result<Tensor<A>> {
        {
            let inner = self.inner.borrow();
            for p in op.parents() {
                if p.0 >= inner.nodes.len() {
                    crate::bail!("operation references node {:?} not present in this graph", p);
                }
            }
        }
        Ok(insert(&self.inner, Node::result(value.into(), op)?))
    }

    /// Number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.inner.borrow().nodes.len()
    }

    /// True if no node has been created yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reset every node's gradient accumulator to zeros.
    ///
    /// Call between independent backward passes: gradients accumulate, so a
    /// second pass over a graph with stale grads would sum with the first
    /// pass's results instead of reproducing them.
    pub fn zero_grad_all(&self) {
        let mut inner = self.inner.borrow_mut();
        for node in &mut inner.nodes {
            node.zero_grad();
        }
    }
}

/// Push a node into the arena and hand back a tensor addressing it.
fn insert<A: Array>(graph: &Rc<RefCell<GraphInner<A>>>, node: Node<A>) -> Tensor<A> {
    let mut inner = graph.borrow_mut();
    let id = NodeId(inner.nodes.len());
    inner.nodes.push(node);
    Tensor {
        graph: Rc::clone(graph),
        id,
    }
}

/// Handle to a node in a computation graph. Cloning is O(1).
pub struct Tensor<A: Array> {
    graph: Rc<RefCell<GraphInner<A>>>,
    id: NodeId,
}

impl<A: Array> Clone for Tensor<A> {
    fn clone(&self) -> Self {
        Tensor {
            graph: Rc::clone(&self.graph),
            id: self.id,
        }
    }
}

impl<A: Array> fmt::Debug for Tensor<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.graph.borrow();
        let node = &inner.nodes[self.id.0];
        write!(
            f,
            "Tensor(id={:?}, shape={:?}, leaf={})",
            self.id,
            node.value.shape(),
            node.is_leaf,
        )
    }
}

/// Right-hand operand of a binary operator: an existing tensor, or a value
/// to be wrapped as a fresh leaf of the left operand's graph.
pub enum Operand<'a, A: Array> {
    Tensor(&'a Tensor<A>),
    Value(Value<A>),
}

impl<'a, A: Array> From<&'a Tensor<A>> for Operand<'a, A> {
    fn from(t: &'a Tensor<A>) -> Self {
        Operand::Tensor(t)
    }
}

impl<A: Array> From<f64> for Operand<'_, A> {
    fn from(v: f64) -> Self {
        Operand::Value(Value::Scalar(v))
    }
}

impl From<ndarray::ArrayD<f64>> for Operand<'_, ndarray::ArrayD<f64>> {
    fn from(a: ndarray::ArrayD<f64>) -> Self {
        Operand::Value(Value::Array(a))
    }
}

impl<A: Array> Tensor<A> {
    // Accessors

    /// Stable handle of this tensor's node within its graph.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// A handle to the graph this tensor belongs to.
    pub fn graph(&self) -> Graph<A> {
        Graph {
            inner: Rc::clone(&self.graph),
        }
    }

    /// The node's value.
    pub fn value(&self) -> A {
        self.graph.borrow().nodes[self.id.0].value.clone()
    }

    /// The node's accumulated gradient.
    pub fn grad(&self) -> A {
        self.graph.borrow().nodes[self.id.0].grad.clone()
    }

    /// The value's elements as a flat Vec<f64> (for inspection).
    pub fn to_vec(&self) -> Vec<f64> {
        self.graph.borrow().nodes[self.id.0].value.to_vec()
    }

    /// The value's shape.
    pub fn shape(&self) -> Vec<usize> {
        self.graph.borrow().nodes[self.id.0].value.shape().to_vec()
    }

    /// True if this node was supplied directly by a caller.
    pub fn is_leaf(&self) -> bool {
        self.graph.borrow().nodes[self.id.0].is_leaf
    }

    // Arithmetic operations

    /// Elementwise addition: self + rhs.
    pub fn add<'a>(&self, rhs: impl Into<Operand<'a, A>>) -> Result<Self> {
        self.binary(OpKind::Add, rhs.into())
    }

    /// Elementwise subtraction: self - rhs.
    pub fn sub<'a>(&self, rhs: impl Into<Operand<'a, A>>) -> Result<Self> {
        self.binary(OpKind::Sub, rhs.into())
    }

    /// Elementwise multiplication: self * rhs.
    pub fn mul<'a>(&self, rhs: impl Into<Operand<'a, A>>) -> Result<Self> {
        self.binary(OpKind::Mul, rhs.into())
    }

    /// Elementwise division: self / rhs.
    pub fn div<'a>(&self, rhs: impl Into<Operand<'a, A>>) -> Result<Self> {
        self.binary(OpKind::Div, rhs.into())
    }

    /// Single entry point for all binary operators: coerce the operand, run
    /// the pure forward formula, and push the result node recording the op.
    fn binary(&self, kind: OpKind, rhs: Operand<'_, A>) -> Result<Self> {
        let rhs = self.coerce(rhs)?;
        let value = {
            let inner = self.graph.borrow();
            let a = &inner.nodes[self.id.0].value;
            let b = &inner.nodes[rhs.id.0].value;
            kind.forward(a, b)?
        };
        let op = Op::binary(kind, self.id, rhs.id);
        Ok(insert(&self.graph, Node::result(Value::Array(value), op)?))
    }

    /// Uniform operand coercion: a tensor must share this graph; anything
    /// else is wrapped as a fresh leaf. Applied identically by every
    /// operator, never per-operator.
    fn coerce(&self, operand: Operand<'_, A>) -> Result<Self> {
        match operand {
            Operand::Tensor(t) => {
                if !Rc::ptr_eq(&self.graph, &t.graph) {
                    return Err(Error::GraphMismatch);
                }
                Ok(t.clone())
            }
            Operand::Value(v) => Ok(insert(&self.graph, Node::leaf(v)?)),
        }
    }

    // Gradients

    /// Reset this node's gradient accumulator to zeros of the value's shape.
    pub fn zero_grad(&self) {
        self.graph.borrow_mut().nodes[self.id.0].zero_grad();
    }

    /// Run reverse-mode gradient accumulation from this node.
    ///
    /// Fails with [`Error::InvalidBackwardTarget`] on a leaf. Otherwise the
    /// reachable subgraph is topologically ordered, this node's grad is
    /// seeded to ones of its shape, and the order is walked root-to-leaf,
    /// accumulating each op's local derivatives into its parents' grads.
    ///
    /// The ones seed treats the root as fully responsible for itself
    /// (d(root)/d(root) = 1 elementwise). That is a simplification valid
    /// for scalar or per-element-independent losses, not a general
    /// vector-Jacobian seed.
    ///
    /// Holds exclusive access to the whole arena for the duration of the
    /// pass; gradients accumulate across passes until reset via
    /// [`Tensor::zero_grad`] or [`Graph::zero_grad_all`].
    pub fn backward(&self) -> Result<()> {
        let mut inner = self.graph.borrow_mut();
        backprop::backward(&mut inner, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::ArrayD;

    type NdGraph = Graph<ArrayD<f64>>;

    #[test]
    fn test_scalar_operand_becomes_one_leaf() {
        let g = NdGraph::new();
        let a = g.leaf(2.0).unwrap();
        assert_eq!(g.len(), 1);
        let b = a.add(1.0).unwrap();
        // One coerced leaf plus one result node.
        assert_eq!(g.len(), 3);
        assert_eq!(b.to_vec(), vec![3.0]);
        assert!(!b.is_leaf());
    }

    #[test]
    fn test_array_operand_coercion() {
        let g = NdGraph::new();
        let a = g.leaf(6.0).unwrap();
        let b = a.div(<ArrayD<f64> as Array>::from_scalar(2.0)).unwrap();
        assert_eq!(b.to_vec(), vec![3.0]);
    }

    #[test]
    fn test_cross_graph_operands_rejected() {
        let g1 = NdGraph::new();
        let g2 = NdGraph::new();
        let a = g1.leaf(1.0).unwrap();
        let b = g2.leaf(2.0).unwrap();
        assert!(matches!(a.add(&b), Err(Error::GraphMismatch)));
    }

    #[test]
    fn test_result_constructor_validates_parents() {
        let g = NdGraph::new();
        let a = g.leaf(1.0).unwrap();
        let b = g.leaf(2.0).unwrap();
        let ok = g.result(3.0, Op::binary(OpKind::Add, a.id(), b.id()));
        assert!(ok.is_ok());

        let stale = Op::binary(OpKind::Add, a.id(), NodeId(99));
        assert!(matches!(g.result(3.0, stale), Err(Error::Msg(_))));
    }

    #[test]
    fn test_forward_does_not_mutate_operands() {
        let g = NdGraph::new();
        let a = g.leaf(2.0).unwrap();
        let b = g.leaf(5.0).unwrap();
        let _ = a.mul(&b).unwrap();
        assert_eq!(a.to_vec(), vec![2.0]);
        assert_eq!(b.to_vec(), vec![5.0]);
        assert_eq!(a.grad().to_vec(), vec![0.0]);
        assert_eq!(b.grad().to_vec(), vec![0.0]);
    }
}
