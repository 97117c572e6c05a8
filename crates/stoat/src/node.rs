use crate::array::{Array, Value};
use crate::error::{Error, Result};
use crate::op::Op;

// Node — A vertex of the computation graph
//
// A node pairs the data computed (or supplied) for it with an accumulator
// for the gradient flowing back into it. Non-leaf nodes additionally record
// the operation that produced them; that record is what backward() walks.
//
// Nodes never leave the arena — user code holds Tensor handles.

/// A graph vertex: value, gradient accumulator, and provenance.
#[derive(Debug)]
pub(crate) struct Node<A: Array> {
    /// The computed or caller-supplied data.
    pub(crate) value: A,
    /// Accumulator for upstream gradient contributions; same shape as
    /// `value`, zero-initialized.
    pub(crate) grad: A,
    /// True if supplied directly by a caller.
    pub(crate) is_leaf: bool,
    /// The operation that created this node. Present iff `is_leaf` is false;
    /// set once at construction, never reassigned.
    pub(crate) op: Option<Op>,
}

impl<A: Array> Node<A> {
    /// Build a node, enforcing the leaf/operation pairing invariant before
    /// any coercion work happens.
    fn new(value: Value<A>, is_leaf: bool, op: Option<Op>) -> Result<Self> {
        if !is_leaf && op.is_none() {
            return Err(Error::NonLeafMissingOperation);
        }
        if is_leaf && op.is_some() {
            return Err(Error::LeafWithOperation);
        }
        let value = value.into_array()?;
        let grad = A::zeros(value.shape());
        Ok(Node {
            value,
            grad,
            is_leaf,
            op,
        })
    }

    /// A leaf node: caller-supplied data, no producing operation.
    pub(crate) fn leaf(value: Value<A>) -> Result<Self> {
        Self::new(value, true, None)
    }

    /// A result node: produced by `op` from its parents.
    pub(crate) fn result(value: Value<A>, op: Op) -> Result<Self> {
        Self::new(value, false, Some(op))
    }

    /// Reset the gradient accumulator to zeros matching the value's shape.
    pub(crate) fn zero_grad(&mut self) {
        self.grad = A::zeros(self.value.shape());
    }
}
