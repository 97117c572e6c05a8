use crate::array::Array;
use crate::error::Result;

// Op — Records how a node was produced
//
// Every node that results from an operator application records HOW it was
// created via an Op. This forms a directed acyclic graph (DAG) that
// backward() traverses to accumulate gradients.
//
// Example: c = a + b
//   a.op = None (leaf)
//   b.op = None (leaf)
//   c.op = Op { kind: Add, parents: [a, b] }
//
// Ops store parent NodeIds rather than live references: nodes live in the
// graph arena, so there are no ownership cycles to break and a parent shared
// by several ops (fan-out) is just the same handle appearing in several
// parent lists.

/// Stable handle to a node inside a graph arena. Used in parent lists and
/// as the address for gradient accumulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

/// The closed set of elementwise binary operator kinds.
///
/// A closed enum dispatched by `match` keeps coverage exhaustiveness
/// checkable at compile time; adding a kind forces every dispatch site to
/// handle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Add,
    Sub,
    Mul,
    Div,
}

impl OpKind {
    /// Number of parents this kind consumes. All current kinds are binary.
    pub fn arity(self) -> usize {
        match self {
            OpKind::Add | OpKind::Sub | OpKind::Mul | OpKind::Div => 2,
        }
    }

    /// Forward formula: combine the two parent values elementwise.
    ///
    /// Pure — returns the computed array and touches nothing else. The
    /// caller builds the result node from the return value.
    pub(crate) fn forward<A: Array>(self, a: &A, b: &A) -> Result<A> {
        match self {
            OpKind::Add => a.add(b),
            OpKind::Sub => a.sub(b),
            OpKind::Mul => a.mul(b),
            OpKind::Div => a.div(b),
        }
    }
}

/// The operation that produced a non-leaf node: an operator kind plus an
/// ordered list of parent handles.
///
/// The parent list is allocated fresh for every instance and is never
/// reassigned after construction. `Vec` rather than a fixed pair so future
/// N-ary kinds do not change the shape of the type.
#[derive(Debug, Clone)]
pub struct Op {
    kind: OpKind,
    parents: Vec<NodeId>,
}

impl Op {
    /// Record a binary application: `kind(lhs, rhs)`, in that order.
    pub fn binary(kind: OpKind, lhs: NodeId, rhs: NodeId) -> Self {
        Op {
            kind,
            parents: vec![lhs, rhs],
        }
    }

    /// The operator kind.
    pub fn kind(&self) -> OpKind {
        self.kind
    }

    /// The ordered parent handles.
    pub fn parents(&self) -> &[NodeId] {
        &self.parents
    }
}
