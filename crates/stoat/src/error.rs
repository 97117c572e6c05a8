/// All errors that can occur within Stoat.
///
/// Every failure is raised synchronously at the point of the violated
/// contract. All operations are pure, in-memory computations, so there are
/// no transient failure modes and no retry paths; a failed construction or
/// backward call leaves every existing node's value and grad untouched.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A value supplied to a node constructor is not usable as array data
    /// (e.g., an array with zero elements).
    #[error("invalid value: expected a scalar or a non-empty array")]
    InvalidValueType,

    /// Attempt to construct a non-leaf node without the operation that
    /// produced it.
    #[error("non-leaf node requires a producing operation")]
    NonLeafMissingOperation,

    /// Attempt to attach a producing operation to a leaf node.
    #[error("leaf node must not carry a producing operation")]
    LeafWithOperation,

    /// `backward()` invoked on a leaf node — a leaf has nothing upstream to
    /// propagate into beyond itself.
    #[error("backward() called on a leaf node")]
    InvalidBackwardTarget,

    /// The producing-edge graph contains a cycle. Construction makes this
    /// impossible, so hitting it means the arena was corrupted.
    #[error("cycle detected in the computation graph")]
    CycleDetected,

    /// Shape mismatch between the two operands of a binary operation
    /// (broadcasting is not supported).
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// The two operands of a binary operation belong to different graphs.
    #[error("operands belong to different graphs")]
    GraphMismatch,

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }
}

/// Convenience Result type used throughout Stoat.
pub type Result<T> = std::result::Result<T, Error>;

/// Macro for early return with a formatted error message.
/// Usage: `bail!("something went wrong: {}", detail)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}
