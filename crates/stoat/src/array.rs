use ndarray::{ArrayD, IxDyn};

use crate::error::{Error, Result};

// Array — Abstraction over the numeric container being differentiated
//
// The engine never touches raw storage. Everything it needs from the array
// library is captured by the Array trait: elementwise arithmetic, integer
// powers, shape introspection, and shape-aware zeros/ones construction.
//
// WHY A TRAIT AND NOT A CONCRETE TYPE?
//
// Same reasoning as a compute-backend trait: the graph and backward engine
// are generic over Array, so a different array implementation (f32 storage,
// a custom buffer, a test double) can be plugged in as a separate impl
// without modifying the engine. The default implementation is ndarray's
// dynamic-dimensional ArrayD<f64>.
//
// Broadcasting is deliberately absent: binary operations require equal
// shapes and fail with ShapeMismatch otherwise.

/// The numeric container the engine differentiates over.
///
/// All binary operations are elementwise over equal shapes and return a new
/// array (no in-place mutation, no broadcasting).
pub trait Array: Clone + std::fmt::Debug + PartialEq + 'static {
    /// Promote a scalar to a single-element array.
    fn from_scalar(value: f64) -> Self;

    /// Array of zeros with the given shape.
    fn zeros(shape: &[usize]) -> Self;

    /// Array of ones with the given shape.
    fn ones(shape: &[usize]) -> Self;

    /// The dimension sizes.
    fn shape(&self) -> &[usize];

    /// Total number of elements. A scalar shape `[]` has 1 element.
    fn elem_count(&self) -> usize {
        self.shape().iter().product()
    }

    /// Elementwise addition: self + rhs.
    fn add(&self, rhs: &Self) -> Result<Self>;

    /// Elementwise subtraction: self - rhs.
    fn sub(&self, rhs: &Self) -> Result<Self>;

    /// Elementwise multiplication: self * rhs.
    fn mul(&self, rhs: &Self) -> Result<Self>;

    /// Elementwise division: self / rhs.
    fn div(&self, rhs: &Self) -> Result<Self>;

    /// Elementwise integer power: self[i] ^ exponent.
    fn powi(&self, exponent: i32) -> Self;

    /// Copy the elements out as a flat Vec<f64> in logical order.
    fn to_vec(&self) -> Vec<f64>;
}

/// Caller-supplied data for a node: either a scalar (promoted to a
/// single-element array) or an array.
#[derive(Debug, Clone)]
pub enum Value<A: Array> {
    Scalar(f64),
    Array(A),
}

impl<A: Array> Value<A> {
    /// Coerce into array data, validating it is usable.
    ///
    /// A zero-element array cannot seed a gradient computation and fails
    /// with [`Error::InvalidValueType`].
    pub(crate) fn into_array(self) -> Result<A> {
        match self {
            Value::Scalar(v) => Ok(A::from_scalar(v)),
            Value::Array(a) => {
                if a.shape().iter().any(|&d| d == 0) {
                    return Err(Error::InvalidValueType);
                }
                Ok(a)
            }
        }
    }
}

impl<A: Array> From<f64> for Value<A> {
    fn from(v: f64) -> Self {
        Value::Scalar(v)
    }
}

// ndarray implementation — the default array collaborator

fn check_same_shape(lhs: &ArrayD<f64>, rhs: &ArrayD<f64>) -> Result<()> {
    if lhs.shape() != rhs.shape() {
        return Err(Error::ShapeMismatch {
            expected: lhs.shape().to_vec(),
            got: rhs.shape().to_vec(),
        });
    }
    Ok(())
}

impl Array for ArrayD<f64> {
    fn from_scalar(value: f64) -> Self {
        ArrayD::from_elem(IxDyn(&[1]), value)
    }

    fn zeros(shape: &[usize]) -> Self {
        ArrayD::zeros(IxDyn(shape))
    }

    fn ones(shape: &[usize]) -> Self {
        ArrayD::ones(IxDyn(shape))
    }

    fn shape(&self) -> &[usize] {
        // Inherent ArrayBase::shape, not a recursive trait call.
        ArrayD::shape(self)
    }

    fn add(&self, rhs: &Self) -> Result<Self> {
        check_same_shape(self, rhs)?;
        Ok(self + rhs)
    }

    fn sub(&self, rhs: &Self) -> Result<Self> {
        check_same_shape(self, rhs)?;
        Ok(self - rhs)
    }

    fn mul(&self, rhs: &Self) -> Result<Self> {
        check_same_shape(self, rhs)?;
        Ok(self * rhs)
    }

    fn div(&self, rhs: &Self) -> Result<Self> {
        check_same_shape(self, rhs)?;
        Ok(self / rhs)
    }

    fn powi(&self, exponent: i32) -> Self {
        self.mapv(|x| x.powi(exponent))
    }

    fn to_vec(&self) -> Vec<f64> {
        self.iter().copied().collect()
    }
}

impl From<ArrayD<f64>> for Value<ArrayD<f64>> {
    fn from(a: ArrayD<f64>) -> Self {
        Value::Array(a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_promotion() {
        let a = <ArrayD<f64> as Array>::from_scalar(3.0);
        assert_eq!(Array::shape(&a), &[1]);
        assert_eq!(a.to_vec(), vec![3.0]);
    }

    #[test]
    fn test_zeros_ones_shapes() {
        let z = <ArrayD<f64> as Array>::zeros(&[2, 3]);
        let o = <ArrayD<f64> as Array>::ones(&[2, 3]);
        assert_eq!(z.elem_count(), 6);
        assert_eq!(o.to_vec(), vec![1.0; 6]);
    }

    #[test]
    fn test_elementwise_arithmetic() {
        let a = ArrayD::from_shape_vec(IxDyn(&[2]), vec![6.0, 8.0]).unwrap();
        let b = ArrayD::from_shape_vec(IxDyn(&[2]), vec![2.0, 4.0]).unwrap();
        assert_eq!(Array::add(&a, &b).unwrap().to_vec(), vec![8.0, 12.0]);
        assert_eq!(Array::sub(&a, &b).unwrap().to_vec(), vec![4.0, 4.0]);
        assert_eq!(Array::mul(&a, &b).unwrap().to_vec(), vec![12.0, 32.0]);
        assert_eq!(Array::div(&a, &b).unwrap().to_vec(), vec![3.0, 2.0]);
    }

    #[test]
    fn test_shape_mismatch_is_an_error() {
        let a = <ArrayD<f64> as Array>::ones(&[2]);
        let b = <ArrayD<f64> as Array>::ones(&[3]);
        assert!(matches!(
            Array::add(&a, &b),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_powi() {
        let a = ArrayD::from_shape_vec(IxDyn(&[2]), vec![2.0, 3.0]).unwrap();
        assert_eq!(a.powi(2).to_vec(), vec![4.0, 9.0]);
    }

    #[test]
    fn test_empty_array_rejected() {
        let empty = <ArrayD<f64> as Array>::zeros(&[0]);
        let value: Value<ArrayD<f64>> = empty.into();
        assert!(matches!(value.into_array(), Err(Error::InvalidValueType)));
    }

    #[test]
    fn test_scalar_value_coercion() {
        let value: Value<ArrayD<f64>> = 2.5.into();
        let a = value.into_array().unwrap();
        assert_eq!(Array::shape(&a), &[1]);
        assert_eq!(a.to_vec(), vec![2.5]);
    }
}
