// src/error.rs

#[derive(Debug, Clone, PartialEq)]
pub enum TensorError {
    /// Layer configuration rejected before any core was allocated.
    Validation(String),
    ShapeMismatch(String),
    InvalidDimension(String),
    InvalidSubscripts(String),
    OutOfBounds(String),
}

impl std::fmt::Display for TensorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TensorError::Validation(s) => write!(f, "Invalid layer configuration: {}", s),
            TensorError::ShapeMismatch(s) => write!(f, "Shape mismatch: {}", s),
            TensorError::InvalidDimension(s) => write!(f, "Invalid dimension: {}", s),
            TensorError::InvalidSubscripts(s) => write!(f, "Invalid subscripts: {}", s),
            TensorError::OutOfBounds(s) => write!(f, "Out of bounds: {}", s),
        }
    }
}

impl std::error::Error for TensorError {} // No source needed for these variants

impl From<ndarray::ShapeError> for TensorError {
    fn from(err: ndarray::ShapeError) -> Self {
        TensorError::ShapeMismatch(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes() {
        let e = TensorError::Validation("ranks must have length 1".to_string());
        assert_eq!(e.to_string(), "Invalid layer configuration: ranks must have length 1");

        let e = TensorError::ShapeMismatch("label 'i' is 2 and 3".to_string());
        assert_eq!(e.to_string(), "Shape mismatch: label 'i' is 2 and 3");
    }

    #[test]
    fn test_from_ndarray_shape_error() {
        let shape_err = ndarray::Array1::<f32>::zeros(6).into_shape((4, 2)).unwrap_err();
        let err: TensorError = shape_err.into();
        assert!(matches!(err, TensorError::ShapeMismatch(_)));
    }
}
