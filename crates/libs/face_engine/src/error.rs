use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InferenceError {
    #[error("tensor shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("accelerator out of memory: {0}")]
    OutOfMemory(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("model error: {0}")]
    Model(String),
}

impl InferenceError {
    /// Sorts an ONNX Runtime error message into a variant.
    pub fn from_runtime(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("out of memory")
            || lower.contains("outofmemory")
            || lower.contains("bad_alloc")
            || lower.contains("failed to allocate")
        {
            Self::OutOfMemory(message)
        } else if lower.contains("shape")
            || lower.contains("dimension")
            || lower.contains("invalid rank")
            || lower.contains("broadcast")
            || lower.contains("padding")
        {
            Self::ShapeMismatch(message)
        } else {
            Self::Model(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_runtime_messages() {
        assert!(matches!(
            InferenceError::from_runtime("CUDA failure 2: out of memory"),
            InferenceError::OutOfMemory(_)
        ));
        assert!(matches!(
            InferenceError::from_runtime("Got invalid dimensions for input: data"),
            InferenceError::ShapeMismatch(_)
        ));
        assert!(matches!(
            InferenceError::from_runtime("Load model failed"),
            InferenceError::Model(_)
        ));
    }
}
