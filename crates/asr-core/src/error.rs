//! Error types for RustASR.

use thiserror::Error;

/// Main error type for ASR training.
#[derive(Error, Debug)]
pub enum AsrError {
    /// Audio processing errors.
    #[error("Audio error: {0}")]
    Audio(String),

    /// Manifest, transcript and batch layout errors.
    #[error("Data error: {0}")]
    Data(String),

    /// Loss and optimisation errors.
    #[error("Training error: {0}")]
    Training(String),

    /// Configuration errors.
    #[error("Config error: {0}")]
    Config(String),

    /// I/O errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Candle tensor errors.
    #[error("Tensor error: {0}")]
    Candle(#[from] candle_core::Error),
}

/// Result type alias for ASR operations.
pub type AsrResult<T> = Result<T, AsrError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn read_missing() -> AsrResult<String> {
        Ok(std::fs::read_to_string("/nonexistent/asr-core/manifest.csv")?)
    }

    #[test]
    fn test_io_errors_convert() {
        let err = read_missing().unwrap_err();
        assert!(matches!(err, AsrError::Io(_)));
        assert!(err.to_string().starts_with("IO error: "));
    }

    #[test]
    fn test_candle_errors_convert() {
        let a = candle_core::Tensor::zeros(3, candle_core::DType::F32, &candle_core::Device::Cpu)
            .unwrap();
        let b = candle_core::Tensor::zeros(4, candle_core::DType::F32, &candle_core::Device::Cpu)
            .unwrap();
        let err: AsrError = a.add(&b).unwrap_err().into();
        assert!(matches!(err, AsrError::Candle(_)));
    }

    #[test]
    fn test_message_variants_display() {
        assert_eq!(
            AsrError::Training("bad labels".into()).to_string(),
            "Training error: bad labels"
        );
        assert_eq!(AsrError::Data("x".into()).to_string(), "Data error: x");
    }
}
