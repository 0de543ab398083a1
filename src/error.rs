//! Error types.
//!
//! - `KineticsError`: the core taxonomy (schema, data format, fit convergence)
//!   returned by the normalizer, the aggregator and the fitter.
//! - `AppError`: what the binary reports (message + process exit code).

/// Why a single channel's fit was abandoned.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConvergenceFailure {
    #[error("model produced non-finite residuals at the initial guess")]
    NonFiniteResiduals,

    #[error("no convergence within {evaluations} function evaluations")]
    MaxEvaluations { evaluations: usize },

    #[error("solver could not make progress (singular or non-finite normal equations)")]
    NoProgress,

    #[error("{points} usable points cannot determine {parameters} parameters")]
    InsufficientData { points: usize, parameters: usize },

    #[error("solver returned non-finite parameters")]
    NonFiniteParameters,
}

/// Core error taxonomy.
///
/// `Schema` and `DataFormat` abort a whole run; `FitConvergence` is reported
/// per channel by the fitter.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum KineticsError {
    #[error("{context}: missing column `{column}`")]
    Schema { context: String, column: String },

    #[error("{context}: cannot parse '{value}' (expected {expected})")]
    DataFormat {
        context: String,
        value: String,
        expected: String,
    },

    #[error("fit failed for channel `{channel}`: {reason}")]
    FitConvergence {
        channel: String,
        reason: ConvergenceFailure,
    },
}

impl KineticsError {
    pub fn schema(context: impl Into<String>, column: impl Into<String>) -> Self {
        Self::Schema {
            context: context.into(),
            column: column.into(),
        }
    }

    pub fn data_format(
        context: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::DataFormat {
            context: context.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }

    pub fn convergence(channel: impl Into<String>, reason: ConvergenceFailure) -> Self {
        Self::FitConvergence {
            channel: channel.into(),
            reason,
        }
    }

    pub fn is_schema(&self) -> bool {
        matches!(self, Self::Schema { .. })
    }

    pub fn is_data_format(&self) -> bool {
        matches!(self, Self::DataFormat { .. })
    }

    pub fn is_fit_convergence(&self) -> bool {
        matches!(self, Self::FitConvergence { .. })
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<KineticsError> for AppError {
    fn from(err: KineticsError) -> Self {
        let exit_code = match err {
            KineticsError::Schema { .. } | KineticsError::DataFormat { .. } => 2,
            KineticsError::FitConvergence { .. } => 4,
        };
        Self::new(exit_code, err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_kind() {
        let schema: AppError = KineticsError::schema("batch 'Sheet1'", "800").into();
        assert_eq!(schema.exit_code(), 2);

        let fit: AppError = KineticsError::convergence("440", ConvergenceFailure::NoProgress).into();
        assert_eq!(fit.exit_code(), 4);
        assert!(fit.to_string().contains("440"));
    }
}
