//! Convenience result type alias for Vellum.

use crate::error::AppError;

/// A specialized `Result` type for Vellum operations.
pub type AppResult<T> = Result<T, AppError>;
