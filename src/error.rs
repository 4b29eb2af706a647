//! Error types shared by the feature handlers.
//!
//! Most failure modes of the editing features degrade to an empty result
//! (unresolved symbols, failed compiles, unreadable files). The one condition
//! that must always reach the caller is cancellation: an empty result would
//! be indistinguishable from "nothing matched".

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

/// Errors surfaced by feature handlers.
#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    /// The request was cancelled by the client.
    #[error("request cancelled")]
    Cancelled,

    /// A document could not be read from disk.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FeatureError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FeatureError::Cancelled)
    }
}

/// Result alias for feature handlers.
pub type FeatureResult<T> = Result<T, FeatureError>;

/// Return `Err(Cancelled)` once the token has fired.
pub fn check_cancelled(token: &CancellationToken) -> FeatureResult<()> {
    if token.is_cancelled() {
        Err(FeatureError::Cancelled)
    } else {
        Ok(())
    }
}

impl From<FeatureError> for tower_lsp::jsonrpc::Error {
    fn from(err: FeatureError) -> Self {
        match err {
            FeatureError::Cancelled => {
                tower_lsp::jsonrpc::Error::new(tower_lsp::jsonrpc::ErrorCode::RequestCancelled)
            }
            other => {
                let mut error = tower_lsp::jsonrpc::Error::internal_error();
                error.message = other.to_string().into();
                error
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_cancelled() {
        let token = CancellationToken::new();
        assert!(check_cancelled(&token).is_ok());
        token.cancel();
        assert!(check_cancelled(&token).unwrap_err().is_cancelled());
    }

    #[test]
    fn test_cancelled_maps_to_request_cancelled() {
        let err: tower_lsp::jsonrpc::Error = FeatureError::Cancelled.into();
        assert_eq!(err.code, tower_lsp::jsonrpc::ErrorCode::RequestCancelled);
    }

    #[test]
    fn test_io_error_maps_to_internal_error_with_message() {
        let err: tower_lsp::jsonrpc::Error = FeatureError::Io {
            path: PathBuf::from("/tmp/missing.ili"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        }
        .into();
        assert_eq!(err.code, tower_lsp::jsonrpc::ErrorCode::InternalError);
        assert!(err.message.contains("/tmp/missing.ili"));
    }
}
