use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Filesystem I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    SerdeJsonSerialize(#[from] serde_json::Error),

    #[error("SIMD JSON parsing error: {0}")]
    SimdJsonParse(#[from] simd_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("GraphQL request failed (status {status}): {}", messages.join("; "))]
    GraphQl { status: u16, messages: Vec<String> },

    #[error("API response structure invalid: {0}")]
    ApiResponseInvalid(String),

    #[error("Only {resolved}/{requested} entry ids could be resolved")]
    Resolution { requested: usize, resolved: usize },

    #[error("Not an AniList anime/manga list URL: {0}")]
    InvalidListUrl(String),

    #[error("No access token: pass --token, set ANILIST_TOKEN or use --csrf-page")]
    MissingToken,

    #[error("Nothing to do: no field is enabled and deletion is not selected")]
    NothingToDo,

    #[error("Invalid argument: {0}")]
    Argument(String),

    #[error("Blocking task failed: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    #[error("Timeout during operation")]
    Timeout,

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    /// Errors the user can meaningfully retry from the error dialog.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AppError::Reqwest(_)
                | AppError::GraphQl { .. }
                | AppError::ApiResponseInvalid(_)
                | AppError::Resolution { .. }
                | AppError::SimdJsonParse(_)
                | AppError::Timeout
        )
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graphql_error_joins_messages() {
        let err = AppError::GraphQl {
            status: 400,
            messages: vec!["validation".into(), "bad id".into()],
        };
        assert_eq!(
            err.to_string(),
            "GraphQL request failed (status 400): validation; bad id"
        );
        assert!(err.is_transport());
    }

    #[test]
    fn argument_errors_are_not_transport() {
        assert!(!AppError::Argument("x".into()).is_transport());
        assert!(!AppError::NothingToDo.is_transport());
        assert!(AppError::Resolution {
            requested: 3,
            resolved: 2
        }
        .is_transport());
    }
}
