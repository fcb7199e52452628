//! Entity-level error type for the fetch pipeline.

use crate::http::ApiError;

/// Error from fetching one entity's full result set (all pages + staging
/// write). Consumed by the retry orchestrator, which records it and
/// re-attempts the entity at the next round.
#[derive(Debug)]
pub enum FetchError {
    /// HTTP-level failure from the client.
    Api(ApiError),
    /// Page loop exhausted `max_pages` without satisfying `found`.
    Pagination {
        pages: u32,
        collected: usize,
        found: u64,
    },
    /// Local I/O failure while persisting the fetched result.
    Io(std::io::Error),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Api(e) => write!(f, "{e}"),
            Self::Pagination {
                pages,
                collected,
                found,
            } => write!(
                f,
                "pagination incomplete: {collected}/{found} records after {pages} pages"
            ),
            Self::Io(e) => write!(f, "IO: {e}"),
        }
    }
}

impl std::error::Error for FetchError {}

impl From<ApiError> for FetchError {
    fn from(e: ApiError) -> Self {
        Self::Api(e)
    }
}

impl From<std::io::Error> for FetchError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl FetchError {
    /// Short stable tag used in run ledgers.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Api(e) => e.kind(),
            Self::Pagination { .. } => "pagination_incomplete",
            Self::Io(_) => "io",
        }
    }
}
