use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::repo::RepoError;

/// Engine-level failure taxonomy. Validation and constraint errors are raised
/// before any write; storage errors mean the write may or may not have
/// landed and callers must re-verify with a fresh read.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("content is empty")]
    ContentEmpty,
    #[error("content exceeds the maximum length")]
    ContentTooLong,
    #[error("parent comment does not exist in this subject")]
    InvalidParent,
    #[error("subject owner already has a top-level comment")]
    OwnerCommentLimitExceeded,
    #[error("only top-level comments can be pinned")]
    NotPinnable,
    #[error("not authorized")]
    Unauthorized,
    #[error("not found")]
    NotFound,
    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<RepoError> for EngineError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => EngineError::NotFound,
            RepoError::OwnerLimit => EngineError::OwnerCommentLimitExceeded,
            RepoError::Storage(msg) => EngineError::Storage(msg),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("rate limited")]
    TooManyRequests,
    #[error("internal error")]
    Internal,
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::ContentEmpty | EngineError::ContentTooLong => {
                ApiError::BadRequest(e.to_string())
            }
            EngineError::InvalidParent
            | EngineError::OwnerCommentLimitExceeded
            | EngineError::NotPinnable => ApiError::Conflict(e.to_string()),
            EngineError::Unauthorized => ApiError::Forbidden,
            EngineError::NotFound => ApiError::NotFound,
            EngineError::Storage(msg) => {
                log::error!("storage failure surfaced to API: {msg}");
                ApiError::Internal
            }
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;
        let status = match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        HttpResponse::build(status).json(ApiErrorBody {
            error: self.to_string(),
        })
    }
}
