use rouille::Response;

use crate::{apply::ApplyError, operations::SyncError, storage::error::StorageError};

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        log::error!("storage failure: {err}");
        ApiError::Internal("internal server error".into())
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::NoPendingPlan => ApiError::BadRequest(err.to_string()),

            SyncError::Provider(e) => {
                ApiError::Internal(format!("Could not reach the music services: {e}"))
            }

            SyncError::Apply(ApplyError::InvalidTransition { .. }) => {
                ApiError::BadRequest(err.to_string())
            }

            SyncError::Apply(ApplyError::Storage(e)) | SyncError::Storage(e) => e.into(),
        }
    }
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::NotFound(_) => 404,
            ApiError::BadRequest(_) => 400,
            ApiError::Internal(_) => 500,
        }
    }

    pub fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            ApiError::NotFound(msg) | ApiError::BadRequest(msg) | ApiError::Internal(msg) => {
                Response::text(msg).with_status_code(status)
            }
        }
    }
}
