use crate::core::conversation::SessionHandle;
use crate::core::errors::ChatError;
use async_trait::async_trait;
use axum::Json;
use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use log::error;
use serde_json::json;
use std::str::FromStr;

pub mod chat;

pub const X_SESSION_ID: &str = "X-Session-ID";

/// The caller's session, taken from the `X-Session-ID` header.
#[derive(Debug)]
pub struct ExtractSession(pub SessionHandle);

#[async_trait]
impl<S> FromRequestParts<S> for ExtractSession
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, (StatusCode, &'static str)> {
        if let Some(session_id) = parts.headers.get(X_SESSION_ID) {
            let session_id = session_id
                .to_str()
                .map_err(|_| (StatusCode::BAD_REQUEST, "invalid session id"))?;
            let session = SessionHandle::from_str(session_id)
                .map_err(|_| (StatusCode::BAD_REQUEST, "invalid session id"))?;
            Ok(ExtractSession(session))
        } else {
            Err((StatusCode::BAD_REQUEST, "`X-Session-ID` header is missing"))
        }
    }
}

impl ChatError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ChatError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ChatError::GenerationError(_) => StatusCode::BAD_GATEWAY,
            ChatError::MalformedHistory(_) => StatusCode::BAD_REQUEST,
            ChatError::StorageFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("{self}");
        }

        (
            status,
            Json(json!({
                "success": false,
                "error": self.to_string(),
            })),
        )
            .into_response()
    }
}
