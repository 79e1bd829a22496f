// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTTP-facing errors and their status codes.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use ordercast_core::error::OrdercastError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Domain(#[from] OrdercastError),

    #[error("malformed request body: {0}")]
    MalformedBody(String),

    #[error("print request timed out after {0} ms")]
    PrintTimeout(u64),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::MalformedBody(rejection.body_text())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Domain(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            Self::Domain(OrdercastError::AllTransportsFailed(_)) => StatusCode::BAD_GATEWAY,
            Self::Domain(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::MalformedBody(_) => StatusCode::BAD_REQUEST,
            Self::PrintTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "request failed");
        }
        (status, Json(json!({ "success": false, "error": self.to_string() }))).into_response()
    }
}
