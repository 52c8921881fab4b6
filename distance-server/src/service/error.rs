//! Mapping of model failures to HTTP responses

use actix_web::http::StatusCode;
use actix_web::http::header;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use tracing::error;

use crate::model::Error;

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidCredentials | Error::Unauthenticated | Error::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
            Error::AlreadyInactive
            | Error::UsernameTaken(_)
            | Error::UnsupportedUnit(_)
            | Error::GeocodeFailure { .. } => StatusCode::BAD_REQUEST,
            Error::Persistence(_) | Error::Hasher(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        // Internal details stay in the logs
        let detail = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(err = %self, "Request failed");
            "Internal server error".to_owned()
        } else {
            self.to_string()
        };

        let mut response = HttpResponse::build(status);
        if status == StatusCode::UNAUTHORIZED {
            response.insert_header((header::WWW_AUTHENTICATE, "Bearer"));
        }
        response.json(json!({ "detail": detail }))
    }
}
