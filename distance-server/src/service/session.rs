//! Session credentials extraction

use actix_web::body::{EitherBody, MessageBody};
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::http::StatusCode;
use actix_web::http::header::{self, HeaderMap, HeaderName};
use actix_web::middleware::Next;
use actix_web::{Error, HttpMessage, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use crate::model::Model;
use crate::model::auth::{AccessToken, Session};
use crate::model::users::UserId;

/// Header carrying the user id the caller claims to be
const USER_ID_HEADER: HeaderName = HeaderName::from_static("x-user-id");

#[derive(Debug, Clone, Error)]
pub enum CredentialsError {
    #[error("Not authenticated")]
    MissingAuthorization,
    #[error("Invalid authorization format, expected: Bearer <token>")]
    InvalidAuthorization,
    #[error("Missing X-User-ID header")]
    MissingUserId,
    #[error("Invalid format for X-User-ID header")]
    InvalidUserId,
}

impl ResponseError for CredentialsError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingAuthorization | Self::InvalidAuthorization => StatusCode::UNAUTHORIZED,
            Self::MissingUserId | Self::InvalidUserId => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut response = HttpResponse::build(self.status_code());
        if self.status_code() == StatusCode::UNAUTHORIZED {
            response.insert_header((header::WWW_AUTHENTICATE, "Bearer"));
        }
        response.json(json!({ "detail": self.to_string() }))
    }
}

/// Credentials sent with the request
///
/// Nothing is verified at this point - the credentials are only parsed.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Bearer token from the `Authorization` header
    pub token: AccessToken,
    /// User id from the `X-User-ID` header
    pub user_id: Option<UserId>,
}

impl Credentials {
    fn from_headers(headers: &HeaderMap) -> Result<Self, CredentialsError> {
        let authorization = headers
            .get(header::AUTHORIZATION)
            .ok_or(CredentialsError::MissingAuthorization)?
            .to_str()
            .map_err(|_| CredentialsError::InvalidAuthorization)?;

        let (scheme, token) = authorization
            .split_once(' ')
            .ok_or(CredentialsError::InvalidAuthorization)?;

        if !scheme.eq_ignore_ascii_case("Bearer") || token.trim().is_empty() {
            return Err(CredentialsError::InvalidAuthorization);
        }

        let user_id = headers
            .get(USER_ID_HEADER)
            .map(|user_id| {
                user_id
                    .to_str()
                    .map_err(|_| CredentialsError::InvalidUserId)?
                    .parse()
                    .map_err(|_| CredentialsError::InvalidUserId)
            })
            .transpose()?;

        Ok(Self {
            token: AccessToken::new(token.trim()),
            user_id,
        })
    }

    /// Verifies that the token belongs to an active session of the user from `X-User-ID`
    pub async fn validate(&self, model: &Model) -> Result<UserId, Error> {
        let claimed = self.user_id.ok_or(CredentialsError::MissingUserId)?;
        Session::validate(model.db(), &self.token, claimed)
            .await
            .map_err(Into::into)
    }

    /// Verifies the token, cross-checking it with `X-User-ID` if present
    pub async fn authenticate(&self, model: &Model) -> Result<UserId, Error> {
        let user_id = match self.user_id {
            Some(claimed) => Session::validate(model.db(), &self.token, claimed).await?,
            None => Session::authenticate(model.db(), &self.token).await?,
        };
        Ok(user_id)
    }
}

/// Parses credentials headers, rejecting requests without valid `Authorization`
pub async fn middleware<B>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<EitherBody<B>>, Error>
where
    B: MessageBody + 'static,
{
    let credentials = match Credentials::from_headers(req.headers()) {
        Ok(credentials) => credentials,
        Err(err) => {
            return Ok(req
                .into_response(err.error_response())
                .map_into_right_body());
        }
    };

    req.extensions_mut().insert(credentials);
    next.call(req).await.map(ServiceResponse::map_into_left_body)
}
