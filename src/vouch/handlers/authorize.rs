use crate::credentials::{resolver::SharedResolver, Denial, IdentityProjection};
use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Deserialize)]
pub struct Credentials {
    email: String,
    password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ErrorBody {
    error: String,
}

impl ErrorBody {
    fn new(code: &str) -> Json<Self> {
        Json(Self {
            error: code.to_string(),
        })
    }
}

#[utoipa::path(
    post,
    path= "/authorize",
    request_body = Credentials,
    responses (
        (status = 200, description = "Authenticated", body = IdentityProjection, content_type = "application/json"),
        (status = 400, description = "Missing or malformed payload", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 503, description = "Credential store unavailable", body = ErrorBody),
    ),
    tag= "authorize"
)]
// axum handler for the identity provider authorize callback
#[instrument(skip_all)]
pub async fn authorize(
    resolver: Extension<SharedResolver>,
    payload: Option<Json<Credentials>>,
) -> impl IntoResponse {
    let credentials: Credentials = match payload {
        Some(Json(payload)) => payload,
        None => {
            return (StatusCode::BAD_REQUEST, ErrorBody::new("missing_payload")).into_response()
        }
    };

    debug!("credentials: {:?}", credentials);

    // No syntax gate: the lookup matches the email exactly as stored, and a
    // miss pays the same decoy verification as a wrong password.
    match resolver
        .authorize(&credentials.email, SecretString::from(credentials.password))
        .await
    {
        Ok(projection) => (StatusCode::OK, Json(projection)).into_response(),
        Err(denial) => denial_response(denial),
    }
}

fn denial_response(denial: Denial) -> axum::response::Response {
    let status = match denial {
        Denial::InvalidCredentials => StatusCode::UNAUTHORIZED,
        Denial::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, ErrorBody::new(denial.code())).into_response()
}
