pub mod handlers;

use crate::credentials::{
    store::PgCredentialStore, AuthorizationResolver, IdentityProjection, PasswordHasher, Role,
    SharedStore,
};
use anyhow::Result;
use axum::{
    body::Body,
    extract::{Extension, MatchedPath},
    http::{HeaderName, HeaderValue, Request},
    routing::{get, post},
    Router,
};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};
use ulid::Ulid;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(handlers::health::health, handlers::authorize::authorize),
    components(schemas(
        handlers::health::Health,
        handlers::authorize::Credentials,
        handlers::authorize::ErrorBody,
        IdentityProjection,
        Role
    )),
    tags(
        (name = "vouch", description = "Credential authentication API")
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// Build the HTTP router around an authorization resolver and the store
/// handle used for health checks.
pub fn router(resolver: Arc<AuthorizationResolver>, store: SharedStore) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/authorize", post(handlers::authorize))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(resolver))
                .layer(Extension(store)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    store: PgCredentialStore,
    hasher: PasswordHasher,
    startup_grace: Duration,
) -> Result<()> {
    // The database may still be coming up; keep serving and let /health report it.
    let probe = store.clone();
    tokio::spawn(async move {
        if let Err(e) = probe.wait_until_ready(startup_grace).await {
            error!("Credential store still unavailable after startup grace window: {}", e);
        }
    });

    let store: SharedStore = Arc::new(store);
    let resolver = Arc::new(AuthorizationResolver::new(store.clone(), hasher));
    resolver.warm_up().await;

    let app = router(resolver, store);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::credentials::{
        store::{CredentialStore, MemoryBackend},
        AuthError, CredentialResetService, Identity, IdentityFields, IdentityPatch, NewIdentity,
        Role,
    };
    use async_trait::async_trait;
    use axum::http::{header::CONTENT_TYPE, Method, StatusCode};
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(1).with_memory_kib(64)
    }

    async fn app() -> Router {
        let store = MemoryBackend::new("test").connect("auth");
        store
            .create(
                NewIdentity::new("alice@example.com")
                    .with_password_hash(hasher().hash("Secret123!").unwrap())
                    .with_fields(
                        IdentityFields::default()
                            .with_display_name("Alice")
                            .with_avatar_ref("avatars/alice.png")
                            .with_role(Role::Creator),
                    ),
            )
            .await
            .unwrap();

        let store: SharedStore = Arc::new(store);
        router(
            Arc::new(AuthorizationResolver::new(store.clone(), hasher())),
            store,
        )
    }

    async fn post_authorize(app: Router, body: Value) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/authorize")
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn authorize_success_returns_projection() {
        let (status, body) = post_authorize(
            app().await,
            json!({"email": "alice@example.com", "password": "Secret123!"}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "alice@example.com");
        assert_eq!(body["name"], "Alice");
        assert_eq!(body["image"], "avatars/alice.png");
        assert_eq!(body["role"], "CREATOR");
        assert!(body.get("password_hash").is_none());
    }

    #[tokio::test]
    async fn authorize_failures_are_indistinguishable() {
        let wrong = post_authorize(
            app().await,
            json!({"email": "alice@example.com", "password": "wrong"}),
        )
        .await;
        let unknown = post_authorize(
            app().await,
            json!({"email": "nobody@example.com", "password": "x"}),
        )
        .await;
        let malformed = post_authorize(
            app().await,
            json!({"email": "not-an-email", "password": "x"}),
        )
        .await;

        assert_eq!(wrong.0, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong, unknown);
        assert_eq!(wrong, malformed);
        assert_eq!(wrong.1["error"], "invalid_credentials");
    }

    #[tokio::test]
    async fn authorize_without_payload_is_bad_request() {
        let response = app()
            .await
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/authorize")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_reports_ok_and_request_id() {
        let response = app()
            .await
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert!(response
            .headers()
            .get("X-App")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with(env!("CARGO_PKG_NAME"))));
    }

    struct DownStore;

    #[async_trait]
    impl CredentialStore for DownStore {
        fn name(&self) -> &str {
            "down"
        }

        fn target(&self) -> String {
            "memory://down".to_string()
        }

        async fn ping(&self) -> Result<(), AuthError> {
            Err(AuthError::StoreUnavailable(
                "connection refused".to_string(),
            ))
        }

        async fn find_by_email(
            &self,
            _email: &str,
        ) -> Result<Option<Identity>, AuthError> {
            Err(AuthError::StoreUnavailable(
                "connection refused".to_string(),
            ))
        }

        async fn find_by_id(
            &self,
            _id: Uuid,
        ) -> Result<Option<Identity>, AuthError> {
            Err(AuthError::StoreUnavailable(
                "connection refused".to_string(),
            ))
        }

        async fn list(
            &self,
        ) -> Result<Vec<Identity>, AuthError> {
            Ok(Vec::new())
        }

        async fn create(
            &self,
            _identity: NewIdentity,
        ) -> Result<Identity, AuthError> {
            Err(AuthError::StoreUnavailable(
                "connection refused".to_string(),
            ))
        }

        async fn update(
            &self,
            _id: Uuid,
            _patch: IdentityPatch,
        ) -> Result<Identity, AuthError> {
            Err(AuthError::NotFound)
        }

        async fn delete(&self, _id: Uuid) -> Result<(), AuthError> {
            Err(AuthError::NotFound)
        }
    }

    #[tokio::test]
    async fn store_outage_is_service_unavailable() {
        let store: SharedStore = Arc::new(DownStore);
        let app = router(
            Arc::new(AuthorizationResolver::new(store.clone(), hasher())),
            store,
        );

        let (status, body) = post_authorize(
            app.clone(),
            json!({"email": "alice@example.com", "password": "Secret123!"}),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "unavailable");

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn any_stored_email_can_log_in() {
        let store: SharedStore = Arc::new(MemoryBackend::new("test").connect("auth"));
        CredentialResetService::new(store.clone(), hasher())
            .provision("ops@localhost", SecretString::from("Secret123!".to_string()), IdentityFields::default())
            .await
            .unwrap();
        let app = router(
            Arc::new(AuthorizationResolver::new(store.clone(), hasher())),
            store,
        );

        let (status, body) = post_authorize(
            app,
            json!({"email": "ops@localhost", "password": "Secret123!"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "ops@localhost");
    }

    #[tokio::test]
    async fn corrupt_stored_hash_is_service_unavailable() {
        let store = MemoryBackend::new("test").connect("auth");
        store
            .create(NewIdentity::new("broken@example.com").with_password_hash("$argon2id$v=19$m=oops$$"))
            .await
            .unwrap();
        let store: SharedStore = Arc::new(store);
        let app = router(
            Arc::new(AuthorizationResolver::new(store.clone(), hasher())),
            store,
        );

        let (status, body) = post_authorize(
            app,
            json!({"email": "broken@example.com", "password": "Secret123!"}),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "unavailable");
    }

    /// Answers pings but fails every query, as a misconfigured schema would.
    struct MisconfiguredStore;

    #[async_trait]
    impl CredentialStore for MisconfiguredStore {
        fn name(&self) -> &str {
            "misconfigured"
        }

        fn target(&self) -> String {
            "memory://misconfigured".to_string()
        }

        async fn ping(&self) -> Result<(), AuthError> {
            Ok(())
        }

        async fn find_by_email(&self, _email: &str) -> Result<Option<Identity>, AuthError> {
            Err(AuthError::Store("relation \"identities\" does not exist".to_string()))
        }

        async fn find_by_id(&self, _id: Uuid) -> Result<Option<Identity>, AuthError> {
            Err(AuthError::Store("relation \"identities\" does not exist".to_string()))
        }

        async fn list(&self) -> Result<Vec<Identity>, AuthError> {
            Ok(Vec::new())
        }

        async fn create(&self, _identity: NewIdentity) -> Result<Identity, AuthError> {
            Err(AuthError::Store("relation \"identities\" does not exist".to_string()))
        }

        async fn update(&self, _id: Uuid, _patch: IdentityPatch) -> Result<Identity, AuthError> {
            Err(AuthError::NotFound)
        }

        async fn delete(&self, _id: Uuid) -> Result<(), AuthError> {
            Err(AuthError::NotFound)
        }
    }

    #[tokio::test]
    async fn store_error_is_service_unavailable() {
        let store: SharedStore = Arc::new(MisconfiguredStore);
        let app = router(
            Arc::new(AuthorizationResolver::new(store.clone(), hasher())),
            store,
        );

        let (status, body) = post_authorize(
            app,
            json!({"email": "alice@example.com", "password": "Secret123!"}),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "unavailable");
    }

    #[test]
    fn openapi_lists_paths() {
        let doc = openapi();
        assert!(doc.paths.paths.contains_key("/health"));
        assert!(doc.paths.paths.contains_key("/authorize"));
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let response = app()
            .await
            .oneshot(
                Request::builder()
                    .uri("/api-docs/openapi.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
