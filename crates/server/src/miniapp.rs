//! Mini App API: the web form Telegram opens inside the chat.
//!
//! Every call carries `Authorization: tma <initData>`. The init data must be
//! signed for this bot and belong to a user on the allow list.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use storytime_bot::Authorizer;
use storytime_core::dialog::period::parse_exact_date;
use storytime_core::dialog::UserId;
use storytime_core::domain::item::Item;
use storytime_core::domain::person::{find_person, Person};
use storytime_core::errors::{ApplicationError, DomainError, InterfaceError};
use storytime_core::webapp::verify_init_data;
use storytime_db::{LibraryRepository, RepositoryError};
use tracing::{debug, info, warn};
use uuid::Uuid;

const AUTH_SCHEME: &str = "tma ";

#[derive(Clone)]
pub struct MiniAppState {
    repo: Arc<dyn LibraryRepository>,
    authorizer: Arc<dyn Authorizer>,
    bot_token: Arc<SecretString>,
}

impl MiniAppState {
    pub fn new(
        repo: Arc<dyn LibraryRepository>,
        authorizer: Arc<dyn Authorizer>,
        bot_token: &SecretString,
    ) -> Self {
        Self {
            repo,
            authorizer,
            bot_token: Arc::new(SecretString::from(bot_token.expose_secret().to_owned())),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub book_name: String,
    #[serde(default)]
    pub participant_name: String,
}

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

type Rejection = (StatusCode, Json<ApiError>);

pub fn router(state: MiniAppState) -> Router {
    Router::new()
        .route("/api/books", get(list_books))
        .route("/api/participants", get(list_participants))
        .route("/api/events", post(create_event))
        .with_state(state)
}

async fn list_books(
    State(state): State<MiniAppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Item>>, Rejection> {
    let correlation_id = authenticate(&state, &headers, "/api/books")?;
    let items = state
        .repo
        .list_readable_items()
        .await
        .map_err(|error| storage_failure(error, &correlation_id))?;
    Ok(Json(items))
}

async fn list_participants(
    State(state): State<MiniAppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Person>>, Rejection> {
    let correlation_id = authenticate(&state, &headers, "/api/participants")?;
    let people =
        state.repo.list_people().await.map_err(|error| storage_failure(error, &correlation_id))?;
    Ok(Json(people))
}

async fn create_event(
    State(state): State<MiniAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<CreatedResponse>), Rejection> {
    let correlation_id = authenticate(&state, &headers, "/api/events")?;

    let request: CreateEventRequest = serde_json::from_slice(&body).map_err(|error| {
        reject(DomainError::InvalidInput(format!("invalid request body: {error}")).into(), &correlation_id)
    })?;
    let book_name = request.book_name.trim();
    let participant_name = request.participant_name.trim();
    if request.date.is_empty() || book_name.is_empty() || participant_name.is_empty() {
        return Err(reject(
            DomainError::InvalidInput("date, book_name and participant_name are required".to_string())
                .into(),
            &correlation_id,
        ));
    }

    let date = parse_exact_date(request.date.trim())
        .map_err(|error| reject(error.into(), &correlation_id))?;
    let people =
        state.repo.list_people().await.map_err(|error| storage_failure(error, &correlation_id))?;
    find_person(&people, participant_name).map_err(|error| reject(error.into(), &correlation_id))?;

    match state.repo.create_event(date, book_name, participant_name).await {
        Ok(()) => {}
        Err(RepositoryError::NotFound(_)) => {
            return Err(reject(
                DomainError::InvalidInput(format!("unknown book `{book_name}`")).into(),
                &correlation_id,
            ))
        }
        Err(error) => return Err(storage_failure(error, &correlation_id)),
    }

    info!(
        event_name = "library.event.created",
        correlation_id = %correlation_id,
        event_date = %date,
        item_name = %book_name,
        actor_name = %participant_name,
        source = "miniapp",
        "recorded reading session"
    );
    Ok((StatusCode::CREATED, Json(CreatedResponse { status: "success" })))
}

/// Returns a correlation id for the request once the caller is verified.
fn authenticate(state: &MiniAppState, headers: &HeaderMap, path: &str) -> Result<String, Rejection> {
    let correlation_id = format!("api-{}", Uuid::new_v4());
    let unauthorized = |reason: String| {
        warn!(
            event_name = "ingress.miniapp.unauthorized",
            correlation_id = %correlation_id,
            path,
            reason = %reason,
            "rejected mini app request"
        );
        (
            StatusCode::UNAUTHORIZED,
            Json(ApiError { error: "Unauthorized".to_string(), detail: None, correlation_id: None }),
        )
    };

    let raw = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix(AUTH_SCHEME))
        .ok_or_else(|| unauthorized("missing tma authorization header".to_string()))?;

    let verified = verify_init_data(raw, state.bot_token.expose_secret(), Utc::now().timestamp())
        .map_err(|error| unauthorized(error.to_string()))?;
    if !state.authorizer.is_allowed(UserId(verified.user.id)) {
        return Err(unauthorized(format!("user {} is not on the allow list", verified.user.id)));
    }

    debug!(
        event_name = "ingress.miniapp.authenticated",
        correlation_id = %correlation_id,
        user_id = verified.user.id,
        path,
        "authenticated mini app request"
    );
    Ok(correlation_id)
}

fn storage_failure(error: RepositoryError, correlation_id: &str) -> Rejection {
    warn!(
        event_name = "ingress.miniapp.storage_failed",
        correlation_id,
        error = %error,
        "mini app storage call failed"
    );
    reject(ApplicationError::Persistence(error.to_string()), correlation_id)
}

fn reject(error: ApplicationError, correlation_id: &str) -> Rejection {
    let interface = error.into_interface(correlation_id);
    let (status, detail) = match &interface {
        InterfaceError::BadRequest { message, .. } => (StatusCode::BAD_REQUEST, Some(message.clone())),
        InterfaceError::ServiceUnavailable { .. } => (StatusCode::SERVICE_UNAVAILABLE, None),
        InterfaceError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, None),
    };
    (
        status,
        Json(ApiError {
            error: interface.user_message().to_string(),
            detail,
            correlation_id: Some(interface.correlation_id().to_string()),
        }),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header::AUTHORIZATION, Request, StatusCode},
        Router,
    };
    use chrono::Utc;
    use secrecy::SecretString;
    use storytime_bot::AllowList;
    use storytime_core::webapp::sign_init_data;
    use storytime_db::{InMemoryLibraryRepository, LibraryRepository};
    use tower::ServiceExt;

    use super::{router, MiniAppState};

    const TOKEN: &str = "123456:ABC-test";
    const ALLOWED: i64 = 42;
    const STRANGER: i64 = 77;

    async fn app() -> (Router, Arc<InMemoryLibraryRepository>) {
        let repo = Arc::new(InMemoryLibraryRepository::with_default_family());
        repo.create_item("Matilda").await.expect("item");
        repo.create_item("Zog").await.expect("item");
        let state = MiniAppState::new(
            repo.clone(),
            Arc::new(AllowList::new([ALLOWED])),
            &SecretString::from(TOKEN.to_string()),
        );
        (router(state), repo)
    }

    fn init_data(user_id: i64, token: &str) -> String {
        let user = format!(r#"{{"id":{user_id},"first_name":"Pat"}}"#);
        let auth_date = Utc::now().timestamp().to_string();
        sign_init_data(&[("auth_date", &auth_date), ("query_id", "AAH"), ("user", &user)], token)
            .expect("sign")
    }

    fn get(path: &str, init_data: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(path);
        if let Some(init_data) = init_data {
            builder = builder.header(AUTHORIZATION, format!("tma {init_data}"));
        }
        builder.body(Body::empty()).expect("request")
    }

    fn post_event(init_data: &str, body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/events")
            .header(AUTHORIZATION, format!("tma {init_data}"))
            .header("content-type", "application/json")
            .body(Body::from(body))
            .expect("request")
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), 64 * 1024).await.expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn signed_request_lists_books_and_participants() {
        let (app, _repo) = app().await;
        let auth = init_data(ALLOWED, TOKEN);

        let books = app.clone().oneshot(get("/api/books", Some(&auth))).await.expect("response");
        assert_eq!(books.status(), StatusCode::OK);
        let books = json(books).await;
        assert_eq!(books[0]["name"], "Matilda");
        assert_eq!(books[1]["name"], "Zog");

        let people = app.oneshot(get("/api/participants", Some(&auth))).await.expect("response");
        assert_eq!(people.status(), StatusCode::OK);
        let people = json(people).await;
        assert_eq!(people.as_array().map(Vec::len), Some(4));
        assert_eq!(people[0]["role"], "follows");
    }

    #[tokio::test]
    async fn bad_hash_or_missing_header_is_unauthorized() {
        let (app, _repo) = app().await;
        let forged = init_data(ALLOWED, "999:other-bot");

        let response = app.clone().oneshot(get("/api/books", Some(&forged))).await.expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json(response).await["error"], "Unauthorized");

        let response = app.oneshot(get("/api/books", None)).await.expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn user_outside_allow_list_is_unauthorized() {
        let (app, repo) = app().await;
        let auth = init_data(STRANGER, TOKEN);

        let response = app
            .oneshot(post_event(
                &auth,
                r#"{"date":"2024-05-01","book_name":"Matilda","participant_name":"Alice"}"#,
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(repo.last_events(1).await.expect("events").is_empty());
    }

    #[tokio::test]
    async fn event_is_recorded() {
        let (app, repo) = app().await;
        let auth = init_data(ALLOWED, TOKEN);

        let response = app
            .oneshot(post_event(
                &auth,
                r#"{"date":"2024-05-01","book_name":"Matilda","participant_name":"Alice"}"#,
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(json(response).await["status"], "success");

        let events = repo.last_events(1).await.expect("events");
        assert_eq!(events[0].item_name, "Matilda");
        assert_eq!(events[0].actor_name, "Alice");
    }

    #[tokio::test]
    async fn malformed_date_is_bad_request() {
        let (app, repo) = app().await;
        let auth = init_data(ALLOWED, TOKEN);

        let response = app
            .oneshot(post_event(
                &auth,
                r#"{"date":"01/05/2024","book_name":"Matilda","participant_name":"Alice"}"#,
            ))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json(response).await;
        assert!(body["detail"].as_str().is_some_and(|detail| detail.contains("YYYY-MM-DD")));
        assert!(body["correlation_id"].as_str().is_some_and(|id| id.starts_with("api-")));
        assert!(repo.last_events(1).await.expect("events").is_empty());
    }

    #[tokio::test]
    async fn unknown_participant_or_book_is_bad_request() {
        let (app, repo) = app().await;
        let auth = init_data(ALLOWED, TOKEN);

        for body in [
            r#"{"date":"2024-05-01","book_name":"Matilda","participant_name":"Grandpa"}"#,
            r#"{"date":"2024-05-01","book_name":"Dune","participant_name":"Alice"}"#,
            r#"{"date":"2024-05-01","book_name":"","participant_name":"Alice"}"#,
            r#"{not json"#,
        ] {
            let response = app.clone().oneshot(post_event(&auth, body)).await.expect("response");
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
        }
        assert!(repo.last_events(1).await.expect("events").is_empty());
    }
}
