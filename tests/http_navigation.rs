use std::io::ErrorKind;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use textdrill::config::ClientSettings;
use textdrill::nav::{Level, NavError, NavOutcome, Navigator};
use textdrill::service::wire::DrillDownResponse;
use textdrill::service::{
    DeleteRequest, Document, DocumentSummary, DrillDownRequest, DrillService, Health,
    HttpServiceClient, InsertRequest, Metadata, MutationAck, NewDocument, ReorderRequest,
    ServiceError, SharedWord, WordOccurrence, WordQuery,
};
use textdrill::test_support::{FakeDrillService, SAMPLE_PARAGRAPH};

type SharedFake = Arc<FakeDrillService>;

struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(error: ServiceError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let detail = match self.0 {
            ServiceError::Request { message, .. } | ServiceError::Range { message, .. } => message,
            other => other.to_string(),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn router(fake: SharedFake) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/documents", get(list_documents).post(create_document))
        .route("/api/documents/:id", get(get_document).delete(delete_document))
        .route(
            "/api/documents/:id/metadata",
            get(get_metadata).put(update_metadata),
        )
        .route("/api/drilldown", post(drill_down))
        .route("/api/mutate/insert", post(insert))
        .route("/api/mutate/delete", post(delete))
        .route("/api/mutate/reorder", post(reorder))
        .route("/api/crosslinks", get(shared_words))
        .route("/api/crosslinks/traverse", post(traverse_word))
        .with_state(fake)
}

async fn health(State(fake): State<SharedFake>) -> ApiResult<Health> {
    Ok(Json(fake.health().await?))
}

async fn list_documents(State(fake): State<SharedFake>) -> ApiResult<Vec<DocumentSummary>> {
    Ok(Json(fake.list_documents().await?))
}

async fn create_document(
    State(fake): State<SharedFake>,
    Json(document): Json<NewDocument>,
) -> ApiResult<Document> {
    Ok(Json(fake.create_document(&document).await?))
}

async fn get_document(
    State(fake): State<SharedFake>,
    Path(id): Path<String>,
) -> ApiResult<Document> {
    Ok(Json(fake.get_document(&id).await?))
}

async fn delete_document(
    State(fake): State<SharedFake>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    fake.delete_document(&id).await?;
    Ok(Json(json!({ "status": "deleted", "documentId": id })))
}

async fn get_metadata(
    State(fake): State<SharedFake>,
    Path(id): Path<String>,
) -> ApiResult<Metadata> {
    Ok(Json(fake.get_metadata(&id).await?))
}

async fn update_metadata(
    State(fake): State<SharedFake>,
    Path(id): Path<String>,
    Json(metadata): Json<Metadata>,
) -> ApiResult<Value> {
    let metadata = fake.update_metadata(&id, &metadata).await?;
    Ok(Json(json!({ "status": "ok", "metadata": metadata })))
}

async fn drill_down(
    State(fake): State<SharedFake>,
    Json(request): Json<DrillDownRequest>,
) -> ApiResult<DrillDownResponse> {
    Ok(Json(fake.drill_down_response(&request)?))
}

async fn insert(
    State(fake): State<SharedFake>,
    Json(request): Json<InsertRequest>,
) -> ApiResult<MutationAck> {
    Ok(Json(fake.insert(&request).await?))
}

async fn delete(
    State(fake): State<SharedFake>,
    Json(request): Json<DeleteRequest>,
) -> ApiResult<MutationAck> {
    Ok(Json(fake.delete(&request).await?))
}

async fn reorder(
    State(fake): State<SharedFake>,
    Json(request): Json<ReorderRequest>,
) -> ApiResult<MutationAck> {
    Ok(Json(fake.reorder(&request).await?))
}

async fn shared_words(State(fake): State<SharedFake>) -> ApiResult<Vec<SharedWord>> {
    Ok(Json(fake.shared_words().await?))
}

async fn traverse_word(
    State(fake): State<SharedFake>,
    Json(query): Json<WordQuery>,
) -> ApiResult<Vec<WordOccurrence>> {
    Ok(Json(fake.traverse_word(&query).await?))
}

async fn start_service(fake: SharedFake) -> Option<String> {
    let listener = match tokio::net::TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(error) if error.kind() == ErrorKind::PermissionDenied => return None,
        Err(error) => panic!("failed to bind test listener: {error}"),
    };
    let addr = listener
        .local_addr()
        .expect("listener should have a local address");
    tokio::spawn(async move {
        axum::serve(listener, router(fake))
            .await
            .expect("test server should run");
    });
    Some(format!("http://{addr}"))
}

async fn navigator_for(fake: SharedFake) -> Option<Navigator<HttpServiceClient>> {
    let base_url = start_service(fake).await?;
    let client = HttpServiceClient::new(&ClientSettings::for_base_url(base_url))
        .expect("client should build");
    Some(Navigator::new(client))
}

fn labels(navigator: &Navigator<HttpServiceClient>) -> Vec<String> {
    navigator
        .view()
        .items()
        .map(|node| node.label.clone())
        .collect()
}

fn corpus() -> SharedFake {
    Arc::new(FakeDrillService::with_documents([
        (
            "poem",
            "the quick fox\njumps over\nthe lazy dog\nand runs\naway home",
        ),
        ("dog", "a dog barks\nat the fox\nall night\nuntil dawn\nthen sleeps"),
    ]))
}

#[tokio::test]
async fn letters_document_drills_to_characters_and_back() {
    let fake = corpus();
    let Some(navigator) = navigator_for(fake.clone()).await else {
        eprintln!("skipping: local TCP bind is not permitted in this environment");
        return;
    };

    navigator
        .create_document("letters", SAMPLE_PARAGRAPH, None)
        .await
        .expect("create should succeed");
    assert_eq!(fake.paragraph("letters").as_deref(), Some(SAMPLE_PARAGRAPH));

    navigator
        .select_document("letters")
        .await
        .expect("select should succeed");
    assert_eq!(labels(&navigator), vec!["A", "B", "C", "D", "E"]);

    navigator.drill_into_index(2).await.expect("line drill");
    let state = navigator.state();
    assert_eq!(state.level, Level::Words);
    assert_eq!(state.parent_text, "C");
    assert_eq!(state.line_index, Some(2));
    assert_eq!(labels(&navigator), vec!["C"]);

    navigator.drill_into_index(0).await.expect("word drill");
    assert_eq!(navigator.state().level, Level::Characters);
    assert_eq!(navigator.state().trail.len(), 3);
    assert_eq!(labels(&navigator), vec!["C"]);
    assert!(navigator.view().items().all(|node| !node.can_drill_down));

    navigator.navigate_to(0).await.expect("back to lines");
    let state = navigator.state();
    assert_eq!(state.level, Level::Lines);
    assert_eq!(state.trail.len(), 1);
    assert_eq!(state.parent_index, None);
    assert_eq!(labels(&navigator), vec!["A", "B", "C", "D", "E"]);
    assert!(navigator.error().is_none());
}

#[tokio::test]
async fn mutations_round_trip_through_the_service() {
    let fake = corpus();
    let Some(navigator) = navigator_for(fake.clone()).await else {
        eprintln!("skipping: local TCP bind is not permitted in this environment");
        return;
    };

    navigator.select_document("poem").await.expect("select");
    navigator.drill_into_index(2).await.expect("line drill");

    let outcome = navigator.insert(1, "very").await.expect("insert");
    assert_eq!(outcome, NavOutcome::Applied);
    assert_eq!(labels(&navigator), vec!["the", "very", "lazy", "dog"]);

    navigator.reorder(3, 0).await.expect("reorder");
    assert_eq!(labels(&navigator), vec!["dog", "the", "very", "lazy"]);
    assert_eq!(
        fake.paragraph("poem").as_deref(),
        Some("the quick fox\njumps over\ndog the very lazy\nand runs\naway home")
    );

    let error = navigator.delete(9).await.expect_err("delete should fail");
    assert!(matches!(
        error,
        NavError::Service(ServiceError::Range {
            status: StatusCode::BAD_REQUEST,
            ..
        })
    ));
    assert!(navigator.error().is_some());
    assert_eq!(labels(&navigator), vec!["dog", "the", "very", "lazy"]);
}

#[tokio::test]
async fn missing_documents_surface_the_service_detail() {
    let Some(navigator) = navigator_for(corpus()).await else {
        eprintln!("skipping: local TCP bind is not permitted in this environment");
        return;
    };

    let error = navigator
        .select_document("ghost")
        .await
        .expect_err("select should fail");
    match error {
        NavError::Service(ServiceError::Request { status, message }) => {
            assert_eq!(status, StatusCode::NOT_FOUND);
            assert_eq!(message, "Document 'ghost' not found");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(navigator.state().document_id, None);
}

#[tokio::test]
async fn shared_word_opens_its_line_in_the_other_document() {
    let Some(navigator) = navigator_for(corpus()).await else {
        eprintln!("skipping: local TCP bind is not permitted in this environment");
        return;
    };

    let shared = navigator.shared_words().await.expect("shared words");
    assert!(shared.iter().any(|entry| entry.word == "fox"));

    let occurrences = navigator
        .find_word("fox", Some("dog"))
        .await
        .expect("lookup should succeed");
    assert_eq!(occurrences.len(), 1);

    navigator
        .traverse_occurrence(&occurrences[0])
        .await
        .expect("traverse should succeed");
    let state = navigator.state();
    assert_eq!(state.document_id.as_deref(), Some("dog"));
    assert_eq!(state.level, Level::Words);
    assert_eq!(state.line_index, Some(1));
    assert_eq!(labels(&navigator), vec!["at", "the", "fox"]);
}

#[tokio::test]
async fn metadata_and_ids_with_reserved_characters() {
    let fake = corpus();
    let Some(navigator) = navigator_for(fake.clone()).await else {
        eprintln!("skipping: local TCP bind is not permitted in this environment");
        return;
    };

    let metadata = json!({ "source": "journal" })
        .as_object()
        .cloned()
        .expect("object literal");
    navigator
        .create_document("notes/today", SAMPLE_PARAGRAPH, None)
        .await
        .expect("create should succeed");

    let service = navigator.service();
    let updated = service
        .update_metadata("notes/today", &metadata)
        .await
        .expect("metadata update");
    assert_eq!(updated, metadata);
    assert_eq!(
        service.get_metadata("notes/today").await.expect("metadata"),
        metadata
    );

    navigator
        .delete_document("notes/today")
        .await
        .expect("delete should succeed");
    assert_eq!(fake.paragraph("notes/today"), None);

    let health = navigator.check_health().await.expect("health");
    assert!(!health.neo4j);
    assert_eq!(health.documents, 2);
}
