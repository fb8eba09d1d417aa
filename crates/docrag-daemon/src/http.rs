//! HTTP search surface.
//!
//! - `POST /search` with `{"query": "...", "top_k": 3}` returns the ranked
//!   chunk list as JSON.
//! - `POST /ingest` with `{"key": "..."}` or `{"prefix": "..."}` chunks
//!   stored objects onto the queue, for uploads that happen while the
//!   server owns the queue.
//! - `GET /healthz` reports liveness.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use docrag_ingest::{IngestService, PrefixReport};
use docrag_retrieval::{RetrievalService, RetrievedChunk};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Upper bound on `top_k` per request.
const MAX_TOP_K: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub retrieval: Arc<RetrievalService>,
    pub ingest: Arc<IngestService>,
    pub bucket: String,
    pub default_top_k: usize,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub top_k: Option<usize>,
}

/// Exactly one of `key` or `prefix`.
#[derive(Debug, Deserialize, Serialize)]
pub struct IngestRequest {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/search", post(search))
        .route("/ingest", post(ingest))
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Json<Vec<RetrievedChunk>> {
    let top_k = request.top_k.unwrap_or(state.default_top_k).min(MAX_TOP_K);
    debug!(top_k, "Search request");
    Json(state.retrieval.retrieve(&request.query, top_k).await)
}

async fn ingest(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<PrefixReport>, ApiError> {
    let result = match (request.key, request.prefix) {
        (Some(key), None) => state
            .ingest
            .ingest_object(&state.bucket, &key)
            .await
            .map(|report| PrefixReport {
                ingested: vec![report],
                failed: Vec::new(),
            }),
        (None, Some(prefix)) => state.ingest.ingest_prefix(&state.bucket, &prefix).await,
        _ => return Err(bad_request("exactly one of `key` or `prefix` is required")),
    };

    result.map(Json).map_err(|e| {
        warn!(error = %e, "Ingest request failed");
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorBody {
                message: e.to_string(),
            }),
        )
    })
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            message: message.into(),
        }),
    )
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "HTTP server listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use chrono::Utc;
    use docrag_embeddings::{EmbeddingModel, HashEmbedder};
    use docrag_extract::{Chunker, ChunkerConfig};
    use docrag_storage::{InMemoryObjectStore, InMemoryQueue, ObjectStore, WorkQueue};
    use docrag_types::{IndexKind, MetadataEntry};
    use docrag_vector::{empty_index, share, InMemoryMetadataStore, MetadataStore};

    fn state_with(texts: &[&str]) -> AppState {
        state_with_stores(
            texts,
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(InMemoryQueue::new(Duration::from_secs(60))),
        )
    }

    fn state_with_stores(
        texts: &[&str],
        objects: Arc<dyn ObjectStore>,
        queue: Arc<dyn WorkQueue>,
    ) -> AppState {
        let embedder: Arc<dyn EmbeddingModel> = Arc::new(HashEmbedder::new(32).unwrap());
        let metadata: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::new());
        let index = share(empty_index(IndexKind::Flat, 32).unwrap());

        for (i, text) in texts.iter().enumerate() {
            let position = index
                .write()
                .unwrap()
                .add(&embedder.embed(text).unwrap())
                .unwrap();
            metadata
                .put(&MetadataEntry {
                    chunk_id: format!("doc.txt#{:06}", i),
                    doc_id: "doc.txt".to_string(),
                    vector_position: position,
                    text: text.to_string(),
                    source_key: "doc.txt".to_string(),
                    timestamp: Utc::now(),
                })
                .unwrap();
        }

        AppState {
            retrieval: Arc::new(RetrievalService::new(embedder, index, metadata)),
            ingest: Arc::new(IngestService::new(
                objects,
                queue,
                Chunker::new(ChunkerConfig::default()),
            )),
            bucket: "documents".to_string(),
            default_top_k: 2,
        }
    }

    #[tokio::test]
    async fn test_search_uses_default_top_k() {
        let state = state_with(&["red kites", "red squirrels", "red deer"]);
        let request = SearchRequest {
            query: "red".to_string(),
            top_k: None,
        };
        let Json(results) = search(State(state), Json(request)).await;
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_search_explicit_top_k() {
        let state = state_with(&["red kites", "blue tits", "grey herons"]);
        let request = SearchRequest {
            query: "blue tits".to_string(),
            top_k: Some(1),
        };
        let Json(results) = search(State(state), Json(request)).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_text, "blue tits");
    }

    #[tokio::test]
    async fn test_empty_query_returns_empty_list() {
        let state = state_with(&["anything"]);
        let request: SearchRequest = serde_json::from_str(r#"{"query": ""}"#).unwrap();
        let Json(results) = search(State(state), Json(request)).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_ingest_by_key_enqueues_chunks() {
        let objects = Arc::new(InMemoryObjectStore::new());
        let queue = Arc::new(InMemoryQueue::new(Duration::from_secs(60)));
        objects
            .put("documents", "notes.txt", b"alpha\n\nbeta".to_vec())
            .await
            .unwrap();
        let state = state_with_stores(&[], objects, queue.clone());

        let request = IngestRequest {
            key: Some("notes.txt".to_string()),
            prefix: None,
        };
        let Json(report) = ingest(State(state), Json(request)).await.unwrap();

        assert_eq!(report.chunks_sent(), 1);
        assert_eq!(queue.stats().await.unwrap().ready, 1);
    }

    #[tokio::test]
    async fn test_ingest_rejects_ambiguous_request() {
        let state = state_with(&[]);
        let request = IngestRequest {
            key: Some("a.txt".to_string()),
            prefix: Some("docs/".to_string()),
        };
        let (status, _) = ingest(State(state), Json(request)).await.unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_ingest_missing_object_is_unprocessable() {
        let state = state_with(&[]);
        let request = IngestRequest {
            key: Some("missing.txt".to_string()),
            prefix: None,
        };
        let (status, Json(body)) = ingest(State(state), Json(request)).await.unwrap_err();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body.message.contains("missing.txt"));
    }

    #[tokio::test]
    async fn test_healthz() {
        assert_eq!(healthz().await, StatusCode::OK);
    }
}
