//! HTTP surface
//!
//! Thin warp routes over [`Analyst`]. Every handler answers with JSON; failed
//! requests keep the analysis response shape with `ok: false`.


use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use futures::TryStreamExt;
use serde::Serialize;
use serde_json::json;
use warp::http::StatusCode;
use warp::multipart::{FormData, Part};
use warp::reply::{Json, WithStatus};
use warp::{Buf, Filter, Rejection, Reply};

use crate::analysis::{AnalysisRequest, AnalysisResponse, Analyst};
use crate::error::AnalystError;

/// Build the full route tree.
pub fn routes(
    analyst: Arc<Analyst>,
    max_upload_bytes: u64,
    cors_origins: &[String],
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let health = warp::path!("api" / "health")
        .and(warp::get())
        .map(|| warp::reply::json(&json!({ "status": "ok", "timestamp": now() })));

    let health_db = warp::path!("api" / "health" / "db")
        .and(warp::get())
        .and(with_analyst(analyst.clone()))
        .and_then(health_db_handler);

    let upload = warp::path!("api" / "datasets" / "upload")
        .and(warp::post())
        .and(warp::multipart::form().max_length(max_upload_bytes))
        .and(with_analyst(analyst.clone()))
        .and_then(upload_handler);

    let analyze_run = warp::path!("api" / "analyze" / "run")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_analyst(analyst.clone()))
        .and_then(analyze_handler);

    let analyze_upload = warp::path!("api" / "analyze")
        .and(warp::post())
        .and(warp::multipart::form().max_length(max_upload_bytes))
        .and(with_analyst(analyst))
        .and_then(analyze_upload_handler);

    let cors = warp::cors()
        .allow_origins(cors_origins.iter().map(String::as_str))
        .allow_methods(vec!["GET", "POST"])
        .allow_headers(vec!["content-type"])
        .allow_credentials(true);

    health
        .or(health_db)
        .or(upload)
        .or(analyze_run)
        .or(analyze_upload)
        .with(cors)
        .with(warp::trace::request())
        .recover(handle_rejection)
}

/// Serve until Ctrl-C.
pub async fn serve(
    addr: SocketAddr,
    analyst: Arc<Analyst>,
    max_upload_bytes: u64,
    cors_origins: &[String],
) -> Result<(), warp::Error> {
    let (bound, server) = warp::serve(routes(analyst, max_upload_bytes, cors_origins))
        .try_bind_with_graceful_shutdown(addr, async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })?;

    tracing::info!("API server running on http://{}", bound);
    server.await;
    Ok(())
}

fn with_analyst(
    analyst: Arc<Analyst>,
) -> impl Filter<Extract = (Arc<Analyst>,), Error = Infallible> + Clone {
    warp::any().map(move || analyst.clone())
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_db_handler(analyst: Arc<Analyst>) -> Result<WithStatus<Json>, Infallible> {
    let reply = match analyst.check_store().await {
        Ok(()) => warp::reply::with_status(
            warp::reply::json(&json!({ "ok": true, "db": true, "timestamp": now() })),
            StatusCode::OK,
        ),
        Err(err) => {
            tracing::error!("Database health check failed: {}", err);
            warp::reply::with_status(
                warp::reply::json(&json!({
                    "ok": false,
                    "error": err.to_string(),
                    "timestamp": now()
                })),
                StatusCode::INTERNAL_SERVER_ERROR,
            )
        }
    };
    Ok(reply)
}

async fn upload_handler(
    form: FormData,
    analyst: Arc<Analyst>,
) -> Result<WithStatus<Json>, Infallible> {
    let result = async {
        let form = UploadForm::collect(form).await?;
        let (file_name, payload) = form.require_file()?;
        analyst.upload(file_name.as_deref(), &payload).await
    }
    .await;
    Ok(respond(result))
}

async fn analyze_handler(
    request: AnalysisRequest,
    analyst: Arc<Analyst>,
) -> Result<WithStatus<Json>, Infallible> {
    Ok(respond(analyst.analyze(&request).await))
}

async fn analyze_upload_handler(
    form: FormData,
    analyst: Arc<Analyst>,
) -> Result<WithStatus<Json>, Infallible> {
    let result = async {
        let mut form = UploadForm::collect(form).await?;
        let question = form.fields.remove("question").unwrap_or_default();
        let (file_name, payload) = form.require_file()?;
        analyst
            .analyze_upload(file_name.as_deref(), &payload, &question)
            .await
    }
    .await;
    Ok(respond(result))
}

fn respond<T: Serialize>(result: Result<T, AnalystError>) -> WithStatus<Json> {
    match result {
        Ok(body) => warp::reply::with_status(warp::reply::json(&body), StatusCode::OK),
        Err(err) => {
            let status = status_for(&err);
            if status.is_server_error() {
                tracing::error!("Request failed: {}", err);
            } else {
                tracing::info!("Request rejected: {}", err);
            }
            warp::reply::with_status(warp::reply::json(&AnalysisResponse::failure(&err)), status)
        }
    }
}

/// HTTP status for a pipeline error.
pub fn status_for(err: &AnalystError) -> StatusCode {
    match err {
        AnalystError::MalformedInput { .. } | AnalystError::UnsafeQuery { .. } => {
            StatusCode::BAD_REQUEST
        }
        AnalystError::ModelUnavailable { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn handle_rejection(rejection: Rejection) -> Result<WithStatus<Json>, Infallible> {
    let (status, message) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Upload is too large".to_string())
    } else if let Some(e) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e))
    } else if let Some(e) = rejection.find::<warp::cors::CorsForbidden>() {
        (StatusCode::FORBIDDEN, e.to_string())
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else if let Some(e) = rejection.find::<warp::reject::InvalidHeader>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else {
        tracing::warn!("Unhandled rejection: {:?}", rejection);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        )
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&json!({
            "ok": false,
            "error": { "code": "http", "message": message }
        })),
        status,
    ))
}

// ============================================================================
// Multipart
// ============================================================================

/// Buffered multipart body: the `file` part plus any text fields
#[derive(Debug, Default)]
struct UploadForm {
    file: Option<(Option<String>, Vec<u8>)>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    async fn collect(form: FormData) -> Result<Self, AnalystError> {
        let parts: Vec<Part> = form
            .try_collect()
            .await
            .map_err(|e| AnalystError::malformed(format!("Invalid multipart body: {}", e)))?;

        let mut collected = UploadForm::default();
        for part in parts {
            let name = part.name().to_string();
            let file_name = part.filename().map(str::to_string);
            let data = read_part(part).await?;

            if name == "file" {
                collected.file = Some((file_name, data));
            } else {
                collected
                    .fields
                    .insert(name, String::from_utf8_lossy(&data).into_owned());
            }
        }
        Ok(collected)
    }

    fn require_file(self) -> Result<(Option<String>, Vec<u8>), AnalystError> {
        self.file
            .ok_or_else(|| AnalystError::malformed("No file uploaded"))
    }
}

async fn read_part(part: Part) -> Result<Vec<u8>, AnalystError> {
    part.stream()
        .try_fold(Vec::new(), |mut data, buf| async move {
            data.extend_from_slice(buf.chunk());
            Ok(data)
        })
        .await
        .map_err(|e| AnalystError::malformed(format!("Failed to read upload: {}", e)))
}
