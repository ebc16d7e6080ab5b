use crate::classify::{classify, format_break_label, ClassifyError};
use crate::config::AppConfig;
use crate::data::{
    acceptable_file_name, build_upload_form, display_name, FileUpload, FsStore, ReadError,
    ValidationError,
};
use crate::layers::fill_color_expression;
use crate::legend::{build_legend, Legend};
use crate::types::SpatialUnit;
use anyhow::Result;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info};

pub struct AppState {
    pub config: AppConfig,
    pub store: FsStore,
}

type ApiError = (StatusCode, String);

pub async fn start_server(config: AppConfig) -> Result<()> {
    let store = FsStore::new(&config.data.root);
    let state = Arc::new(AppState { store, config: config.clone() });

    let addr = SocketAddr::from(([127, 0, 0, 1], config.server.port));
    info!("Starting server on http://{}", addr);

    let app = Router::new()
        .route("/api/upload", post(upload_handler))
        .route("/api/files/:unit", get(list_handler))
        .route("/api/data/:unit/:file", get(dataset_handler))
        .route("/api/classify/:unit/:file", get(classify_handler))
        .route("/api/prediction", get(prediction_handler))
        .nest_service("/data", ServeDir::new(&config.data.root))
        .fallback_service(ServeDir::new(&config.data.assets))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn parse_unit(unit: u8) -> Result<SpatialUnit, ApiError> {
    SpatialUnit::from_wire_id(unit)
        .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("unknown spatial unit {unit}")))
}

fn check_file_name(file: &str) -> Result<(), ApiError> {
    if acceptable_file_name(file) {
        Ok(())
    } else {
        Err((StatusCode::BAD_REQUEST, ValidationError::InvalidFileName.to_string()))
    }
}

fn read_failure(err: ReadError) -> ApiError {
    match err {
        ReadError::Io { ref source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
            (StatusCode::NOT_FOUND, "dataset not found".to_string())
        }
        ReadError::Io { .. } => {
            error!("{err}");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to read dataset".to_string())
        }
        ReadError::Dataset(_) | ReadError::Json(_) => (StatusCode::BAD_REQUEST, err.to_string()),
    }
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub status: String,
    pub file: String,
}

/// Accept a dataset upload: one file part plus the spatial-unit part the
/// form attaches. The same validation the form runs client-side runs again
/// here, nothing about the request is trusted.
async fn upload_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut files = Vec::new();
    let mut unit: Option<SpatialUnit> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
                files.push(FileUpload { file_name, content_type, bytes: bytes.to_vec() });
            }
            Some("unit") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
                unit = text.trim().parse::<u8>().ok().and_then(SpatialUnit::from_wire_id);
            }
            _ => {}
        }
    }

    let form = build_upload_form(&files, unit)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    check_file_name(&form.file_name)?;

    if let Err(e) = state.store.save_upload(&form).await {
        error!("upload of {:?} failed: {e}", form.file_name);
        return Err((StatusCode::INTERNAL_SERVER_ERROR, "Upload failed".to_string()));
    }

    Ok(Json(UploadResponse { status: "Upload complete".to_string(), file: form.file_name }))
}

#[derive(Serialize)]
pub struct FileEntry {
    pub file: String,
    pub name: String,
}

/// Dataset files stored for one spatial unit, with the display names the
/// menu shows.
async fn list_handler(
    State(state): State<Arc<AppState>>,
    Path(unit): Path<u8>,
) -> Result<Json<Vec<FileEntry>>, ApiError> {
    let unit = parse_unit(unit)?;
    let files = state.store.list_files(unit).await.map_err(|e| {
        error!("{e}");
        (StatusCode::INTERNAL_SERVER_ERROR, "failed to list datasets".to_string())
    })?;

    let entries = files
        .into_iter()
        .map(|file| FileEntry { name: display_name(&file), file })
        .collect();
    Ok(Json(entries))
}

/// A stored dataset, parsed just far enough to guarantee the client gets
/// well-formed JSON.
async fn dataset_handler(
    State(state): State<Arc<AppState>>,
    Path((unit, file)): Path<(u8, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let unit = parse_unit(unit)?;
    check_file_name(&file)?;
    let value = state.store.read_json(unit, &file).await.map_err(read_failure)?;
    Ok(Json(value))
}

#[derive(Deserialize)]
pub struct ClassifyParams {
    pub property: Option<String>,
    pub buckets: Option<usize>,
}

#[derive(Serialize)]
pub struct ClassifyResponse {
    pub property: String,
    pub breaks: Vec<f64>,
    pub labels: Vec<String>,
    pub colors: Vec<String>,
    pub fill_color: serde_json::Value,
    pub legend: Legend,
}

/// Server-side classification of a stored dataset: the breaks, ramp, legend
/// and ready-to-use fill-color expression for the requested (or default)
/// property.
async fn classify_handler(
    State(state): State<Arc<AppState>>,
    Path((unit, file)): Path<(u8, String)>,
    Query(params): Query<ClassifyParams>,
) -> Result<Json<ClassifyResponse>, ApiError> {
    let unit = parse_unit(unit)?;
    check_file_name(&file)?;
    let mut dataset = state.store.read_dataset(unit, &file).await.map_err(read_failure)?;
    if params.buckets.is_some() {
        dataset.presentation.buckets = params.buckets;
    }

    let match_key = unit.match_key();
    let property = match params.property {
        Some(property) => property,
        None => dataset.default_property(match_key).ok_or((
            StatusCode::UNPROCESSABLE_ENTITY,
            "dataset has no numeric properties".to_string(),
        ))?,
    };

    let response = classification_response(&state, &dataset, match_key, property)?;
    Ok(Json(response))
}

/// The static prediction overlay, classified on its configured property.
async fn prediction_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ClassifyResponse>, ApiError> {
    let path = state.config.data.root.join(&state.config.classify.prediction_file);
    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        error!("failed to read prediction dataset {path:?}: {e}");
        (StatusCode::NOT_FOUND, "prediction dataset not available".to_string())
    })?;
    let dataset = crate::types::Dataset::from_slice(&bytes)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let match_key = SpatialUnit::Locality.match_key();
    let property = state.config.classify.prediction_property.clone();
    let response = classification_response(&state, &dataset, match_key, property)?;
    Ok(Json(response))
}

fn classification_response(
    state: &AppState,
    dataset: &crate::types::Dataset,
    match_key: &str,
    property: String,
) -> Result<ClassifyResponse, ApiError> {
    let classification = classify(dataset, &property, &state.config.classify.defaults())
        .map_err(|e| match e {
            ClassifyError::EmptySample => {
                info!(property = %property, "no values to classify");
                (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
            }
            _ => (StatusCode::BAD_REQUEST, e.to_string()),
        })?;

    let table = classification.match_table(dataset, match_key, &property);
    let fill_color = fill_color_expression(match_key, &table, &classification.no_data_color);
    let labels = classification.breaks.iter().map(|b| format_break_label(*b)).collect();
    let legend = build_legend(&classification);

    Ok(ClassifyResponse {
        property,
        labels,
        legend,
        fill_color,
        breaks: classification.breaks,
        colors: classification.colors,
    })
}
