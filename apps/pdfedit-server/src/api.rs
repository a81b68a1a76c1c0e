//! API handlers for the pdfedit server
//!
//! Engine work (parsing, rewriting, rasterizing) blocks, so every handler
//! hands it to the blocking pool.

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, HeaderValue},
    response::IntoResponse,
    Json,
};
use pdfedit_core::{
    CommitOutcome, CommitRequest, EditBatch, ExportRequest, ImageFormat, LopdfEngine, PdfEditor,
    PreviewRequest, RenderRequest, UploadResult, DEFAULT_DPI,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ServerError;
use crate::AppState;

/// Run an editor operation on the blocking pool
async fn run_blocking<T, F>(state: &AppState, op: F) -> Result<T, ServerError>
where
    F: FnOnce(&PdfEditor<LopdfEngine>) -> pdfedit_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let editor = Arc::clone(&state.editor);
    tokio::task::spawn_blocking(move || op(&editor))
        .await
        .map_err(|e| ServerError::Internal(format!("worker task failed: {}", e)))?
        .map_err(ServerError::from)
}

fn header_value(value: &str) -> Result<HeaderValue, ServerError> {
    HeaderValue::from_str(value)
        .map_err(|e| ServerError::Internal(format!("invalid header value '{}': {}", value, e)))
}

pub(crate) fn attachment_headers(
    content_type: &str,
    file_name: &str,
) -> Result<HeaderMap, ServerError> {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, header_value(content_type)?);
    headers.insert(
        header::CONTENT_DISPOSITION,
        header_value(&format!(
            "attachment; filename=\"{}\"",
            file_name.replace(['"', '\\'], "_")
        ))?,
    );
    Ok(headers)
}

fn image_headers(format: ImageFormat) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(format.content_type()),
    );
    headers
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Handler: GET /health
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "pdfedit-server",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Handler: POST /api/pdf/upload (multipart, one file field)
pub async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResult>, ServerError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::InvalidRequest(e.to_string()))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| ServerError::InvalidRequest(e.to_string()))?;
        upload = Some((file_name, data));
        break;
    }

    let (file_name, data) =
        upload.ok_or_else(|| ServerError::InvalidRequest("No file.".to_string()))?;
    info!("Upload request: file={}, size={}", file_name, data.len());

    let result = run_blocking(&state, move |editor| editor.save_upload(&file_name, &data)).await?;
    Ok(Json(result))
}

/// Handler: GET /api/pdf/pagecount/:file_name
pub async fn handle_page_count(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
) -> Result<Json<u32>, ServerError> {
    let count = run_blocking(&state, move |editor| editor.page_count(&file_name)).await?;
    Ok(Json(count))
}

#[derive(Deserialize)]
pub struct PreviewQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_image_format")]
    pub fmt: String,
    #[serde(default = "default_dpi")]
    pub dpi: u32,
}

fn default_page() -> u32 {
    1
}

fn default_image_format() -> String {
    "png".to_string()
}

fn default_dpi() -> u32 {
    DEFAULT_DPI
}

fn default_save_as_new() -> bool {
    true
}

fn default_export_format() -> String {
    "pdf".to_string()
}

/// Handler: GET /api/pdf/preview/:file_name?page&fmt&dpi
pub async fn handle_preview(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
    Query(query): Query<PreviewQuery>,
) -> Result<impl IntoResponse, ServerError> {
    let request = RenderRequest {
        page: query.page,
        dpi: query.dpi,
        format: query.fmt.parse()?,
    };
    debug!("Preview request: file={}, page={}, dpi={}", file_name, request.page, request.dpi);

    let bytes = run_blocking(&state, move |editor| {
        editor.render_stored_page(&file_name, &request)
    })
    .await?;
    Ok((image_headers(request.format), bytes))
}

/// Edit request body
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditApiRequest {
    pub file_name: String,
    #[serde(default = "default_save_as_new")]
    pub save_as_new: bool,
    #[serde(flatten)]
    pub batch: EditBatch,
}

/// Handler: POST /api/pdf/edit
pub async fn handle_edit(
    State(state): State<AppState>,
    Json(req): Json<EditApiRequest>,
) -> Result<Json<CommitOutcome>, ServerError> {
    info!(
        "Edit request: file={}, save_as_new={}, replacements={}, overlays={}, metadata={}",
        req.file_name,
        req.save_as_new,
        req.batch.replacements.len(),
        req.batch.overlays.len(),
        req.batch.metadata.len()
    );

    let request = CommitRequest {
        file_name: req.file_name,
        save_as_new: req.save_as_new,
        batch: req.batch,
    };
    let outcome = run_blocking(&state, move |editor| editor.apply_and_persist(&request)).await?;
    Ok(Json(outcome))
}

/// Export request body
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportApiRequest {
    pub file_name: String,
    /// "pdf", "docx", or "images"
    #[serde(default = "default_export_format")]
    pub format: String,
    /// "png" or "jpeg", used by the images format
    #[serde(default = "default_image_format")]
    pub image_format: String,
    pub dpi: Option<u32>,
}

/// Handler: POST /api/pdf/export
pub async fn handle_export(
    State(state): State<AppState>,
    Json(req): Json<ExportApiRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let request = ExportRequest {
        file_name: req.file_name,
        format: req.format.parse()?,
        image_format: req.image_format.parse()?,
        dpi: req.dpi.unwrap_or(DEFAULT_DPI),
    };
    info!("Export request: file={}, format={}", request.file_name, request.format);

    let artifact = run_blocking(&state, move |editor| editor.export(&request)).await?;
    let headers = attachment_headers(artifact.content_type, &artifact.file_name)?;
    Ok((headers, artifact.bytes))
}

/// Handler: GET /api/pdf/download/:file_name
pub async fn handle_download(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
) -> Result<impl IntoResponse, ServerError> {
    let (name, bytes) = run_blocking(&state, move |editor| {
        let mut download = editor.open_download(&file_name)?;
        let mut bytes = Vec::new();
        download.file.read_to_end(&mut bytes)?;
        debug!("Download: file={}, area={}", download.name, download.area);
        Ok((download.name, bytes))
    })
    .await?;

    let headers = attachment_headers("application/pdf", &name)?;
    Ok((headers, bytes))
}

/// Preview-after-edits request body
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewAfterEditsApiRequest {
    pub file_name: String,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_dpi")]
    pub dpi: u32,
    #[serde(default = "default_image_format")]
    pub image_format: String,
    #[serde(flatten)]
    pub batch: EditBatch,
}

/// Handler: POST /api/pdf/preview-after-edits
pub async fn handle_preview_after_edits(
    State(state): State<AppState>,
    Json(req): Json<PreviewAfterEditsApiRequest>,
) -> Result<impl IntoResponse, ServerError> {
    let request = PreviewRequest {
        file_name: req.file_name,
        render: RenderRequest {
            page: req.page,
            dpi: req.dpi,
            format: req.image_format.parse()?,
        },
        batch: req.batch,
    };
    let format = request.render.format;

    let bytes = run_blocking(&state, move |editor| editor.preview_with_edits(&request)).await?;
    Ok((image_headers(format), bytes))
}

/// Handler: GET /api/pdf/metadata/:file_name
pub async fn handle_metadata(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
) -> Result<Json<BTreeMap<String, Option<String>>>, ServerError> {
    let metadata = run_blocking(&state, move |editor| editor.read_metadata(&file_name)).await?;
    Ok(Json(metadata))
}
