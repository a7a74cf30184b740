use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tokio::sync::Mutex;

use batch_converter_core::batch::{BatchRun, Converter};
use batch_converter_core::bundle::Bundle;
use batch_converter_core::config::Quality;
use batch_converter_core::format::OutputFormat;
use batch_converter_core::history::HistoryRecord;
use batch_converter_core::intake::FileDescriptor;
use batch_converter_core::notify::{CollectingNotifier, Notification};
use batch_converter_core::stats::StatsCounters;

/// One converter for the whole process; the mutex serialises batches.
#[derive(Clone)]
pub struct AppState {
    pub converter: Arc<Mutex<Converter>>,
    pub notifier: Arc<CollectingNotifier>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct FileSummary {
    source_name: String,
    output_name: String,
    byte_size: u64,
    success: bool,
    error_kind: Option<&'static str>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct ConvertSummary {
    attempted: usize,
    succeeded: usize,
    results: Vec<FileSummary>,
    notifications: Vec<Notification>,
}

impl ConvertSummary {
    fn new(run: &BatchRun, notifications: Vec<Notification>) -> Self {
        Self {
            attempted: run.attempted,
            succeeded: run.succeeded,
            results: run
                .results
                .iter()
                .map(|r| FileSummary {
                    source_name: r.source_name.clone(),
                    output_name: r.output_name.clone(),
                    byte_size: r.byte_size,
                    success: r.is_success(),
                    error_kind: r.error().map(|e| e.kind()),
                    error: r.error().map(|e| e.to_string()),
                })
                .collect(),
            notifications,
        }
    }
}

fn failure<T: Serialize>(status: StatusCode, error: String, data: Option<T>) -> Response {
    let body = ApiResponse {
        success: false,
        data,
        error: Some(error),
    };
    (status, Json(body)).into_response()
}

/// POST /convert
///
/// Convert uploaded images and videos into one format.
///
/// Form fields:
/// - file: binary file data, repeatable
/// - to: target format (png, jpg, jpeg, gif, bmp, tiff, webp)
/// - quality (optional): 0-100 (default: 92)
///
/// One success returns that file; two or more return `converted_files.zip`.
pub async fn convert(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut files = Vec::new();
    let mut target: Option<OutputFormat> = None;
    let mut quality = Quality::default();

    // Parse multipart form
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(f)) => f,
            Ok(None) => break,
            Err(e) => return failure::<()>(StatusCode::BAD_REQUEST, e.to_string(), None),
        };

        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let mime = field.content_type().map(str::to_string);
                let bytes = match field.bytes().await {
                    Ok(b) => b,
                    Err(e) => return failure::<()>(StatusCode::BAD_REQUEST, e.to_string(), None),
                };
                let mut desc = FileDescriptor::new(file_name, bytes);
                desc.mime_type = mime;
                files.push(desc);
            }
            "to" | "format" => {
                let text = field.text().await.unwrap_or_default();
                match text.parse::<OutputFormat>() {
                    Ok(f) => target = Some(f),
                    Err(e) => return failure::<()>(StatusCode::BAD_REQUEST, e, None),
                }
            }
            "quality" => {
                let text = field.text().await.unwrap_or_default();
                match form_quality(&text) {
                    Ok(q) => quality = q,
                    Err(e) => return failure::<()>(StatusCode::BAD_REQUEST, e, None),
                }
            }
            _ => {}
        }
    }

    let Some(target) = target else {
        return failure::<()>(StatusCode::BAD_REQUEST, "missing field: to".into(), None);
    };
    if files.is_empty() {
        return failure::<()>(StatusCode::BAD_REQUEST, "no files uploaded".into(), None);
    }

    let mut converter = state.converter.lock().await;
    state.notifier.drain();

    // Each request converts only its own uploads.
    converter.clear_queue();
    converter.config_mut().target = target;
    converter.config_mut().quality = quality;

    let intake = converter.add_files(files);
    if intake.accepted == 0 {
        return failure::<()>(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            format!("{} file(s) rejected: unsupported format or duplicate", intake.rejected()),
            None,
        );
    }

    let run = converter.convert_all(|_| {}).await;
    let bundle = converter.bundle(&run);
    converter.clear_queue();
    let summary = ConvertSummary::new(&run, state.notifier.drain());
    drop(converter);

    log::info!("Converted {}/{} upload(s)", run.succeeded, run.attempted);
    batch_response(&bundle, run.succeeded, run.failed(), summary)
}

/// A blank quality field means the default.
fn form_quality(text: &str) -> Result<Quality, String> {
    if text.trim().is_empty() {
        return Ok(Quality::default());
    }
    text.parse()
}

/// The archive, or the single converted file. When archiving failed the first
/// converted file is returned and the warning travels in `x-archive-warning`.
fn batch_response(bundle: &Bundle, succeeded: usize, failed: usize, summary: ConvertSummary) -> Response {
    let Some(download) = bundle.primary().or_else(|| bundle.downloads.first()) else {
        return failure(
            StatusCode::UNPROCESSABLE_ENTITY,
            "no file could be converted".into(),
            Some(summary),
        );
    };

    let mut response = (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, download.mime_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", download.name.replace('"', "_")),
            ),
            (HeaderName::from_static("x-converted-count"), succeeded.to_string()),
            (HeaderName::from_static("x-failed-count"), failed.to_string()),
        ],
        download.bytes.clone(),
    )
        .into_response();

    if let Some(err) = &bundle.archive_error {
        log::warn!("Archive unavailable, returning {} only: {}", download.name, err);
        if let Ok(value) = HeaderValue::from_str(&err.to_string()) {
            response
                .headers_mut()
                .insert(HeaderName::from_static("x-archive-warning"), value);
        }
    }
    response
}

/// GET /history
pub async fn history(State(state): State<AppState>) -> Json<Vec<HistoryRecord>> {
    let converter = state.converter.lock().await;
    Json(converter.history_records())
}

/// DELETE /history
pub async fn clear_history(State(state): State<AppState>) -> Json<ApiResponse<Vec<Notification>>> {
    let converter = state.converter.lock().await;
    state.notifier.drain();
    converter.clear_history();
    let notes = state.notifier.drain();
    let success = converter.history_records().is_empty();
    Json(ApiResponse {
        success,
        data: Some(notes),
        error: None,
    })
}

/// GET /stats
pub async fn stats(State(state): State<AppState>) -> Json<StatsCounters> {
    let converter = state.converter.lock().await;
    Json(converter.stats_counters())
}
