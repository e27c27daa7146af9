//! Request handlers

use super::{error::ApiError, AppState};
use crate::{
    composite::BackgroundColor,
    config::OutputFormat,
    geometry::CropSettings,
    pipeline::{process_auto, process_manual, PipelineOptions, PipelineOutput, PipelineTimings},
    services::{ImageIOService, OutputFormatHandler},
    session::{ProcessedPhoto, SessionStoreStats},
    sheet::{render_sheet, tile_size, PaperSize},
    specs::{find_preset, presets, PhotoSpec, SizeChoice, DEFAULT_CUSTOM_SIDE, MAX_CUSTOM_SIDE, MIN_CUSTOM_SIDE},
};
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Multipart, Path, Query, State},
    http::header,
    response::{Html, IntoResponse, Response},
    Json,
};
use image::DynamicImage;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info, instrument};

const INDEX_HTML: &str = include_str!("index.html");

/// Multipart field carrying the upload
const UPLOAD_FIELD: &str = "image";

pub(super) async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

#[derive(Debug, Serialize)]
pub(super) struct HealthResponse {
    status: &'static str,
    version: &'static str,
    backend: String,
    model_available: bool,
    model_loaded: bool,
    face_detection: bool,
    sessions: SessionHealth,
}

#[derive(Debug, Serialize)]
pub(super) struct SessionHealth {
    active: usize,
    capacity: usize,
    hit_ratio: f64,
    #[serde(flatten)]
    counters: SessionStoreStats,
}

/// Never touches the processor lock, so it answers while inference runs
pub(super) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let counters = state.sessions.stats();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        backend: state.config.backend_type.to_string(),
        model_available: state.model_available,
        model_loaded: state.is_model_loaded(),
        face_detection: state.face_detector.is_some(),
        sessions: SessionHealth {
            active: state.sessions.len(),
            capacity: state.sessions.capacity(),
            hit_ratio: counters.hit_ratio(),
            counters,
        },
    })
}

#[derive(Debug, Serialize)]
pub(super) struct CustomSizeLimits {
    min: u32,
    max: u32,
    default: u32,
}

#[derive(Debug, Serialize)]
pub(super) struct SpecsResponse {
    specs: &'static [PhotoSpec],
    custom: CustomSizeLimits,
    papers: Vec<String>,
}

pub(super) async fn specs() -> Json<SpecsResponse> {
    Json(SpecsResponse {
        specs: presets(),
        custom: CustomSizeLimits {
            min: MIN_CUSTOM_SIDE,
            max: MAX_CUSTOM_SIDE,
            default: DEFAULT_CUSTOM_SIDE,
        },
        papers: PaperSize::all().iter().map(ToString::to_string).collect(),
    })
}

#[derive(Debug, Serialize)]
pub(super) struct UploadResponse {
    success: bool,
    session_id: String,
    width: u32,
    height: u32,
    preview: String,
}

#[instrument(skip_all)]
pub(super) async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        state.validator.check_filename(&filename)?;
        let data = field.bytes().await?;
        upload = Some((filename, data));
        break;
    }

    let (filename, data) = upload.ok_or_else(|| ApiError::bad_request("No image"))?;
    state.validator.check_size(data.len())?;

    let decode_bytes = data.clone();
    let (width, height) = tokio::task::spawn_blocking(move || {
        ImageIOService::load_from_bytes(&decode_bytes).map(|image| (image.width(), image.height()))
    })
    .await??;

    let preview = ImageIOService::preview_data_url(&data);
    let session_id = state.sessions.create(filename.clone(), data, (width, height))?;
    info!(%session_id, %filename, width, height, "Upload stored");

    Ok(Json(UploadResponse {
        success: true,
        session_id,
        width,
        height,
        preview,
    }))
}

#[derive(Debug, Deserialize)]
pub(super) struct SetSizeRequest {
    #[serde(default)]
    session_id: String,
    #[serde(default)]
    size: Option<String>,
    #[serde(default, deserialize_with = "lenient_dimension")]
    custom_width: Option<u32>,
    #[serde(default, deserialize_with = "lenient_dimension")]
    custom_height: Option<u32>,
}

#[derive(Debug, Serialize)]
pub(super) struct SetSizeResponse {
    success: bool,
    size: &'static str,
    width: Option<u32>,
    height: Option<u32>,
}

#[instrument(skip_all)]
pub(super) async fn set_size(
    State(state): State<AppState>,
    payload: Result<Json<SetSizeRequest>, JsonRejection>,
) -> Result<Json<SetSizeResponse>, ApiError> {
    let Json(request) = payload?;
    // Check the session first so a stale id reports as such
    state.sessions.update(&request.session_id, |_| ())?;

    let choice = parse_size(request.size.as_deref(), request.custom_width, request.custom_height)?;
    let target = choice.target_dimensions();
    let id = choice.id();
    state
        .sessions
        .update(&request.session_id, |session| session.size_choice = Some(choice))?;
    debug!(session_id = %request.session_id, size = id, "Size set");

    Ok(Json(SetSizeResponse {
        success: true,
        size: id,
        width: target.map(|t| t.0),
        height: target.map(|t| t.1),
    }))
}

#[derive(Debug, Deserialize)]
pub(super) struct SetCropRequest {
    #[serde(default)]
    session_id: String,
    #[serde(default)]
    crop_settings: Option<CropSettings>,
}

#[derive(Debug, Serialize)]
pub(super) struct SuccessResponse {
    success: bool,
}

#[instrument(skip_all)]
pub(super) async fn set_crop(
    State(state): State<AppState>,
    payload: Result<Json<SetCropRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let Json(request) = payload?;
    state.sessions.update(&request.session_id, |_| ())?;
    if let Some(crop) = &request.crop_settings {
        crop.validate()?;
    }
    state
        .sessions
        .update(&request.session_id, |session| session.crop = request.crop_settings)?;
    Ok(Json(SuccessResponse { success: true }))
}

#[derive(Debug, Deserialize)]
pub(super) struct RemoveBackgroundRequest {
    #[serde(default)]
    session_id: String,
    #[serde(default)]
    background_color: BackgroundColor,
    #[serde(default)]
    format: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct ProcessResponse {
    success: bool,
    image: String,
    width: u32,
    height: u32,
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    face_detected: Option<bool>,
    timings: PipelineTimings,
}

#[instrument(skip_all)]
pub(super) async fn remove_background(
    State(state): State<AppState>,
    payload: Result<Json<RemoveBackgroundRequest>, JsonRejection>,
) -> Result<Json<ProcessResponse>, ApiError> {
    let Json(request) = payload?;
    let session = state.sessions.get(&request.session_id)?;
    state.ensure_model_available()?;

    let options = state.pipeline_options(request.format.as_deref(), false)?;
    let size = session.effective_size();
    let spec_id = size.id();
    let background = request.background_color;
    let processor = state.processor.clone();

    let output = tokio::task::spawn_blocking(move || {
        process_manual(
            &session.original,
            &size,
            session.crop.as_ref(),
            background,
            &processor,
            &options,
        )
    })
    .await??;
    state.mark_model_loaded();

    Ok(Json(store_result(&state, &request.session_id, spec_id, output)?))
}

#[derive(Debug, Deserialize)]
pub(super) struct AutoProcessRequest {
    #[serde(default)]
    session_id: String,
    #[serde(default)]
    size: Option<String>,
    #[serde(default, deserialize_with = "lenient_dimension")]
    custom_width: Option<u32>,
    #[serde(default, deserialize_with = "lenient_dimension")]
    custom_height: Option<u32>,
    #[serde(default)]
    background_color: BackgroundColor,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    require_face: bool,
}

#[instrument(skip_all)]
pub(super) async fn auto_process(
    State(state): State<AppState>,
    payload: Result<Json<AutoProcessRequest>, JsonRejection>,
) -> Result<Json<ProcessResponse>, ApiError> {
    let Json(request) = payload?;
    let session = state.sessions.get(&request.session_id)?;

    let size = match request.size.as_deref() {
        Some(size) => {
            let choice = parse_size(Some(size), request.custom_width, request.custom_height)?;
            let stored = choice.clone();
            state
                .sessions
                .update(&request.session_id, |session| session.size_choice = Some(stored))?;
            choice
        },
        None => session.effective_size(),
    };
    state.ensure_model_available()?;

    let options = state.pipeline_options(request.format.as_deref(), request.require_face)?;
    let spec_id = size.id();
    let background = request.background_color;
    let processor = state.processor.clone();
    let detector = state.face_detector.clone();

    let output = tokio::task::spawn_blocking(move || {
        process_auto(
            &session.original,
            &size,
            background,
            &processor,
            detector.as_deref(),
            &options,
        )
    })
    .await??;
    state.mark_model_loaded();

    Ok(Json(store_result(&state, &request.session_id, spec_id, output)?))
}

/// Keep the output on the session and build the JSON reply
fn store_result(
    state: &AppState,
    session_id: &str,
    spec_id: &'static str,
    output: PipelineOutput,
) -> Result<ProcessResponse, ApiError> {
    let image = OutputFormatHandler::data_url(&output.bytes, output.format);
    let processed = ProcessedPhoto {
        bytes: Bytes::from(output.bytes),
        format: output.format,
        width: output.width,
        height: output.height,
        spec_id,
        face_detected: output.face_detected,
    };
    state
        .sessions
        .update(session_id, |session| session.processed = Some(processed))?;

    Ok(ProcessResponse {
        success: true,
        image,
        width: output.width,
        height: output.height,
        format: OutputFormatHandler::get_extension(output.format),
        face_detected: output.face_detected,
        timings: output.timings,
    })
}

#[instrument(skip(state))]
pub(super) async fn download(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, ApiError> {
    let (filename, processed) = processed_photo(&state, &session_id)?;
    let name = OutputFormatHandler::download_name(&filename, "_no_bg", processed.format);
    Ok(attachment(
        OutputFormatHandler::mime_type(processed.format),
        &name,
        processed.bytes,
    ))
}

#[derive(Debug, Deserialize)]
pub(super) struct SheetQuery {
    #[serde(default)]
    paper: Option<String>,
}

#[instrument(skip(state))]
pub(super) async fn download_sheet(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<SheetQuery>,
) -> Result<Response, ApiError> {
    let (filename, processed) = processed_photo(&state, &session_id)?;
    let paper = match query.paper.as_deref() {
        Some(paper) => paper.parse::<PaperSize>()?,
        None => PaperSize::default(),
    };
    let quality = state.config.jpeg_quality;

    let bytes = tokio::task::spawn_blocking(move || {
        let photo = ImageIOService::load_from_bytes(&processed.bytes)?;
        let tile = tile_size(find_preset(processed.spec_id), (processed.width, processed.height));
        let (sheet, layout) = render_sheet(&photo, tile, paper)?;
        info!(%paper, tiles = layout.count(), "Contact sheet rendered");
        OutputFormatHandler::encode(&DynamicImage::ImageRgb8(sheet), OutputFormat::Jpeg, quality)
    })
    .await??;

    let name = OutputFormatHandler::download_name(&filename, "_sheet", OutputFormat::Jpeg);
    Ok(attachment(
        OutputFormatHandler::mime_type(OutputFormat::Jpeg),
        &name,
        Bytes::from(bytes),
    ))
}

/// Filename and result of a processed session, 404 otherwise
fn processed_photo(state: &AppState, session_id: &str) -> Result<(String, ProcessedPhoto), ApiError> {
    let not_found = || ApiError::not_found("Not found");
    let session = state.sessions.get(session_id).map_err(|err| {
        debug!(%session_id, "Download lookup failed: {err}");
        not_found()
    })?;
    let processed = session.processed.ok_or_else(not_found)?;
    Ok((session.filename, processed))
}

fn attachment(mime: &str, filename: &str, bytes: Bytes) -> Response {
    (
        [
            (header::CONTENT_TYPE, mime.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response()
}

/// Missing size means the original dimensions
fn parse_size(size: Option<&str>, custom_width: Option<u32>, custom_height: Option<u32>) -> Result<SizeChoice, ApiError> {
    let size = size.filter(|s| !s.is_empty()).unwrap_or("original");
    SizeChoice::parse(size, custom_width, custom_height).map_err(ApiError::from)
}

/// Browsers send custom sizes as numbers, numeric strings or empty strings
fn lenient_dimension<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let number = match value {
        None | Some(serde_json::Value::Null) => return Ok(None),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| D::Error::custom(format!("invalid dimension '{s}'")))?,
        Some(serde_json::Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| D::Error::custom("invalid dimension"))?,
        Some(other) => return Err(D::Error::custom(format!("invalid dimension {other}"))),
    };

    if !number.is_finite() || number < 0.0 || number > f64::from(u32::MAX) {
        return Err(D::Error::custom(format!("invalid dimension {number}")));
    }
    Ok(Some(number.round() as u32))
}

impl AppState {
    fn ensure_model_available(&self) -> Result<(), ApiError> {
        if self.model_available {
            Ok(())
        } else {
            Err(ApiError::model_unavailable())
        }
    }

    fn pipeline_options(&self, format: Option<&str>, require_face: bool) -> Result<PipelineOptions, ApiError> {
        let format = format
            .filter(|f| !f.is_empty())
            .map(str::parse::<OutputFormat>)
            .transpose()?;
        Ok(PipelineOptions {
            format,
            jpeg_quality: self.config.jpeg_quality,
            require_face,
        })
    }
}
