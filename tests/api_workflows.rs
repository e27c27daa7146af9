//! HTTP workflow tests
//!
//! Drive the router in-process with `oneshot`, using the mock segmentation
//! backend and a scripted face detector so no model files are needed.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
use ndarray::Array4;
use passport_photo::{
    backends::MockBackend,
    models::{ModelInfo, PreprocessingConfig},
    router, AppState, BackendType, BackgroundRemovalProcessor, FaceBounds, FaceDetector,
    InferenceBackend, ProcessorConfig, ServerConfig,
};
use serde_json::{json, Value};
use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceExt;

const BOUNDARY: &str = "passport-photo-test-boundary";

/// Detector that reports one fixed face regardless of the pixels
struct FixedFace(FaceBounds);

impl FaceDetector for FixedFace {
    fn detect(&self, _gray: &[u8], _width: u32, _height: u32) -> Vec<FaceBounds> {
        vec![self.0]
    }
}

/// Mock matte that takes a while, like a real model on CPU
struct SlowBackend {
    inner: MockBackend,
    delay: Duration,
}

impl InferenceBackend for SlowBackend {
    fn initialize(
        &mut self,
        config: &ProcessorConfig,
    ) -> passport_photo::Result<Option<Duration>> {
        self.inner.initialize(config)
    }

    fn infer(&mut self, input: &Array4<f32>) -> passport_photo::Result<Array4<f32>> {
        std::thread::sleep(self.delay);
        self.inner.infer(input)
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        self.inner.input_shape()
    }

    fn output_shape(&self) -> (usize, usize, usize, usize) {
        self.inner.output_shape()
    }

    fn get_preprocessing_config(&self) -> passport_photo::Result<PreprocessingConfig> {
        self.inner.get_preprocessing_config()
    }

    fn get_model_info(&self) -> passport_photo::Result<ModelInfo> {
        self.inner.get_model_info()
    }

    fn is_initialized(&self) -> bool {
        self.inner.is_initialized()
    }
}

struct NoFaces;

impl FaceDetector for NoFaces {
    fn detect(&self, _gray: &[u8], _width: u32, _height: u32) -> Vec<FaceBounds> {
        Vec::new()
    }
}

fn test_config() -> ServerConfig {
    ServerConfig::builder()
        .host("127.0.0.1")
        .backend_type(BackendType::Mock)
        .build()
        .unwrap()
}

fn mock_state(config: ServerConfig, detector: Option<Arc<dyn FaceDetector>>) -> AppState {
    let processor = BackgroundRemovalProcessor::with_backend(
        config.processor_config(),
        Box::new(MockBackend::new()),
    );
    AppState::new(config, processor, detector)
}

fn mock_app() -> Router {
    router(mock_state(test_config(), None))
}

/// A portrait-ish test image: gray backdrop with a darker centered block
fn portrait_png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        let inside = x > width / 4 && x < width * 3 / 4 && y > height / 5;
        if inside {
            Rgb([90, 60, 40])
        } else {
            Rgb([180, 190, 200])
        }
    });
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

fn multipart_body(field: &str, filename: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(field: &str, filename: &str, data: &[u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(field, filename, data)))
        .unwrap()
}

fn json_request(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, request).await;
    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, value)
}

async fn upload(app: &Router, width: u32, height: u32) -> String {
    let (status, body) =
        send_json(app, upload_request("image", "portrait.png", &portrait_png(width, height))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["session_id"].as_str().unwrap().to_string()
}

fn decode_data_url(url: &str) -> DynamicImage {
    use base64::Engine;
    let (_, payload) = url.split_once(";base64,").unwrap();
    let bytes = base64::engine::general_purpose::STANDARD.decode(payload).unwrap();
    image::load_from_memory(&bytes).unwrap()
}

#[tokio::test]
async fn test_index_and_health() {
    let app = mock_app();

    let (status, body) = send(&app, get_request("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("<html"));

    let (status, health) = send_json(&app, get_request("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "ok");
    assert_eq!(health["model_available"], true);
    assert_eq!(health["model_loaded"], false);
    assert_eq!(health["face_detection"], false);
    assert_eq!(health["sessions"]["active"], 0);
}

#[tokio::test]
async fn test_specs_listing() {
    let (status, specs) = send_json(&mock_app(), get_request("/specs")).await;
    assert_eq!(status, StatusCode::OK);

    let ids: Vec<&str> = specs["specs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|spec| spec["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"passport_us"));
    assert!(ids.contains(&"passport_eu"));
    assert_eq!(specs["custom"]["min"], 50);
    assert_eq!(specs["custom"]["max"], 5000);
    assert!(specs["papers"].as_array().unwrap().contains(&json!("4x6")));
}

#[tokio::test]
async fn test_upload_returns_session_and_preview() {
    let app = mock_app();
    let (status, body) =
        send_json(&app, upload_request("image", "me.png", &portrait_png(320, 400))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["width"], 320);
    assert_eq!(body["height"], 400);
    assert!(body["preview"].as_str().unwrap().starts_with("data:image/png;base64,"));
    assert!(!body["session_id"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_rejections() {
    let app = mock_app();
    let png = portrait_png(64, 64);

    let (status, body) = send_json(&app, upload_request("photo", "me.png", &png)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No image");

    let (status, body) = send_json(&app, upload_request("image", "", &png)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No file");

    let (status, body) = send_json(&app, upload_request("image", "me.gif", &png)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid format");

    let (status, _) = send_json(&app, upload_request("image", "me.png", b"not an image")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_too_large() {
    let config = ServerConfig::builder()
        .host("127.0.0.1")
        .backend_type(BackendType::Mock)
        .max_upload_bytes(1024)
        .build()
        .unwrap();
    let app = router(mock_state(config, None));

    let (status, body) =
        send_json(&app, upload_request("image", "big.png", &vec![0u8; 4096])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "File too large");
}

#[tokio::test]
async fn test_body_over_limit_keeps_upload_message() {
    let config = ServerConfig::builder()
        .host("127.0.0.1")
        .backend_type(BackendType::Mock)
        .max_upload_bytes(1024)
        .build()
        .unwrap();
    let body_limit = config.body_limit();
    let app = router(mock_state(config, None));

    let (status, body) = send_json(
        &app,
        upload_request("image", "huge.png", &vec![0u8; body_limit + 64 * 1024]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "File too large");
}

#[tokio::test]
async fn test_manual_workflow_with_preset() {
    let app = mock_app();
    let session_id = upload(&app, 800, 1000).await;

    let (status, body) = send_json(
        &app,
        json_request("/set-size", &json!({"session_id": session_id, "size": "passport_eu"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["size"], "passport_eu");
    assert_eq!(body["width"], 413);
    assert_eq!(body["height"], 531);

    let crop = json!({"scale": 0.5, "offsetX": -20, "offsetY": -10, "canvasW": 400, "canvasH": 400});
    let (status, _) = send_json(
        &app,
        json_request("/set-crop", &json!({"session_id": session_id, "crop_settings": crop})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send_json(
        &app,
        json_request(
            "/remove-background",
            &json!({"session_id": session_id, "background_color": "#ffffff"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["format"], "jpg");
    assert!(body["image"].as_str().unwrap().starts_with("data:image/jpeg;base64,"));
    let photo = decode_data_url(body["image"].as_str().unwrap());
    assert_eq!(photo.dimensions(), (413, 531));

    let response = app
        .clone()
        .oneshot(get_request(&format!("/download/{session_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"portrait_no_bg.jpg\""
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let downloaded = image::load_from_memory(&bytes).unwrap();
    assert_eq!(downloaded.dimensions(), (413, 531));
}

#[tokio::test]
async fn test_transparent_background_is_png_with_alpha() {
    let app = mock_app();
    let session_id = upload(&app, 300, 300).await;

    let (status, body) = send_json(
        &app,
        json_request(
            "/remove-background",
            &json!({"session_id": session_id, "background_color": null, "format": "jpeg"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["format"], "png");

    let photo = decode_data_url(body["image"].as_str().unwrap()).to_rgba8();
    // No size set: original dimensions
    assert_eq!(photo.dimensions(), (300, 300));
    // Mock matte is an ellipse, so the corner is background
    assert_eq!(photo.get_pixel(0, 0)[3], 0);
    assert_eq!(photo.get_pixel(150, 150)[3], 255);
}

#[tokio::test]
async fn test_custom_size_from_browser_strings() {
    let app = mock_app();
    let session_id = upload(&app, 500, 500).await;

    let (status, body) = send_json(
        &app,
        json_request(
            "/set-size",
            &json!({
                "session_id": session_id,
                "size": "custom",
                "custom_width": "250",
                "custom_height": ""
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["width"], 250);
    assert_eq!(body["height"], 400);

    let (status, body) = send_json(
        &app,
        json_request(
            "/set-size",
            &json!({"session_id": session_id, "size": "custom", "custom_width": 9000}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("between"));
}

#[tokio::test]
async fn test_invalid_session_everywhere() {
    let app = mock_app();
    let unknown = json!({"session_id": "does-not-exist", "size": "passport_us"});

    for uri in ["/set-size", "/set-crop", "/remove-background", "/auto-process"] {
        let (status, body) = send_json(&app, json_request(uri, &unknown)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["error"], "Invalid session", "{uri}");
    }

    let (status, body) = send_json(&app, get_request("/download/does-not-exist")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not found");
}

#[tokio::test]
async fn test_download_before_processing_is_not_found() {
    let app = mock_app();
    let session_id = upload(&app, 100, 100).await;

    let (status, body) = send_json(&app, get_request(&format!("/download/{session_id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not found");

    let (status, _) = send_json(&app, get_request(&format!("/download-sheet/{session_id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_crop_rejected() {
    let app = mock_app();
    let session_id = upload(&app, 100, 100).await;

    let crop = json!({"scale": 0, "offsetX": 0, "offsetY": 0, "canvasW": 400, "canvasH": 400});
    let (status, _) = send_json(
        &app,
        json_request("/set-crop", &json!({"session_id": session_id, "crop_settings": crop})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let request = Request::builder()
        .method("POST")
        .uri("/set-size")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send_json(&mock_app(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_model_unavailable_is_503() {
    let config = ServerConfig::builder()
        .host("127.0.0.1")
        .backend_type(BackendType::Tract)
        .build()
        .unwrap();
    let processor = BackgroundRemovalProcessor::new(
        ProcessorConfig::builder().backend_type(BackendType::Tract).build(),
    );
    let app = router(AppState::new(config, processor, None));
    let session_id = upload(&app, 64, 64).await;

    let (status, body) = send_json(
        &app,
        json_request("/remove-background", &json!({"session_id": session_id})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Model not available");

    let (_, health) = send_json(&app, get_request("/health")).await;
    assert_eq!(health["model_available"], false);
}

#[tokio::test]
async fn test_auto_process_frames_detected_face() {
    let face = FaceBounds {
        x: 300.0,
        y: 250.0,
        width: 200.0,
        height: 240.0,
        confidence: 9.0,
    };
    let app = router(mock_state(test_config(), Some(Arc::new(FixedFace(face)))));
    let session_id = upload(&app, 800, 1000).await;

    let (status, body) = send_json(
        &app,
        json_request(
            "/auto-process",
            &json!({"session_id": session_id, "size": "passport_us", "background_color": "#f0f0f0"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["face_detected"], true);
    assert_eq!(body["width"], 600);
    assert_eq!(body["height"], 600);

    let response = app
        .clone()
        .oneshot(get_request(&format!("/download/{session_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_auto_process_without_face() {
    let app = router(mock_state(test_config(), Some(Arc::new(NoFaces))));
    let session_id = upload(&app, 400, 300).await;

    let (status, body) = send_json(
        &app,
        json_request(
            "/auto-process",
            &json!({"session_id": session_id, "size": "linkedin"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["face_detected"], false);
    assert_eq!(body["width"], 400);
    assert_eq!(body["height"], 400);

    let (status, _) = send_json(
        &app,
        json_request(
            "/auto-process",
            &json!({"session_id": session_id, "size": "linkedin", "require_face": true}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_print_sheet_download() {
    let app = mock_app();
    let session_id = upload(&app, 800, 1000).await;

    send_json(
        &app,
        json_request("/set-size", &json!({"session_id": session_id, "size": "passport_eu"})),
    )
    .await;
    let (status, _) = send_json(
        &app,
        json_request("/remove-background", &json!({"session_id": session_id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get_request(&format!("/download-sheet/{session_id}?paper=4x6")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"portrait_sheet.jpg\""
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let sheet = image::load_from_memory(&bytes).unwrap();
    assert_eq!(sheet.dimensions(), (1800, 1200));

    let (status, body) = send_json(
        &app,
        get_request(&format!("/download-sheet/{session_id}?paper=legal")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("legal"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_health_answers_during_inference() {
    let config = test_config();
    let processor = BackgroundRemovalProcessor::with_backend(
        config.processor_config(),
        Box::new(SlowBackend {
            inner: MockBackend::new(),
            delay: Duration::from_millis(1500),
        }),
    );
    let app = router(AppState::new(config, processor, None));
    let session_id = upload(&app, 200, 200).await;

    let (_, health) = send_json(&app, get_request("/health")).await;
    assert_eq!(health["model_loaded"], false);

    let background = {
        let app = app.clone();
        let session_id = session_id.clone();
        tokio::spawn(async move {
            send_json(
                &app,
                json_request("/remove-background", &json!({"session_id": session_id})),
            )
            .await
        })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    let (status, health) = send_json(&app, get_request("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(
        started.elapsed() < Duration::from_millis(500),
        "health waited {:?}",
        started.elapsed()
    );
    assert_eq!(health["model_available"], true);

    let (status, _) = background.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    let (_, health) = send_json(&app, get_request("/health")).await;
    assert_eq!(health["model_loaded"], true);
}

#[tokio::test]
async fn test_health_reports_session_counters() {
    let app = mock_app();
    let session_id = upload(&app, 64, 64).await;
    send_json(
        &app,
        json_request("/set-crop", &json!({"session_id": session_id, "crop_settings": null})),
    )
    .await;
    send_json(
        &app,
        json_request("/set-crop", &json!({"session_id": "gone", "crop_settings": null})),
    )
    .await;

    let (_, health) = send_json(&app, get_request("/health")).await;
    let sessions = &health["sessions"];
    assert_eq!(sessions["active"], 1);
    assert_eq!(sessions["capacity"], 256);
    assert_eq!(sessions["created"], 1);
    assert!(sessions["hits"].as_u64().unwrap() >= 1);
    assert_eq!(sessions["misses"], 1);
}
