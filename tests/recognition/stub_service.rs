// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! In-process recognition service with a scripted response per call

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use fleet_vision_capture::vision::{
    ImagePreprocessor, NormalizeOptions, NormalizedImage, RawFrame,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the stub answers for one call
#[derive(Clone)]
pub enum Reply {
    Json(u16, Value),
    Text(u16, &'static str),
}

impl Reply {
    pub fn ok(confidence: f64) -> Self {
        Reply::Json(
            200,
            json!({
                "data": {"reading": 48213, "unit": "km"},
                "confidence": confidence,
                "processingTimeMs": 42,
                "id": "resp-1"
            }),
        )
    }

    pub fn status(code: u16) -> Self {
        Reply::Text(code, "service busy")
    }
}

struct Script {
    replies: Vec<Reply>,
    delay: Duration,
    calls: AtomicUsize,
    last_request: Mutex<Option<Value>>,
}

pub struct StubService {
    pub endpoint: String,
    script: Arc<Script>,
}

impl StubService {
    /// Serve `replies` in order on 127.0.0.1, repeating the last one
    pub async fn start(replies: Vec<Reply>) -> Self {
        Self::start_with_delay(replies, Duration::ZERO).await
    }

    pub async fn start_with_delay(replies: Vec<Reply>, delay: Duration) -> Self {
        let script = Arc::new(Script {
            replies,
            delay,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        });
        let app = Router::new()
            .route("/v1/recognize", post(recognize))
            .route("/health", get(|| async { "ok" }))
            .with_state(script.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            endpoint: format!("http://{}", addr),
            script,
        }
    }

    pub fn calls(&self) -> usize {
        self.script.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<Value> {
        self.script.last_request.lock().unwrap().clone()
    }
}

async fn recognize(State(script): State<Arc<Script>>, Json(body): Json<Value>) -> Response {
    let call = script.calls.fetch_add(1, Ordering::SeqCst);
    *script.last_request.lock().unwrap() = Some(body);
    if !script.delay.is_zero() {
        tokio::time::sleep(script.delay).await;
    }

    let reply = script
        .replies
        .get(call)
        .or_else(|| script.replies.last())
        .cloned()
        .unwrap_or_else(|| Reply::status(500));
    match reply {
        Reply::Json(code, value) => (status(code), Json(value)).into_response(),
        Reply::Text(code, text) => (status(code), text).into_response(),
    }
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap()
}

pub fn sample_image() -> NormalizedImage {
    let img = image::RgbImage::from_fn(32, 24, |x, y| image::Rgb([x as u8 * 8, y as u8 * 10, 90]));
    let mut png = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();
    ImagePreprocessor::inline()
        .normalize_blocking(
            RawFrame::from_upload(png, "image/png"),
            &NormalizeOptions::default(),
        )
        .unwrap()
}
