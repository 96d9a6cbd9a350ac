//! Test Helper Utilities
//!
//! Shared utilities for testing tonemill-server
#![allow(dead_code)]

pub mod audio_generator;
pub mod fakes;

pub use audio_generator::{generate_test_wav, wav_bytes, AudioConfig};
pub use fakes::{fake_model, note, Behaviour, FakeTranscriber};

use axum::body::Body;
use axum::http::{header, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tonemill_common::ServiceConfig;
use tonemill_server::model::ModelHandle;
use tonemill_server::{build_router, AppState};

pub const BOUNDARY: &str = "tonemill-test-boundary";

/// Router plus the private temp directory it writes uploads to
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub temp_dir: TempDir,
}

impl TestApp {
    pub fn new(model: ModelHandle) -> Self {
        Self::with_config(model, |_| {})
    }

    pub fn with_config(model: ModelHandle, adjust: impl FnOnce(&mut ServiceConfig)) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let mut config = ServiceConfig {
            temp_dir: Some(temp_dir.path().to_path_buf()),
            ..ServiceConfig::default()
        };
        adjust(&mut config);

        let state = AppState::new(config, model);
        let router = build_router(state.clone());
        Self {
            router,
            state,
            temp_dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        use tower::ServiceExt;
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub fn temp_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.temp_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }
}

/// Path to the shipped pitch tracker artifact
pub fn model_artifact() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("models")
        .join("pitch-tracker.toml")
}

/// One multipart part
pub struct Part<'a> {
    pub name: &'a str,
    pub filename: Option<&'a str>,
    pub content: &'a [u8],
}

impl<'a> Part<'a> {
    pub fn file(filename: &'a str, content: &'a [u8]) -> Self {
        Self {
            name: "file",
            filename: Some(filename),
            content,
        }
    }

    pub fn text(name: &'a str, value: &'a str) -> Self {
        Self {
            name,
            filename: None,
            content: value.as_bytes(),
        }
    }
}

pub fn multipart_body(parts: &[Part]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part.filename {
            Some(filename) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        part.name, filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(b"Content-Type: application/octet-stream\r\n");
            }
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n", part.name).as_bytes(),
            ),
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(part.content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn convert_request(parts: &[Part]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/convert")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

pub fn upload(filename: &str, content: &[u8]) -> Request<Body> {
    convert_request(&[Part::file(filename, content)])
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
