#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path as UrlPath, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use sha2::{Digest, Sha256};
use tokio::net::TcpListener;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use jarsmith::core::classfile::ClassFile;
use jarsmith::core::jar::JarConfiguration;
use jarsmith::core::version::ManifestSource;
use jarsmith::PipelineConfig;

#[derive(Clone, Default)]
struct Files {
    bodies: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    hits: Arc<AtomicUsize>,
}

async fn serve_file(State(files): State<Files>, UrlPath(path): UrlPath<String>) -> Response {
    files.hits.fetch_add(1, Ordering::SeqCst);
    let body = files.bodies.lock().unwrap().get(&format!("/{}", path)).cloned();
    match body {
        Some(body) => body.into_response(),
        None => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}

/// Serves in-memory bodies by path and counts requests.
pub struct FileServer {
    pub base_url: String,
    files: Files,
}

impl FileServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let files = Files::default();

        let app = Router::new()
            .route("/{*path}", get(serve_file))
            .with_state(files.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, files }
    }

    pub fn serve(&self, path: &str, body: Vec<u8>) -> String {
        self.files.bodies.lock().unwrap().insert(path.to_string(), body);
        self.url(path)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn hits(&self) -> usize {
        self.files.hits.load(Ordering::SeqCst)
    }

    pub fn source(&self) -> ManifestSource {
        self.source_at("test", "/versions.json", 0)
    }

    pub fn source_at(&self, name: &str, path: &str, priority: i32) -> ManifestSource {
        ManifestSource {
            name: name.into(),
            url: self.url(path),
            priority,
        }
    }
}

pub fn sha256(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn jar_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, bytes) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn class_bytes(name: &str, access: u16) -> Vec<u8> {
    let mut class = ClassFile::new_class(name, Some("java/lang/Object")).unwrap();
    class.access = access;
    class.to_bytes().unwrap()
}

pub fn read_entry(jar: &Path, name: &str) -> Option<Vec<u8>> {
    jarsmith::core::archive::read_entry(jar, name).unwrap()
}

/// A manifest listing version `1.0` with whichever sides are given as
/// `(url, sha256)`.
pub fn manifest(client: Option<(&str, &str)>, server: Option<(&str, &str)>) -> Vec<u8> {
    let side = |s: Option<(&str, &str)>| {
        s.map(|(url, sha)| serde_json::json!({ "url": url, "sha256": sha }))
    };
    serde_json::to_vec(&serde_json::json!({
        "versions": [{ "id": "1.0", "client": side(client), "server": side(server) }]
    }))
    .unwrap()
}

pub fn config(root: &Path, server: &FileServer, jars: JarConfiguration) -> PipelineConfig {
    let mut config = PipelineConfig::new("1.0", vec![server.source()]);
    config.jar_configuration = jars;
    config.user_cache = root.join("cache");
    config.project_root = root.join("project");
    config
}

pub fn global_repo(root: &Path) -> PathBuf {
    root.join("cache").join("repo")
}
