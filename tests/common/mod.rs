#![allow(dead_code)]

use auto_uploader::config::{StabilitySettings, TransferSettings, WatchOptions, HOME_ENV};
use auto_uploader::events::{EventReceiver, UploadEvent, UploadEventPayload};
use futures::TryStreamExt;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tempfile::TempDir;
use warp::http::StatusCode;
use warp::multipart::{FormData, Part};
use warp::{Buf, Filter};

/// One multipart request as the endpoint saw it
#[derive(Debug, Clone, Default)]
pub struct RecordedUpload {
    pub field_order: Vec<String>,
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
    pub token: Option<String>,
    pub path: Option<String>,
}

pub struct MockEndpoint {
    pub url: String,
    requests: Arc<Mutex<Vec<RecordedUpload>>>,
}

impl MockEndpoint {
    /// Replies with `statuses` in order, then 200 forever
    pub fn spawn(statuses: Vec<u16>) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let script = Arc::new(Mutex::new(VecDeque::from(statuses)));

        let recorded = Arc::clone(&requests);
        let route = warp::post()
            .and(warp::path("upload"))
            .and(warp::multipart::form().max_length(16 * 1024 * 1024))
            .and_then(move |form: FormData| {
                let recorded = Arc::clone(&recorded);
                let script = Arc::clone(&script);
                async move {
                    let upload = record(form).await;
                    recorded.lock().unwrap().push(upload);

                    let status = script.lock().unwrap().pop_front().unwrap_or(200);
                    let status = StatusCode::from_u16(status).unwrap();
                    Ok::<_, warp::Rejection>(warp::reply::with_status("ok", status))
                }
            });

        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        Self {
            url: format!("http://{}/upload", addr),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<RecordedUpload> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

async fn record(form: FormData) -> RecordedUpload {
    let mut upload = RecordedUpload::default();
    let parts: Vec<Part> = form.try_collect().await.unwrap_or_default();

    for part in parts {
        let name = part.name().to_string();
        let file_name = part.filename().map(|f| f.to_string());
        let data = read_part(part).await;

        upload.field_order.push(name.clone());
        match name.as_str() {
            "file" => {
                upload.file_name = file_name;
                upload.bytes = data;
            }
            "token" => upload.token = Some(String::from_utf8_lossy(&data).into_owned()),
            "path" => upload.path = Some(String::from_utf8_lossy(&data).into_owned()),
            _ => {}
        }
    }

    upload
}

async fn read_part(part: Part) -> Vec<u8> {
    part.stream()
        .try_fold(Vec::new(), |mut acc, mut buf| async move {
            while buf.has_remaining() {
                let chunk = buf.chunk();
                let len = chunk.len();
                acc.extend_from_slice(chunk);
                buf.advance(len);
            }
            Ok(acc)
        })
        .await
        .unwrap_or_default()
}

/// Point the config/log directory at a scratch location shared by the test binary
pub fn isolate_home() {
    static HOME: OnceLock<TempDir> = OnceLock::new();
    let home = HOME.get_or_init(|| tempfile::tempdir().unwrap());
    std::env::set_var(HOME_ENV, home.path());
}

/// Short sampling and retry delays so scenarios finish quickly
pub fn fast_options() -> WatchOptions {
    WatchOptions {
        stability: StabilitySettings {
            interval_ms: 100,
            max_attempts: 20,
            fallback_delay_ms: 200,
        },
        transfer: TransferSettings {
            connect_timeout_secs: 5,
            read_timeout_secs: 10,
            retry_delay_ms: 50,
        },
        ..WatchOptions::default()
    }
}

/// Next terminal upload outcome on the bus
pub async fn next_outcome(rx: &mut EventReceiver) -> UploadEvent {
    tokio::time::timeout(Duration::from_secs(15), async {
        loop {
            let event = rx.recv().await.expect("event bus closed");
            if matches!(
                event.payload,
                UploadEventPayload::UploadSucceeded { .. } | UploadEventPayload::UploadFailed { .. }
            ) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for an upload outcome")
}
