use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::ViewerConfig;
use crate::domain::{FetchError, UploadError, UploadSummary, ViewerError};
use crate::record::Record;

/// Http access to the record service.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &ViewerConfig) -> Result<Self, ViewerError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn fetch_records(&self) -> Result<Vec<Record>, FetchError> {
        let start_time = Instant::now();
        let url = format!("{}/records", self.base_url);
        debug!("GET {url}");
        let res = self.http.get(&url).send().await?;
        if !res.status().is_success() {
            return Err(FetchError::Status(res.status().as_u16()));
        }
        let elements: Vec<Value> = res.json().await?;
        let records: Vec<Record> = elements.into_iter().map(Record::from_value).collect();
        info!(
            "Fetched {} records in {}ms",
            records.len(),
            start_time.elapsed().as_millis()
        );
        Ok(records)
    }

    pub async fn upload(&self, path: &Path) -> Result<UploadSummary, UploadError> {
        if path.as_os_str().is_empty() {
            return Err(UploadError::NoFileSelected);
        }
        let content = tokio::fs::read(path)
            .await
            .map_err(|source| UploadError::Unreadable {
                path: path.to_path_buf(),
                source,
            })?;
        let file_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("upload")
            .to_string();
        let size = content.len();

        let form = Form::new().part("file", Part::bytes(content).file_name(file_name));
        let url = format!("{}/upload", self.base_url);
        debug!("POST {url} ({size} bytes)");

        let res = self.http.post(&url).multipart(form).send().await?;
        if !res.status().is_success() {
            return Err(UploadError::Status(res.status().as_u16()));
        }
        let summary: UploadSummary = res.json().await?;
        info!(
            "Upload of {} processed {} records, stored {}",
            path.display(),
            summary.records_processed,
            summary.records_stored
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        extract::Multipart,
        http::StatusCode,
        routing::{get, post},
    };
    use serde_json::{Value, json};
    use tokio::net::TcpListener;

    async fn serve(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/api")
    }

    fn client(base_url: String) -> ApiClient {
        ApiClient::new(&ViewerConfig::default().base_url(base_url)).unwrap()
    }

    async fn records() -> Json<Value> {
        Json(json!([
            {"id": 1, "mnc": 310, "bytes_used": 50, "dmcc": "x", "cellid": 3, "ip": "10.0.0.1"},
            {"id": 2, "mnc": null, "bytes_used": null, "dmcc": null, "cellid": null, "ip": null},
        ]))
    }

    async fn upload(mut multipart: Multipart) -> (StatusCode, Json<Value>) {
        while let Some(field) = multipart.next_field().await.unwrap() {
            if field.name() == Some("file") {
                let filename = field.file_name().map(|s| s.to_string());
                let body = field.text().await.unwrap();
                let lines = body.lines().filter(|l| !l.trim().is_empty()).count();
                return (
                    StatusCode::OK,
                    Json(json!({
                        "message": "File processed successfully",
                        "records_processed": lines,
                        "records_stored": lines - 1,
                        "filename": filename,
                    })),
                );
            }
        }
        (StatusCode::BAD_REQUEST, Json(json!({"detail": "no file"})))
    }

    #[tokio::test]
    async fn fetches_records() {
        let base = serve(Router::new().route("/api/records", get(records))).await;
        let records = client(base).fetch_records().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].text(crate::record::Field::Ip).as_deref(), Some("10.0.0.1"));
        assert_eq!(records[1].bytes_used, None);
    }

    #[tokio::test]
    async fn malformed_elements_do_not_fail_the_fetch() {
        let base = serve(Router::new().route(
            "/api/records",
            get(|| async { Json(json!([{"id": 1, "ip": "10.0.0.1"}, {"ip": "10.0.0.2"}, 42])) }),
        ))
        .await;
        let records = client(base).fetch_records().await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].get(crate::record::Field::Id), None);
        assert_eq!(records[1].text(crate::record::Field::Ip).as_deref(), Some("10.0.0.2"));
        assert_eq!(records[2], Record::default());
    }

    #[tokio::test]
    async fn non_success_status_is_a_fetch_error() {
        let base = serve(Router::new().route(
            "/api/records",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        ))
        .await;
        let err = client(base).fetch_records().await.unwrap_err();
        assert!(matches!(err, FetchError::Status(500)));
        assert_eq!(err.to_string(), "HTTP error! status: 500");
    }

    #[tokio::test]
    async fn unreachable_service_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = client(format!("http://{addr}/api"))
            .fetch_records()
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
    }

    #[tokio::test]
    async fn uploads_file_as_multipart() {
        let base = serve(Router::new().route("/api/upload", post(upload))).await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cdr.txt");
        std::fs::write(&path, "1|a\n2|b\n\n3|c\n").unwrap();

        let summary = client(base).upload(&path).await.unwrap();
        assert_eq!(summary.records_processed, 3);
        assert_eq!(summary.records_stored, 2);
        assert_eq!(summary.filename.as_deref(), Some("cdr.txt"));
    }

    #[tokio::test]
    async fn upload_errors() {
        let base = serve(Router::new().route(
            "/api/upload",
            post(|| async { StatusCode::UNPROCESSABLE_ENTITY }),
        ))
        .await;
        let client = client(base);

        let err = client.upload(Path::new("")).await.unwrap_err();
        assert!(matches!(err, UploadError::NoFileSelected));

        let err = client
            .upload(Path::new("/definitely/not/here.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Unreadable { .. }));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cdr.txt");
        std::fs::write(&path, "1|a\n").unwrap();
        let err = client.upload(&path).await.unwrap_err();
        assert_eq!(err.to_string(), "Upload failed: 422");
    }
}
