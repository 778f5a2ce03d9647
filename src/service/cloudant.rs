use crate::config::{cloudant_credentials, cloudant_db_name, CloudantCredentials};
use crate::models::StoredDocument;
use crate::util::sleep_ms;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use worker::{console_error, console_log, Env, Fetch, Headers, Method, Request, RequestInit, Response};

/// 429 を受けたときの最大リトライ回数
const MAX_RETRIES: u32 = 10;
const RETRY_FALLBACK_SECONDS: u64 = 1;

/// Cloudant (CouchDB) の 1 データベースへの HTTP クライアント
pub struct Cloudant {
    base_url: String,
    db_name: String,
    authorization: String,
}

#[derive(Error, Debug)]
pub enum CloudantError {
    #[error("Cloudant request failed with status {status}: {body}")]
    HttpError { status: u16, body: String },
    #[error("Cloudant still rate limited after {0} retries")]
    RateLimited(u32),
    #[error("Cloudant deleted {deleted} documents but failed on {failed:?}")]
    PartialDelete { deleted: usize, failed: Vec<String> },
    #[error("JSON serialization failed: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Worker error: {0}")]
    WorkerError(#[from] worker::Error),
}

#[derive(Deserialize, Debug)]
struct AllDocsResponse {
    rows: Vec<AllDocsRow>,
}

#[derive(Deserialize, Debug)]
struct AllDocsRow {
    id: String,
    #[serde(default)]
    doc: Option<Value>,
}

#[derive(Deserialize, Debug)]
struct CreateResponse {
    id: String,
}

#[derive(Deserialize, Debug)]
struct BulkResult {
    id: String,
    #[serde(default)]
    ok: Option<bool>,
    #[serde(default)]
    error: Option<String>,
}

impl Cloudant {
    pub fn new<T: Into<String>>(credentials: &CloudantCredentials, db_name: T) -> Self {
        Self {
            base_url: credentials.base_url(),
            db_name: db_name.into(),
            authorization: basic_authorization(&credentials.username, &credentials.password),
        }
    }

    pub fn new_from_env(env: &Env) -> Option<Self> {
        let credentials = cloudant_credentials(env)?;
        Some(Self::new(&credentials, cloudant_db_name(env)))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}{}", self.base_url, self.db_name, path)
    }

    /// リクエストを送る。429 は Retry-After に従って待ってから再送する
    async fn send(
        &self,
        method: Method,
        url: &str,
        payload: Option<&Value>,
    ) -> Result<Response, CloudantError> {
        let mut retries = 0;
        loop {
            let mut init = RequestInit::new();
            init.with_method(method.clone());
            if let Some(payload) = payload {
                init.with_body(Some(payload.to_string().into()));
            }

            let headers = Headers::new();
            headers.set("Authorization", &self.authorization)?;
            headers.set("Accept", "application/json")?;
            if payload.is_some() {
                headers.set("Content-Type", "application/json")?;
            }
            init.with_headers(headers);

            let request = Request::new_with_init(url, &init)?;
            let response = Fetch::Request(request).send().await?;

            if response.status_code() != 429 {
                return Ok(response);
            }
            if retries >= MAX_RETRIES {
                return Err(CloudantError::RateLimited(retries));
            }
            retries += 1;

            let retry_seconds = response
                .headers()
                .get("Retry-After")
                .ok()
                .flatten()
                .and_then(|v| parse_retry_after(&v))
                .unwrap_or(RETRY_FALLBACK_SECONDS);
            console_log!(
                "Cloudant rate limited. Retry {}/{} after {} seconds",
                retries,
                MAX_RETRIES,
                retry_seconds
            );
            sleep_ms(retry_seconds * 1000).await;
        }
    }

    async fn check(mut response: Response, accepted: &[u16]) -> Result<Response, CloudantError> {
        let status = response.status_code();
        if (200..300).contains(&status) || accepted.contains(&status) {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(CloudantError::HttpError { status, body })
    }

    /// データベースが無ければ作る (既存なら 412 が返る)
    pub async fn ensure_database(&self) -> Result<(), CloudantError> {
        let response = self.send(Method::Put, &self.url(""), None).await?;
        Self::check(response, &[412]).await?;
        Ok(())
    }

    pub async fn create_document(&self, document: &Value) -> Result<String, CloudantError> {
        let response = self.send(Method::Post, &self.url(""), Some(document)).await?;
        let mut response = Self::check(response, &[]).await?;
        let created: CreateResponse = response.json().await?;
        Ok(created.id)
    }

    pub async fn all_documents(&self) -> Result<Vec<StoredDocument>, CloudantError> {
        let response = self
            .send(Method::Get, &self.url("/_all_docs?include_docs=true"), None)
            .await?;
        let mut response = Self::check(response, &[]).await?;
        let all_docs: AllDocsResponse = response.json().await?;
        Ok(documents_from_rows(all_docs))
    }

    /// `_bulk_docs` で削除する。削除できた件数を返す
    pub async fn delete_documents(
        &self,
        documents: &[StoredDocument],
    ) -> Result<usize, CloudantError> {
        if documents.is_empty() {
            return Ok(0);
        }
        let payload = deletion_payload(documents);
        let response = self
            .send(Method::Post, &self.url("/_bulk_docs"), Some(&payload))
            .await?;
        let mut response = Self::check(response, &[]).await?;
        let results: Vec<BulkResult> = response.json().await?;
        deleted_count(results).inspect_err(|e| console_error!("{}", e))
    }
}

/// `_bulk_docs` の結果を数える。1 件でも失敗があればエラー
fn deleted_count(results: Vec<BulkResult>) -> Result<usize, CloudantError> {
    let mut deleted = 0;
    let mut failed = vec![];
    for result in results {
        match (result.ok, result.error) {
            (Some(true), None) => deleted += 1,
            (_, _) => failed.push(result.id),
        }
    }
    if failed.is_empty() {
        Ok(deleted)
    } else {
        Err(CloudantError::PartialDelete { deleted, failed })
    }
}

fn basic_authorization(username: &str, password: &str) -> String {
    format!(
        "Basic {}",
        STANDARD.encode(format!("{}:{}", username, password))
    )
}

fn parse_retry_after(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}

fn documents_from_rows(all_docs: AllDocsResponse) -> Vec<StoredDocument> {
    all_docs
        .rows
        .into_iter()
        .filter_map(|row| {
            let body = row.doc?;
            let rev = body.get("_rev").and_then(Value::as_str).map(String::from);
            Some(StoredDocument {
                id: row.id,
                rev,
                body,
            })
        })
        .collect()
}

fn deletion_payload(documents: &[StoredDocument]) -> Value {
    let docs: Vec<Value> = documents
        .iter()
        .map(|d| {
            json!({
                "_id": d.id,
                "_rev": d.rev,
                "_deleted": true
            })
        })
        .collect();
    json!({ "docs": docs })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_authorization() {
        assert_eq!(
            basic_authorization("Aladdin", "open sesame"),
            "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ=="
        );
    }

    #[test]
    fn test_url_includes_database() {
        let creds = CloudantCredentials {
            username: "u".into(),
            password: "p".into(),
            host: "example.cloudant.com".into(),
            port: 443,
        };
        let cloudant = Cloudant::new(&creds, "gps-db");
        assert_eq!(
            cloudant.url("/_all_docs?include_docs=true"),
            "https://example.cloudant.com/gps-db/_all_docs?include_docs=true"
        );
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("3"), Some(3));
        assert_eq!(parse_retry_after(" 10 "), Some(10));
        // HTTP-date 形式は扱わない
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn test_documents_from_rows_skips_rows_without_doc() {
        let raw = r#"{
            "total_rows": 3, "offset": 0,
            "rows": [
                {"id": "a", "key": "a", "value": {"rev": "1-x"},
                 "doc": {"_id": "a", "_rev": "1-x", "type": "coord"}},
                {"id": "_design/views", "key": "_design/views", "value": {"rev": "2-y"},
                 "doc": {"_id": "_design/views", "_rev": "2-y", "views": {}}},
                {"id": "gone", "key": "gone", "value": {"rev": "3-z", "deleted": true}, "doc": null}
            ]
        }"#;
        let all_docs: AllDocsResponse = serde_json::from_str(raw).unwrap();
        let docs = documents_from_rows(all_docs);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "a");
        assert_eq!(docs[0].rev.as_deref(), Some("1-x"));
        assert_eq!(docs[1].id, "_design/views");
    }

    #[test]
    fn test_deletion_payload() {
        let docs = vec![StoredDocument {
            id: "a".into(),
            rev: Some("1-x".into()),
            body: json!({}),
        }];
        assert_eq!(
            deletion_payload(&docs),
            json!({"docs": [{"_id": "a", "_rev": "1-x", "_deleted": true}]})
        );
    }

    #[test]
    fn test_bulk_results_parse() {
        let raw = r#"[{"id": "a", "rev": "2-x", "ok": true},
                      {"id": "b", "error": "conflict", "reason": "Document update conflict."}]"#;
        let results: Vec<BulkResult> = serde_json::from_str(raw).unwrap();
        assert_eq!(results[0].ok, Some(true));
        assert_eq!(results[1].error.as_deref(), Some("conflict"));
    }

    #[test]
    fn test_deleted_count_all_ok() {
        let raw = r#"[{"id": "a", "rev": "2-x", "ok": true},
                      {"id": "b", "rev": "2-y", "ok": true}]"#;
        let results: Vec<BulkResult> = serde_json::from_str(raw).unwrap();
        assert_eq!(deleted_count(results).unwrap(), 2);
        assert_eq!(deleted_count(vec![]).unwrap(), 0);
    }

    #[test]
    fn test_deleted_count_reports_conflicts() {
        let raw = r#"[{"id": "a", "rev": "2-x", "ok": true},
                      {"id": "b", "error": "conflict", "reason": "Document update conflict."}]"#;
        let results: Vec<BulkResult> = serde_json::from_str(raw).unwrap();
        match deleted_count(results) {
            Err(CloudantError::PartialDelete { deleted, failed }) => {
                assert_eq!(deleted, 1);
                assert_eq!(failed, vec!["b".to_string()]);
            }
            other => panic!("expected PartialDelete, got {:?}", other),
        }
    }
}
