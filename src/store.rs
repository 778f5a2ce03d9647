use crate::config::KV_GPS_DB;
use crate::models::coord::is_clearable;
use crate::models::keys::list_keys;
use crate::models::StoredDocument;
use crate::service::cloudant::{Cloudant, CloudantError};
use crate::util::{kv_bulk_get_values, KV_BULK_LIMIT};
use serde_json::Value;
use thiserror::Error;
use worker::kv::{KvError, KvStore};
use worker::{console_debug, Env};

/// リクエストごとに開くドキュメントストア
pub enum DocumentStore {
    Cloudant(Cloudant),
    Kv(KvStore),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no document store is configured")]
    NotConfigured,
    #[error(transparent)]
    CloudantError(#[from] CloudantError),
    #[error(transparent)]
    KvError(#[from] KvError),
    #[error(transparent)]
    WorkerError(#[from] worker::Error),
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
}

impl DocumentStore {
    /// VCAP_SERVICES の Cloudant を優先し、無ければ KV を使う
    pub async fn open(env: &Env) -> Result<DocumentStore, StoreError> {
        if let Some(cloudant) = Cloudant::new_from_env(env) {
            cloudant.ensure_database().await?;
            console_debug!("document store: cloudant");
            return Ok(DocumentStore::Cloudant(cloudant));
        }
        match env.kv(KV_GPS_DB) {
            Ok(kv) => {
                console_debug!("document store: kv");
                Ok(DocumentStore::Kv(kv))
            }
            Err(_) => Err(StoreError::NotConfigured),
        }
    }

    /// 新しいドキュメントとして追加し、その id を返す
    pub async fn insert(&self, document: &Value) -> Result<String, StoreError> {
        match self {
            DocumentStore::Cloudant(cloudant) => Ok(cloudant.create_document(document).await?),
            DocumentStore::Kv(kv) => {
                let id = uuid::Uuid::new_v4().to_string();
                kv.put(&id, serde_json::to_string(document)?)?
                    .execute()
                    .await?;
                Ok(id)
            }
        }
    }

    pub async fn all_documents(&self) -> Result<Vec<StoredDocument>, StoreError> {
        match self {
            DocumentStore::Cloudant(cloudant) => Ok(cloudant.all_documents().await?),
            DocumentStore::Kv(kv) => {
                let mut keys = list_keys(kv).await?;
                keys.sort();

                let mut documents = vec![];
                // bulk_getの最大数が100なのでkeyを100ごとに分割する
                for chunk in keys.chunks(KV_BULK_LIMIT) {
                    let mut values = kv_bulk_get_values::<Value>(kv, chunk).await?;
                    for key in chunk {
                        // 一覧取得後に消えたキーは飛ばす
                        if let Some(Some(body)) = values.remove(key) {
                            documents.push(StoredDocument {
                                id: key.clone(),
                                rev: None,
                                body,
                            });
                        }
                    }
                }
                Ok(documents)
            }
        }
    }

    pub async fn delete_documents(&self, documents: &[StoredDocument]) -> Result<usize, StoreError> {
        match self {
            DocumentStore::Cloudant(cloudant) => Ok(cloudant.delete_documents(documents).await?),
            DocumentStore::Kv(kv) => {
                for document in documents {
                    kv.delete(&document.id).await?;
                }
                Ok(documents.len())
            }
        }
    }

    /// `type` が `"coord"` か無いドキュメントを全て消す
    pub async fn clear_coords(&self) -> Result<usize, StoreError> {
        let documents = self.all_documents().await?;
        let targets = clear_targets(documents);
        self.delete_documents(&targets).await
    }
}

/// 一括削除の対象。CouchDB の design document は残す
pub fn clear_targets(documents: Vec<StoredDocument>) -> Vec<StoredDocument> {
    documents
        .into_iter()
        .filter(|d| !d.id.starts_with("_design/") && is_clearable(&d.body))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::marker::fold_markers;
    use serde_json::json;

    fn doc(id: &str, body: Value) -> StoredDocument {
        StoredDocument {
            id: id.into(),
            rev: Some("1-a".into()),
            body,
        }
    }

    fn collection() -> Vec<StoredDocument> {
        vec![
            doc(
                "c1",
                json!({
                    "type": "coord", "imei": "X", "dev": "d", "name": "n",
                    "lat": "40.0", "lng": "-75.0",
                    "received": "March 09, 2017 - 10:00:00 AM EST"
                }),
            ),
            doc("untyped", json!({"note": "legacy"})),
            doc("other", json!({"type": "settings", "zoom": 3})),
            doc("_design/views", json!({"views": {}})),
        ]
    }

    #[test]
    fn test_clear_targets_coord_and_untyped_only() {
        let ids: Vec<String> = clear_targets(collection()).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["c1", "untyped"]);
    }

    #[test]
    fn test_aggregate_after_clear_is_empty() {
        let all = collection();
        let cleared: Vec<String> = clear_targets(all.clone()).into_iter().map(|d| d.id).collect();
        let survivors: Vec<StoredDocument> = all
            .into_iter()
            .filter(|d| !cleared.contains(&d.id))
            .collect();

        assert!(survivors.iter().any(|d| d.id == "other"));
        assert!(fold_markers(&survivors).unwrap().is_empty());
    }
}
