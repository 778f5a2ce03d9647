pub mod coord;
pub mod keys;
pub mod marker;
pub mod received;

use serde_json::Value;

/// ストアから読み出した 1 ドキュメント
#[derive(Clone, Debug)]
pub struct StoredDocument {
    pub id: String,
    /// CouchDB のリビジョン (KV では None)
    pub rev: Option<String>,
    pub body: Value,
}
