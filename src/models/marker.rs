use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;

use super::coord::{is_coord, CoordinateReport};
use super::received::Received;
use super::StoredDocument;

/// 重複をまとめた地図上のマーカー (保存しない)
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MapMarker {
    pub coordinate_key: String,
    pub lat: String,
    pub lng: String,
    pub first_seen: Received,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<Received>,
    pub imei: String,
    pub dev: String,
    pub name: String,
    pub count: u32,
}

impl MapMarker {
    fn new(report: CoordinateReport) -> Self {
        Self {
            coordinate_key: coordinate_key(&report.lat, &report.lng),
            lat: report.lat,
            lng: report.lng,
            first_seen: report.received,
            last_seen: None,
            imei: report.imei,
            dev: report.dev,
            name: report.name,
            count: 1,
        }
    }

    /// 同じキーの読み取りを 1 件取り込む。範囲は常に本当の最小・最大
    fn absorb(&mut self, received: Received) {
        self.count += 1;
        let latest = self.last_seen.unwrap_or(self.first_seen).max(received);
        self.first_seen = self.first_seen.min(received);
        self.last_seen = Some(latest);
    }
}

/// 緯度経度の文字列をそのまま連結したキー
pub fn coordinate_key(lat: &str, lng: &str) -> String {
    format!("{{lat: {}, lng: {}}}", lat, lng)
}

#[derive(Error, Debug)]
pub enum FoldError {
    #[error("malformed coord record {id}: {source}")]
    MalformedRecord {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// `type == "coord"` のドキュメントを (座標, imei) ごとにまとめる。
/// 出力順は各キーが最初に現れた順。
pub fn fold_markers(documents: &[StoredDocument]) -> Result<Vec<MapMarker>, FoldError> {
    let mut markers: Vec<MapMarker> = vec![];
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for document in documents.iter().filter(|d| is_coord(&d.body)) {
        let report: CoordinateReport =
            serde_json::from_value(document.body.clone()).map_err(|source| {
                FoldError::MalformedRecord {
                    id: document.id.clone(),
                    source,
                }
            })?;

        let key = (coordinate_key(&report.lat, &report.lng), report.imei.clone());
        match index.get(&key) {
            Some(&i) => markers[i].absorb(report.received),
            None => {
                index.insert(key, markers.len());
                markers.push(MapMarker::new(report));
            }
        }
    }

    Ok(markers)
}
