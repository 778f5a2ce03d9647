use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::received::Received;

/// 位置情報レコードの `type` タグ
pub const RECORD_TYPE_COORD: &str = "coord";

const ANON_IMEI: &str = "---";
const ANON_DEV: &str = "Anon";
const ANON_NAME: &str = "---";

/// 保存される位置情報レコード。書き込み後は変更しない
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(try_from = "StoredReport")]
pub struct CoordinateReport {
    pub imei: String,
    pub r#type: String,
    pub dev: String,
    pub received: Received,
    pub lat: String,
    pub lng: String,
    pub name: String,
}

/// 読み込み用。旧アプリは "recieved" で保存している (両方あれば "received" を使う)
#[derive(Deserialize)]
struct StoredReport {
    imei: String,
    r#type: String,
    dev: String,
    received: Option<Received>,
    recieved: Option<Received>,
    lat: String,
    lng: String,
    name: String,
}

impl TryFrom<StoredReport> for CoordinateReport {
    type Error = &'static str;

    fn try_from(stored: StoredReport) -> Result<Self, Self::Error> {
        let received = stored
            .received
            .or(stored.recieved)
            .ok_or("missing field `received`")?;
        Ok(Self {
            imei: stored.imei,
            r#type: stored.r#type,
            dev: stored.dev,
            received,
            lat: stored.lat,
            lng: stored.lng,
            name: stored.name,
        })
    }
}

/// `/gps` と `/gpsa` のパスから組み立てる入力値
#[derive(Clone, Debug, PartialEq)]
pub struct ReportCreate {
    pub lng: String,
    pub lat: String,
    pub imei: String,
    pub dev: String,
    pub name: String,
}

impl ReportCreate {
    /// `{lng},{lat},{imei},{dev},{name}`
    pub fn from_segment(segment: &str) -> Option<Self> {
        let [lng, lat, imei, dev, name] = split_tokens::<5>(segment)?;
        Some(Self {
            lng,
            lat,
            imei,
            dev,
            name,
        })
    }

    /// `{lng},{lat}` (識別情報はプレースホルダー)
    pub fn anonymous_from_segment(segment: &str) -> Option<Self> {
        let [lng, lat] = split_tokens::<2>(segment)?;
        Some(Self {
            lng,
            lat,
            imei: ANON_IMEI.into(),
            dev: ANON_DEV.into(),
            name: ANON_NAME.into(),
        })
    }

    pub fn into_report(self, received: Received) -> CoordinateReport {
        CoordinateReport {
            imei: self.imei,
            r#type: RECORD_TYPE_COORD.into(),
            dev: self.dev,
            received,
            lat: self.lat,
            lng: self.lng,
            name: self.name,
        }
    }
}

/// `,` で区切り、デコードした空でないトークンがちょうど `N` 個のときだけ返す
fn split_tokens<const N: usize>(segment: &str) -> Option<[String; N]> {
    let parts: Vec<String> = segment
        .split(',')
        .map(|part| percent_decode_str(part).decode_utf8_lossy().into_owned())
        .collect();
    if parts.iter().any(|part| part.is_empty()) {
        return None;
    }
    parts.try_into().ok()
}

/// `type` が `"coord"` のドキュメントか
pub fn is_coord(doc: &Value) -> bool {
    doc.get("type").and_then(Value::as_str) == Some(RECORD_TYPE_COORD)
}

/// 一括削除の対象か (`type` が `"coord"` または `type` が無い)
pub fn is_clearable(doc: &Value) -> bool {
    match doc.get("type") {
        None => true,
        Some(t) => t.as_str() == Some(RECORD_TYPE_COORD),
    }
}
