use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::America::New_York;
use serde::{Deserialize, Serialize};

/// 保存時の表示形式。既存データを読めるよう `%H` と `%p`、末尾の `EST` はそのまま
pub const DISPLAY_FORMAT: &str = "%B %d, %Y - %H:%M:%S %p EST";

/// 表示タイムゾーン (America/New_York) での受信時刻
#[derive(Clone, Copy, Ord, PartialOrd, PartialEq, Eq, Debug)]
pub struct Received(NaiveDateTime);

impl Received {
    pub fn now() -> Self {
        Self::from_utc(Utc::now())
    }

    pub fn from_utc(at: DateTime<Utc>) -> Self {
        Self(at.with_timezone(&New_York).naive_local())
    }

    pub fn parse(s: &str) -> Result<Self, chrono::ParseError> {
        NaiveDateTime::parse_from_str(s, DISPLAY_FORMAT).map(Self)
    }

    pub fn format(&self) -> String {
        self.0.format(DISPLAY_FORMAT).to_string()
    }
}

impl Serialize for Received {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.format())
    }
}

impl<'a> Deserialize<'a> for Received {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'a>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(|e| serde::de::Error::custom(format!("invalid timestamp {s:?}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_from_utc_converts_to_new_york() {
        // 冬時間 (UTC-5)
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 15, 0, 0).unwrap();
        assert_eq!(
            Received::from_utc(at).format(),
            "January 15, 2024 - 10:00:00 AM EST"
        );

        // 夏時間 (UTC-4) でも接尾辞は EST のまま
        let at = Utc.with_ymd_and_hms(2024, 7, 4, 22, 30, 5).unwrap();
        assert_eq!(
            Received::from_utc(at).format(),
            "July 04, 2024 - 18:30:05 PM EST"
        );
    }

    #[test]
    fn test_parse_round_trips_display_string() {
        let s = "March 09, 2017 - 14:05:00 PM EST";
        let parsed = Received::parse(s).unwrap();
        assert_eq!(parsed.format(), s);
    }

    #[test]
    fn test_ordering_is_chronological() {
        let earlier_str = "March 31, 2017 - 23:59:59 PM EST";
        let later_str = "April 01, 2017 - 00:00:01 AM EST";
        let earlier = Received::parse(earlier_str).unwrap();
        let later = Received::parse(later_str).unwrap();
        assert!(earlier < later);
        // 文字列順とは逆になる組み合わせ
        assert!(later_str < earlier_str);
    }

    #[test]
    fn test_rejects_other_formats() {
        assert!(Received::parse("2017-03-09T14:05:00Z").is_err());
        assert!(Received::parse("").is_err());
    }

    #[test]
    fn test_serde_uses_display_string() {
        let r = Received::parse("March 09, 2017 - 09:15:30 AM EST").unwrap();
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, "\"March 09, 2017 - 09:15:30 AM EST\"");
        let back: Received = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
        assert!(serde_json::from_str::<Received>("\"yesterday\"").is_err());
    }
}
