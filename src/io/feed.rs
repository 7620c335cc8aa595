//! Live timing row normalization
//!
//! Converts raw per-kart rows from the timing feed into `LapEvent`s. Rows are
//! decoded one at a time so a single bad row never takes the rest of the
//! batch down with it.

use crate::domain::{DriverId, KartId, LapEvent};
use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use tracing::debug;

/// Undecoded row as received from the feed
pub type RawRow = serde_json::Value;

/// Why a row could not be turned into a `LapEvent`
#[derive(Debug, Clone, PartialEq)]
pub enum RowError {
    /// Row is not an object of the expected shape
    Decode(String),
    MissingKart,
    MissingDriver,
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowError::Decode(e) => write!(f, "undecodable row: {e}"),
            RowError::MissingKart => f.write_str("row has no kart number"),
            RowError::MissingDriver => f.write_str("row has no driver name"),
        }
    }
}

impl std::error::Error for RowError {}

/// One row of the live timing table
///
/// Field names follow the timing service (PascalCase) with snake_case
/// aliases for recorded or hand-written feeds. Columns the engine does not
/// use (`Position`, `BestLapTime`, ...) are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedRow {
    #[serde(default, alias = "Number", alias = "plate", deserialize_with = "lenient_string")]
    pub number: Option<String>,
    #[serde(default, alias = "DriverName", alias = "name")]
    pub driver_name: Option<String>,
    #[serde(default, alias = "LastLapTime", alias = "last_lap", deserialize_with = "lenient_string")]
    pub last_lap_time: Option<String>,
    #[serde(default, alias = "Laps", deserialize_with = "lenient_u32")]
    pub laps: Option<u32>,
    #[serde(default, alias = "Status", deserialize_with = "lenient_string")]
    pub status: Option<String>,
    #[serde(default, alias = "InPit", deserialize_with = "lenient_flag")]
    pub in_pit: Option<bool>,
}

/// Visitor accepting a JSON string or number as text
struct TextVisitor;

impl<'de> Visitor<'de> for TextVisitor {
    type Value = Option<String>;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a string or number")
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Some(value.to_string()))
    }

    fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Some(value))
    }

    fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Some(value.to_string()))
    }

    fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Some(value.to_string()))
    }

    fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Some(value.to_string()))
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(None)
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(TextVisitor)
}

/// Counters arrive as numbers or numeric strings; anything else is None
fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = deserializer.deserialize_any(TextVisitor)?;
    Ok(text.and_then(|t| t.trim().parse::<u32>().ok()))
}

/// Visitor accepting a bool, 0/1 or "true"/"false"; anything else is None
struct FlagVisitor;

impl<'de> Visitor<'de> for FlagVisitor {
    type Value = Option<bool>;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a boolean flag")
    }

    fn visit_bool<E>(self, value: bool) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Some(value))
    }

    fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(match value {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        })
    }

    fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(match value {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        })
    }

    fn visit_f64<E>(self, _value: f64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(None)
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        let value = value.trim();
        if value.eq_ignore_ascii_case("true") || value == "1" {
            Ok(Some(true))
        } else if value.eq_ignore_ascii_case("false") || value == "0" {
            Ok(Some(false))
        } else {
            Ok(None)
        }
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(None)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: de::SeqAccess<'de>,
    {
        while seq.next_element::<de::IgnoredAny>()?.is_some() {}
        Ok(None)
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: de::MapAccess<'de>,
    {
        while map.next_entry::<de::IgnoredAny, de::IgnoredAny>()?.is_some() {}
        Ok(None)
    }
}

fn lenient_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(FlagVisitor)
}

/// Parse a lap time string into seconds
///
/// Accepts `SS.mmm`, `MM:SS.mmm` and `H:MM:SS.mmm`, with trailing
/// decoration (apostrophes, quotes, unit letters) ignored. Returns 0.0 for
/// anything malformed so callers treat it as "no lap".
pub fn parse_lap_time(raw: &str) -> f64 {
    let trimmed = raw.trim().trim_end_matches(|c: char| !c.is_ascii_digit());
    if trimmed.is_empty() {
        return 0.0;
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    let seconds = match parts.as_slice() {
        [secs] => parse_seconds(secs),
        [mins, secs] => parse_clock(None, mins, secs),
        [hours, mins, secs] => parse_clock(Some(hours), mins, secs),
        _ => None,
    };

    match seconds {
        Some(s) if s.is_finite() && s > 0.0 => s,
        _ => 0.0,
    }
}

fn parse_seconds(secs: &str) -> Option<f64> {
    let secs = secs.trim();
    if secs.is_empty() || !secs.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    secs.parse::<f64>().ok()
}

fn parse_clock(hours: Option<&&str>, mins: &str, secs: &str) -> Option<f64> {
    let hours = match hours {
        Some(h) => h.trim().parse::<u32>().ok()?,
        None => 0,
    };
    let mins = mins.trim().parse::<u32>().ok()?;
    let secs = parse_seconds(secs)?;
    if secs >= 60.0 || (hours > 0 && mins >= 60) {
        return None;
    }
    Some(f64::from(hours) * 3600.0 + f64::from(mins) * 60.0 + secs)
}

/// Whether a status string marks the kart as in the pit lane
pub fn is_pit_status(status: &str, pit_tokens: &[String]) -> bool {
    let status = status.trim();
    !status.is_empty() && pit_tokens.iter().any(|token| token.trim().eq_ignore_ascii_case(status))
}

/// Convert a decoded row into a `LapEvent`
pub fn normalize(row: &FeedRow, pit_tokens: &[String]) -> Result<LapEvent, RowError> {
    let kart = row.number.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let Some(kart) = kart else {
        return Err(RowError::MissingKart);
    };
    let driver = row.driver_name.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let Some(driver) = driver else {
        return Err(RowError::MissingDriver);
    };

    let in_pit = row.in_pit.unwrap_or(false)
        || row.status.as_deref().is_some_and(|s| is_pit_status(s, pit_tokens));
    let lap_seconds = row.last_lap_time.as_deref().map(parse_lap_time).unwrap_or(0.0);

    Ok(LapEvent {
        driver_id: DriverId::new(driver),
        kart_id: KartId::new(kart),
        lap_seconds,
        in_pit,
        lap_number: row.laps,
    })
}

/// Decode and normalize a raw feed row
pub fn normalize_raw(raw: &RawRow, pit_tokens: &[String]) -> Result<LapEvent, RowError> {
    let row = FeedRow::deserialize(raw).map_err(|e| RowError::Decode(e.to_string()))?;
    normalize(&row, pit_tokens)
}

/// Split a feed payload into raw rows
///
/// Accepts a bare JSON array of rows or an object carrying a `Rows` (or
/// `rows`) array. An empty or whitespace-only payload is an empty batch.
pub fn parse_batch(payload: &str) -> anyhow::Result<Vec<RawRow>> {
    if payload.trim().is_empty() {
        return Ok(Vec::new());
    }

    let value: serde_json::Value = serde_json::from_str(payload)?;
    match value {
        serde_json::Value::Array(rows) => Ok(rows),
        serde_json::Value::Object(mut obj) => {
            let rows = obj.remove("Rows").or_else(|| obj.remove("rows"));
            match rows {
                Some(serde_json::Value::Array(rows)) => Ok(rows),
                Some(serde_json::Value::Null) | None => {
                    debug!("feed_payload_without_rows");
                    Ok(Vec::new())
                }
                Some(other) => anyhow::bail!("feed Rows is not an array: {other}"),
            }
        }
        other => anyhow::bail!("unexpected feed payload: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tokens() -> Vec<String> {
        vec!["PIT".to_string()]
    }

    #[test]
    fn test_parse_seconds_only() {
        assert_eq!(parse_lap_time("41.234"), 41.234);
        assert_eq!(parse_lap_time(" 41 "), 41.0);
    }

    #[test]
    fn test_parse_minutes_seconds() {
        assert!((parse_lap_time("1:02.500") - 62.5).abs() < 1e-9);
        assert!((parse_lap_time("0:59.999") - 59.999).abs() < 1e-9);
    }

    #[test]
    fn test_parse_hours() {
        assert!((parse_lap_time("1:00:01.5") - 3601.5).abs() < 1e-9);
    }

    #[test]
    fn test_strips_trailing_decoration() {
        assert!((parse_lap_time("1:02.500'") - 62.5).abs() < 1e-9);
        assert_eq!(parse_lap_time("41.234\""), 41.234);
        assert_eq!(parse_lap_time("41.234s"), 41.234);
        assert_eq!(parse_lap_time("41.234 *"), 41.234);
    }

    #[test]
    fn test_malformed_is_zero() {
        assert_eq!(parse_lap_time(""), 0.0);
        assert_eq!(parse_lap_time("--"), 0.0);
        assert_eq!(parse_lap_time("abc"), 0.0);
        assert_eq!(parse_lap_time("1:75.000"), 0.0);
        assert_eq!(parse_lap_time("1:2:3:4"), 0.0);
        assert_eq!(parse_lap_time("-41.2"), 0.0);
        assert_eq!(parse_lap_time("4a1.2"), 0.0);
        assert_eq!(parse_lap_time("0.000"), 0.0);
    }

    #[test]
    fn test_normalize_speedhive_row() {
        let raw = json!({
            "Position": 3,
            "Number": "12",
            "DriverName": "  ana  lopez ",
            "LastLapTime": "41.532",
            "BestLapTime": "40.998",
            "Laps": 17,
            "Status": "Track"
        });

        let event = normalize_raw(&raw, &tokens()).unwrap();
        assert_eq!(event.kart_id, KartId::new("12"));
        assert_eq!(event.driver_id, DriverId::new("ANA LOPEZ"));
        assert_eq!(event.lap_seconds, 41.532);
        assert!(!event.in_pit);
        assert_eq!(event.lap_number, Some(17));
    }

    #[test]
    fn test_normalize_snake_case_and_numeric_fields() {
        let raw = json!({
            "plate": 7,
            "name": "Ben",
            "last_lap": 42.1,
            "status": "pit"
        });

        let event = normalize_raw(&raw, &tokens()).unwrap();
        assert_eq!(event.kart_id, KartId::new("7"));
        assert_eq!(event.lap_seconds, 42.1);
        assert!(event.in_pit);
        assert_eq!(event.lap_number, None);
    }

    #[test]
    fn test_explicit_pit_flag() {
        let raw = json!({"Number": "7", "DriverName": "Ben", "InPit": true});
        assert!(normalize_raw(&raw, &tokens()).unwrap().in_pit);

        let raw = json!({"Number": "7", "DriverName": "Ben", "InPit": false, "Status": "Track"});
        assert!(!normalize_raw(&raw, &tokens()).unwrap().in_pit);
    }

    #[test]
    fn test_loose_pit_flag_shapes() {
        for flag in [json!(1), json!("true"), json!("TRUE"), json!("1")] {
            let raw = json!({"Number": "7", "DriverName": "Ben", "LastLapTime": "41.2", "InPit": flag.clone()});
            assert!(normalize_raw(&raw, &tokens()).unwrap().in_pit, "flag {flag}");
        }

        for flag in [json!(0), json!("false"), json!("maybe"), json!(2), json!(null), json!([1])] {
            let raw = json!({"Number": "7", "DriverName": "Ben", "LastLapTime": "41.2", "InPit": flag.clone()});
            let event = normalize_raw(&raw, &tokens()).unwrap();
            assert!(!event.in_pit, "flag {flag}");
            assert_eq!(event.lap_seconds, 41.2);
        }
    }

    #[test]
    fn test_numeric_status_code() {
        let raw = json!({"Number": "7", "DriverName": "Ana", "LastLapTime": "41.2", "Status": 0});
        let event = normalize_raw(&raw, &tokens()).unwrap();
        assert!(!event.in_pit);
        assert_eq!(event.lap_seconds, 41.2);

        let codes = vec!["2".to_string()];
        let raw = json!({"Number": "7", "DriverName": "Ana", "Status": 2});
        assert!(normalize_raw(&raw, &codes).unwrap().in_pit);
    }

    #[test]
    fn test_custom_pit_tokens() {
        let tokens = vec!["IN PIT".to_string(), "P".to_string()];
        assert!(is_pit_status("in pit", &tokens));
        assert!(is_pit_status("P", &tokens));
        assert!(!is_pit_status("PIT", &tokens));
        assert!(!is_pit_status("", &tokens));
    }

    #[test]
    fn test_missing_fields() {
        let raw = json!({"DriverName": "Ben", "LastLapTime": "41.0"});
        assert_eq!(normalize_raw(&raw, &tokens()), Err(RowError::MissingKart));

        let raw = json!({"Number": "  ", "DriverName": "Ben"});
        assert_eq!(normalize_raw(&raw, &tokens()), Err(RowError::MissingKart));

        let raw = json!({"Number": "7", "DriverName": ""});
        assert_eq!(normalize_raw(&raw, &tokens()), Err(RowError::MissingDriver));
    }

    #[test]
    fn test_bad_lap_time_is_not_fatal() {
        let raw = json!({"Number": "7", "DriverName": "Ben", "LastLapTime": "--:--"});
        let event = normalize_raw(&raw, &tokens()).unwrap();
        assert_eq!(event.lap_seconds, 0.0);
    }

    #[test]
    fn test_undecodable_row() {
        assert!(matches!(normalize_raw(&json!("nope"), &tokens()), Err(RowError::Decode(_))));
        assert!(matches!(
            normalize_raw(&json!({"Number": "7", "DriverName": ["x"]}), &tokens()),
            Err(RowError::Decode(_))
        ));
    }

    #[test]
    fn test_unparseable_counter_is_dropped() {
        let raw = json!({"Number": "7", "DriverName": "Ben", "Laps": "n/a", "Position": "-"});
        let event = normalize_raw(&raw, &tokens()).unwrap();
        assert_eq!(event.lap_number, None);
    }

    #[test]
    fn test_parse_batch_shapes() {
        assert_eq!(parse_batch("").unwrap().len(), 0);
        assert_eq!(parse_batch("  \n").unwrap().len(), 0);
        assert_eq!(parse_batch(r#"[{"Number": "1"}, {"Number": "2"}]"#).unwrap().len(), 2);
        assert_eq!(parse_batch(r#"{"Rows": [{"Number": "1"}]}"#).unwrap().len(), 1);
        assert_eq!(parse_batch(r#"{"rows": []}"#).unwrap().len(), 0);
        assert_eq!(parse_batch(r#"{"Session": "x"}"#).unwrap().len(), 0);
        assert!(parse_batch("not json").is_err());
        assert!(parse_batch(r#"{"Rows": 5}"#).is_err());
        assert!(parse_batch("42").is_err());
    }
}
