//! Event file discovery and loading.
//!
//! Reads clickstream exports into [`EventRecord`]s. Two layouts share one
//! column schema (`event_time`, `event_type`, `category_code`, `brand`,
//! `price`, `user_id`, `user_session`; other columns are ignored):
//! newline-delimited JSON (`.jsonl`, `.ndjson`) and headed CSV (`.csv`).

use std::io::BufRead;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use funnel_core::error::{FunnelError, Result};
use funnel_core::models::{ActorKeyMode, CategoryPath, EventRecord};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// File extensions recognised as event files.
const EVENT_FILE_EXTENSIONS: &[&str] = &["jsonl", "ndjson", "csv"];

// ── Public types ──────────────────────────────────────────────────────────────

/// Output of [`load_event_records`].
#[derive(Debug, Clone, Default)]
pub struct LoadedEvents {
    /// Records in file order, then line order.
    pub records: Vec<EventRecord>,
    /// Lines dropped because they could not be turned into a record.
    pub skipped_lines: usize,
    pub files_read: usize,
}

/// Why a single line was skipped.
#[derive(Debug, Error)]
enum LineError {
    #[error("invalid event JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid CSV row: {0}")]
    Csv(#[from] csv::Error),
    #[error("{0}")]
    Timestamp(FunnelError),
    #[error("record has no {0} key")]
    MissingActorKey(ActorKeyMode),
}

/// One row of the export, before validation.
#[derive(Debug, Deserialize)]
struct RawEvent {
    event_time: Value,
    event_type: String,
    #[serde(default)]
    category_code: Option<String>,
    #[serde(default)]
    brand: Option<String>,
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    user_id: Option<Value>,
    #[serde(default)]
    user_session: Option<String>,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Find all event files recursively under `dir`, sorted by path.
pub fn find_event_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && is_event_file(entry.path()))
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

/// Load every event under `data_path` (a file or a directory).
///
/// Unparseable lines and rows are skipped with a warning and counted; records whose
/// `event_type` is outside the funnel vocabulary are kept so the engine can
/// reject the batch.
pub fn load_event_records(data_path: &Path, mode: ActorKeyMode) -> Result<LoadedEvents> {
    if !data_path.exists() {
        return Err(FunnelError::DataPathNotFound(data_path.to_path_buf()));
    }

    let files = if data_path.is_file() {
        vec![data_path.to_path_buf()]
    } else {
        let found = find_event_files(data_path);
        if found.is_empty() {
            return Err(FunnelError::NoDataFiles(data_path.to_path_buf()));
        }
        found
    };

    let mut loaded = LoadedEvents::default();
    for file in &files {
        let skipped = read_file(file, mode, &mut loaded.records)?;
        loaded.skipped_lines += skipped;
        loaded.files_read += 1;
    }

    debug!(
        records = loaded.records.len(),
        skipped = loaded.skipped_lines,
        files = loaded.files_read,
        "loaded event records"
    );
    Ok(loaded)
}

/// Parse a timestamp from the export.
///
/// Accepts RFC 3339, the export's `"2019-10-01 00:00:03 UTC"` form, naive
/// `YYYY-MM-DD HH:MM:SS`, and integer Unix seconds.
pub fn parse_event_time(value: &Value) -> Result<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_event_time_str(s),
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| FunnelError::TimestampParse(n.to_string())),
        other => Err(FunnelError::TimestampParse(other.to_string())),
    }
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

fn is_event_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| EVENT_FILE_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

fn parse_event_time_str(s: &str) -> Result<DateTime<Utc>> {
    let trimmed = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    let naive = trimmed.strip_suffix(" UTC").unwrap_or(trimmed);
    const FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(naive, fmt).ok())
        .map(|dt| Utc.from_utc_datetime(&dt))
        .ok_or_else(|| FunnelError::TimestampParse(s.to_string()))
}

/// Append the records of one file to `out`; returns the number of skipped lines.
fn read_file(path: &Path, mode: ActorKeyMode, out: &mut Vec<EventRecord>) -> Result<usize> {
    let file = std::fs::File::open(path).map_err(|source| FunnelError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;

    if is_csv(path) {
        read_csv(path, file, mode, out)
    } else {
        read_jsonl(path, file, mode, out)
    }
}

fn read_jsonl(
    path: &Path,
    file: std::fs::File,
    mode: ActorKeyMode,
    out: &mut Vec<EventRecord>,
) -> Result<usize> {
    let mut skipped = 0usize;
    for (line_no, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| FunnelError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match parse_line(trimmed, mode) {
            Ok(record) => out.push(record),
            Err(e) => {
                warn!("{}:{}: skipping line: {}", path.display(), line_no + 1, e);
                skipped += 1;
            }
        }
    }
    Ok(skipped)
}

fn read_csv(
    path: &Path,
    file: std::fs::File,
    mode: ActorKeyMode,
    out: &mut Vec<EventRecord>,
) -> Result<usize> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(std::io::BufReader::new(file));

    let mut skipped = 0usize;
    for (row, result) in reader.deserialize::<RawEvent>().enumerate() {
        let parsed = match result {
            Ok(raw) => raw.into_record(mode),
            Err(e) if e.is_io_error() => {
                return Err(FunnelError::FileRead {
                    path: path.to_path_buf(),
                    source: e.into(),
                });
            }
            Err(e) => Err(e.into()),
        };
        match parsed {
            Ok(record) => out.push(record),
            Err(e) => {
                // +2: one-based, after the header row.
                warn!("{}:{}: skipping row: {}", path.display(), row + 2, e);
                skipped += 1;
            }
        }
    }
    Ok(skipped)
}

fn parse_line(line: &str, mode: ActorKeyMode) -> std::result::Result<EventRecord, LineError> {
    let raw: RawEvent = serde_json::from_str(line)?;
    raw.into_record(mode)
}

impl RawEvent {
    fn into_record(self, mode: ActorKeyMode) -> std::result::Result<EventRecord, LineError> {
        let timestamp = parse_event_time(&self.event_time).map_err(LineError::Timestamp)?;

        let actor_key = match mode {
            ActorKeyMode::User => self.user_id.as_ref().and_then(value_to_key),
            ActorKeyMode::Session => self.user_session.as_deref().map(|s| s.trim().to_string()),
        }
        .filter(|k| !k.is_empty())
        .ok_or(LineError::MissingActorKey(mode))?;

        Ok(EventRecord {
            actor_key,
            timestamp,
            event_type: self.event_type,
            category: self.category_code.as_deref().and_then(CategoryPath::parse),
            brand: self.brand.filter(|b| !b.trim().is_empty()),
            price: self.price,
        })
    }
}

/// Identifiers arrive as numbers in some exports and strings in others.
fn value_to_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_jsonl(dir: &Path, name: &str, lines: &[String]) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        path
    }

    fn sample(time: &str, kind: &str, user: u64, session: &str, price: Option<f64>) -> String {
        serde_json::json!({
            "event_time": time,
            "event_type": kind,
            "product_id": 1004237,
            "category_code": "electronics.smartphone",
            "brand": "apple",
            "price": price,
            "user_id": user,
            "user_session": session,
        })
        .to_string()
    }

    const CSV_HEADER: &str =
        "event_time,event_type,product_id,category_id,category_code,brand,price,user_id,user_session";

    // ── find_event_files ──────────────────────────────────────────────────────

    #[test]
    fn test_find_event_files_recursive_and_sorted() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("2019").join("nov");
        std::fs::create_dir_all(&nested).unwrap();
        write_jsonl(dir.path(), "b.jsonl", &[]);
        write_jsonl(&nested, "a.ndjson", &[]);
        write_jsonl(dir.path(), "notes.txt", &[]);

        let files = find_event_files(dir.path());
        assert_eq!(files.len(), 2);
        assert!(files.windows(2).all(|w| w[0] <= w[1]));
        assert!(files.iter().all(|f| is_event_file(f)));
    }

    // ── parse_event_time ──────────────────────────────────────────────────────

    #[test]
    fn test_parse_event_time_export_format() {
        let dt = parse_event_time(&Value::from("2019-10-01 00:00:03 UTC")).unwrap();
        assert_eq!(dt.to_rfc3339(), "2019-10-01T00:00:03+00:00");
    }

    #[test]
    fn test_parse_event_time_rfc3339_and_epoch() {
        let dt = parse_event_time(&Value::from("2019-10-01T02:00:00+02:00")).unwrap();
        assert_eq!(dt.to_rfc3339(), "2019-10-01T00:00:00+00:00");

        let epoch = parse_event_time(&Value::from(1_569_888_000i64)).unwrap();
        assert_eq!(epoch.to_rfc3339(), "2019-10-01T00:00:00+00:00");
    }

    #[test]
    fn test_parse_event_time_rejects_garbage() {
        assert!(matches!(
            parse_event_time(&Value::from("yesterday")),
            Err(FunnelError::TimestampParse(_))
        ));
        assert!(parse_event_time(&Value::Null).is_err());
    }

    // ── load_event_records ────────────────────────────────────────────────────

    #[test]
    fn test_load_missing_path() {
        let err = load_event_records(Path::new("/definitely/not/here"), ActorKeyMode::Session)
            .unwrap_err();
        assert!(matches!(err, FunnelError::DataPathNotFound(_)));
    }

    #[test]
    fn test_load_empty_directory() {
        let dir = TempDir::new().unwrap();
        let err = load_event_records(dir.path(), ActorKeyMode::Session).unwrap_err();
        assert!(matches!(err, FunnelError::NoDataFiles(_)));
    }

    #[test]
    fn test_load_session_keys_and_fields() {
        let dir = TempDir::new().unwrap();
        write_jsonl(
            dir.path(),
            "events.jsonl",
            &[
                sample("2019-10-01 00:00:00 UTC", "view", 7, "s-1", None),
                sample("2019-10-01 00:01:00 UTC", "purchase", 7, "s-2", Some(489.07)),
            ],
        );

        let loaded = load_event_records(dir.path(), ActorKeyMode::Session).unwrap();
        assert_eq!(loaded.records.len(), 2);
        assert_eq!(loaded.skipped_lines, 0);
        assert_eq!(loaded.files_read, 1);

        let purchase = &loaded.records[1];
        assert_eq!(purchase.actor_key, "s-2");
        assert_eq!(purchase.event_type, "purchase");
        assert_eq!(purchase.price, Some(489.07));
        assert_eq!(purchase.brand.as_deref(), Some("apple"));
        assert_eq!(
            purchase.category.as_ref().map(|c| c.to_string()).as_deref(),
            Some("electronics.smartphone")
        );
    }

    #[test]
    fn test_load_user_keys() {
        let dir = TempDir::new().unwrap();
        let file = write_jsonl(
            dir.path(),
            "events.jsonl",
            &[sample("2019-10-01 00:00:00 UTC", "view", 541312140, "s-1", None)],
        );

        let loaded = load_event_records(&file, ActorKeyMode::User).unwrap();
        assert_eq!(loaded.records[0].actor_key, "541312140");
    }

    #[test]
    fn test_load_skips_bad_lines_but_keeps_unknown_kinds() {
        let dir = TempDir::new().unwrap();
        let missing_session = serde_json::json!({
            "event_time": "2019-10-01 00:00:00 UTC",
            "event_type": "view",
            "user_id": 1,
        })
        .to_string();
        write_jsonl(
            dir.path(),
            "events.jsonl",
            &[
                "{not json".to_string(),
                String::new(),
                missing_session,
                sample("not a time", "view", 1, "s-1", None),
                sample("2019-10-01 00:00:00 UTC", "remove_from_cart", 1, "s-1", None),
            ],
        );

        let loaded = load_event_records(dir.path(), ActorKeyMode::Session).unwrap();
        assert_eq!(loaded.skipped_lines, 3);
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.records[0].event_type, "remove_from_cart");
    }

    #[test]
    fn test_load_blank_category_and_brand_become_none() {
        let dir = TempDir::new().unwrap();
        let line = serde_json::json!({
            "event_time": "2019-10-01 00:00:00 UTC",
            "event_type": "view",
            "category_code": "",
            "brand": " ",
            "user_session": "s-1",
        })
        .to_string();
        write_jsonl(dir.path(), "events.jsonl", &[line]);

        let loaded = load_event_records(dir.path(), ActorKeyMode::Session).unwrap();
        assert!(loaded.records[0].category.is_none());
        assert!(loaded.records[0].brand.is_none());
    }

    #[test]
    fn test_load_preserves_file_then_line_order() {
        let dir = TempDir::new().unwrap();
        write_jsonl(
            dir.path(),
            "b.jsonl",
            &[sample("2019-10-01 00:00:00 UTC", "cart", 1, "s-b", None)],
        );
        write_jsonl(
            dir.path(),
            "a.jsonl",
            &[
                sample("2019-10-01 00:00:00 UTC", "view", 1, "s-a1", None),
                sample("2019-10-01 00:00:00 UTC", "view", 1, "s-a2", None),
            ],
        );

        let loaded = load_event_records(dir.path(), ActorKeyMode::Session).unwrap();
        let keys: Vec<&str> = loaded.records.iter().map(|r| r.actor_key.as_str()).collect();
        assert_eq!(keys, vec!["s-a1", "s-a2", "s-b"]);
        assert_eq!(loaded.files_read, 2);
    }

    // ── CSV exports ───────────────────────────────────────────────────────────

    #[test]
    fn test_load_csv_export() {
        let dir = TempDir::new().unwrap();
        let csv = [
            CSV_HEADER,
            "2019-11-01 00:00:00 UTC,view,1003461,2053013555631882655,electronics.smartphone,xiaomi,489.07,520088904,4d3b30da-a5e4-49df-b1a8-ba5943f1dd33",
            "2019-11-01 00:00:01 UTC,view,5000088,2053013566100866035,,,293.65,530496790,8e5f4f83-366c-4f70-860e-ca7417414283",
            "2019-11-01 00:00:02 UTC,purchase,1004237,2053013555631882655,electronics.smartphone,apple, 1081.98 ,520088904,4d3b30da-a5e4-49df-b1a8-ba5943f1dd33",
        ]
        .join("\n");
        std::fs::write(dir.path().join("2019-Nov.csv"), csv).unwrap();

        let loaded = load_event_records(dir.path(), ActorKeyMode::Session).unwrap();
        assert_eq!(loaded.records.len(), 3);
        assert_eq!(loaded.skipped_lines, 0);
        assert_eq!(loaded.files_read, 1);

        let first = &loaded.records[0];
        assert_eq!(first.actor_key, "4d3b30da-a5e4-49df-b1a8-ba5943f1dd33");
        assert_eq!(first.brand.as_deref(), Some("xiaomi"));
        assert_eq!(
            first.timestamp,
            Utc.with_ymd_and_hms(2019, 11, 1, 0, 0, 0).unwrap()
        );

        let uncategorized = &loaded.records[1];
        assert!(uncategorized.category.is_none());
        assert!(uncategorized.brand.is_none());

        let purchase = &loaded.records[2];
        assert_eq!(purchase.event_type, "purchase");
        assert_eq!(purchase.price, Some(1081.98));
    }

    #[test]
    fn test_load_csv_user_keys() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("events.csv");
        let csv = [
            CSV_HEADER,
            "2019-11-01 00:00:00 UTC,cart,1,2,,,10.0,541312140,s-1",
        ]
        .join("\n");
        std::fs::write(&file, csv).unwrap();

        let loaded = load_event_records(&file, ActorKeyMode::User).unwrap();
        assert_eq!(loaded.records[0].actor_key, "541312140");
    }

    #[test]
    fn test_load_csv_skips_bad_rows() {
        let dir = TempDir::new().unwrap();
        let csv = [
            CSV_HEADER,
            "not a time,view,1,2,,,1.0,1,s-1",
            "2019-11-01 00:00:00 UTC,view,1,2,,,one dollar,1,s-1",
            "2019-11-01 00:00:00 UTC,view,1,2,,,1.0,1,",
            "2019-11-01 00:00:00 UTC,view,1,2,,,1.0,1,s-1",
        ]
        .join("\n");
        std::fs::write(dir.path().join("events.csv"), csv).unwrap();

        let loaded = load_event_records(dir.path(), ActorKeyMode::Session).unwrap();
        assert_eq!(loaded.skipped_lines, 3);
        assert_eq!(loaded.records.len(), 1);
    }

    #[test]
    fn test_find_event_files_includes_csv() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("2019-Oct.csv"), CSV_HEADER).unwrap();
        std::fs::write(dir.path().join("2019-Nov.jsonl"), "").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();

        let names: Vec<String> = find_event_files(dir.path())
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["2019-Nov.jsonl", "2019-Oct.csv"]);
    }
}
