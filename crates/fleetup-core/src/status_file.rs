//! Persisted "last checked" record used to throttle update cycles.
//!
//! The first line of the file names what follows it: `timestamp` for a bare
//! check time, `payload` for an encoded payload. Files without a known tag
//! still throttle through their modification time but carry no data.

use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeDelta};
use log::warn;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
const TIMESTAMP_TAG: &str = "timestamp";
const PAYLOAD_TAG: &str = "payload";

#[derive(Debug, Error)]
pub enum StatusFileError {
    #[error("{context} {}: {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode status payload: {details}")]
    Encode { details: String },
}

impl StatusFileError {
    fn io(context: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// How a payload is written to and read from the status file.
pub trait PayloadFormat {
    type Payload;

    /// # Errors
    /// Returns an error when the payload cannot be represented.
    fn encode(payload: &Self::Payload) -> Result<String, String>;

    /// # Errors
    /// Returns an error when `text` is not a valid payload.
    fn decode(text: &str) -> Result<Self::Payload, String>;
}

/// Free-form text, stored verbatim.
#[derive(Debug)]
pub struct RawText;

impl PayloadFormat for RawText {
    type Payload = String;

    fn encode(payload: &String) -> Result<String, String> {
        Ok(payload.clone())
    }

    fn decode(text: &str) -> Result<String, String> {
        Ok(text.to_string())
    }
}

/// Structured payload stored as JSON.
#[derive(Debug)]
pub struct Json<T>(PhantomData<fn() -> T>);

impl<T: Serialize + DeserializeOwned> PayloadFormat for Json<T> {
    type Payload = T;

    fn encode(payload: &T) -> Result<String, String> {
        serde_json::to_string(payload).map_err(|error| error.to_string())
    }

    fn decode(text: &str) -> Result<T, String> {
        serde_json::from_str(text).map_err(|error| error.to_string())
    }
}

/// What the status file currently holds.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusData<T> {
    /// No file yet, or an empty one.
    Empty,
    /// Only the time of the last update was recorded.
    Timestamp(String),
    Payload(T),
}

pub struct StatusFile<F: PayloadFormat = RawText> {
    path: PathBuf,
    updated: Option<DateTime<Local>>,
    data: StatusData<F::Payload>,
}

impl<F: PayloadFormat> StatusFile<F> {
    /// Load the record at `path`.
    ///
    /// A missing file leaves the record unset, so it is never considered
    /// recent. An unreadable or unrecognized file is logged and treated as
    /// holding no data; its modification time still counts as the last check,
    /// and the next [`Self::update`] replaces it.
    #[must_use]
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if !path.exists() {
            return Self {
                path,
                updated: None,
                data: StatusData::Empty,
            };
        }

        let updated = match std::fs::metadata(&path).and_then(|metadata| metadata.modified()) {
            Ok(modified) => Some(DateTime::<Local>::from(modified)),
            Err(error) => {
                warn!("[update] failed to stat {}: {error}", path.display());
                None
            }
        };

        let data = match std::fs::read_to_string(&path) {
            Ok(text) => decode_record::<F>(&text).unwrap_or_else(|details| {
                warn!("[update] ignoring contents of {}: {details}", path.display());
                StatusData::Empty
            }),
            Err(error) => {
                warn!("[update] failed to read {}: {error}", path.display());
                StatusData::Empty
            }
        };

        Self {
            path,
            updated,
            data,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn last_checked_at(&self) -> Option<DateTime<Local>> {
        self.updated
    }

    #[must_use]
    pub fn data(&self) -> &StatusData<F::Payload> {
        &self.data
    }

    #[must_use]
    pub fn payload(&self) -> Option<&F::Payload> {
        match &self.data {
            StatusData::Payload(payload) => Some(payload),
            StatusData::Empty | StatusData::Timestamp(_) => None,
        }
    }

    /// True only when the record is set and strictly less than `window` of
    /// wall-clock time has passed since.
    #[must_use]
    pub fn is_recent_within(&self, window: TimeDelta) -> bool {
        self.is_recent_at(window, Local::now())
    }

    #[must_use]
    pub fn is_recent_within_minutes(&self, minutes: u64) -> bool {
        self.is_recent_within(window(minutes, TimeDelta::try_minutes))
    }

    #[must_use]
    pub fn is_recent_within_hours(&self, hours: u64) -> bool {
        self.is_recent_within(window(hours, TimeDelta::try_hours))
    }

    #[must_use]
    pub fn is_recent_within_days(&self, days: u64) -> bool {
        self.is_recent_within(window(days, TimeDelta::try_days))
    }

    fn is_recent_at(&self, window: TimeDelta, now: DateTime<Local>) -> bool {
        self.updated
            .is_some_and(|updated| now.signed_duration_since(updated) < window)
    }

    /// Stamp the record with the current time and persist it. Without a
    /// payload only the timestamp is written.
    ///
    /// # Errors
    /// Returns an error when the payload cannot be encoded or the file cannot
    /// be written.
    pub fn update(&mut self, payload: Option<F::Payload>) -> Result<(), StatusFileError> {
        let now = Local::now();
        let (text, data) = match payload {
            None => {
                let stamp = now.format(TIMESTAMP_FORMAT).to_string();
                (format!("{TIMESTAMP_TAG}\n{stamp}"), StatusData::Timestamp(stamp))
            }
            Some(payload) => {
                let encoded = F::encode(&payload)
                    .map_err(|details| StatusFileError::Encode { details })?;
                (format!("{PAYLOAD_TAG}\n{encoded}"), StatusData::Payload(payload))
            }
        };

        write_atomic(&self.path, text.as_bytes())?;
        self.updated = Some(now);
        self.data = data;
        Ok(())
    }
}

impl StatusFile<Json<serde_json::Value>> {
    /// Field `name` of a JSON object payload, or `default` when absent.
    #[must_use]
    pub fn data_field_or(&self, name: &str, default: serde_json::Value) -> serde_json::Value {
        self.payload()
            .and_then(|payload| payload.get(name))
            .cloned()
            .unwrap_or(default)
    }
}

fn window(amount: u64, unit: fn(i64) -> Option<TimeDelta>) -> TimeDelta {
    i64::try_from(amount)
        .ok()
        .and_then(unit)
        .unwrap_or(TimeDelta::MAX)
}

fn decode_record<F: PayloadFormat>(text: &str) -> Result<StatusData<F::Payload>, String> {
    if text.trim().is_empty() {
        return Ok(StatusData::Empty);
    }

    let (tag, body) = text.split_once('\n').unwrap_or((text, ""));
    match tag.trim_end_matches('\r') {
        TIMESTAMP_TAG => Ok(StatusData::Timestamp(body.trim().to_string())),
        PAYLOAD_TAG => F::decode(body).map(StatusData::Payload),
        other => Err(format!("unrecognized record tag {other:?}")),
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StatusFileError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)
        .map_err(|error| StatusFileError::io("failed to create directory", parent, error))?;

    let file_name = path
        .file_name()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("status");
    let tmp_path = parent.join(format!(".{file_name}.{}.tmp", std::process::id()));

    let written = std::fs::File::create(&tmp_path).and_then(|mut file| {
        file.write_all(data)?;
        file.sync_all()
    });
    if let Err(error) = written {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(StatusFileError::io("failed to write", &tmp_path, error));
    }

    std::fs::rename(&tmp_path, path).map_err(|error| {
        let _ = std::fs::remove_file(&tmp_path);
        StatusFileError::io("failed to replace", path, error)
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::time::{Duration, SystemTime};

    use chrono::{Local, TimeDelta};
    use serde_json::json;

    use super::{Json, RawText, StatusData, StatusFile};

    fn age_file(path: &Path, age: Duration) {
        let file = std::fs::File::options()
            .write(true)
            .open(path)
            .expect("status should open");
        file.set_modified(SystemTime::now() - age)
            .expect("mtime should be set");
    }

    #[test]
    fn missing_file_is_never_recent() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let status = StatusFile::<RawText>::load(temp.path().join("auto-update"));

        assert!(status.last_checked_at().is_none());
        assert_eq!(status.data(), &StatusData::Empty);
        assert!(!status.is_recent_within_minutes(u64::MAX));
        assert!(!status.is_recent_within_hours(1));
        assert!(!status.is_recent_within_days(365));
    }

    #[test]
    fn update_makes_record_recent() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("auto-update");
        let mut status = StatusFile::<RawText>::load(&path);

        status.update(None).expect("update should persist");

        assert!(status.is_recent_within_hours(1));
        assert!(path.exists());
        assert!(matches!(status.data(), StatusData::Timestamp(_)));
    }

    #[test]
    fn record_expires_once_window_has_elapsed() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let mut status = StatusFile::<RawText>::load(temp.path().join("auto-update"));
        status.update(None).expect("update should persist");

        let window = TimeDelta::hours(2);
        let now = Local::now();
        assert!(status.is_recent_at(window, now));
        assert!(!status.is_recent_at(window, now + window));
        assert!(!status.is_recent_at(window, now + TimeDelta::hours(3)));
    }

    #[test]
    fn zero_window_is_never_recent() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let mut status = StatusFile::<RawText>::load(temp.path().join("auto-update"));
        status.update(None).expect("update should persist");

        assert!(!status.is_recent_within_hours(0));
    }

    #[test]
    fn load_uses_file_modification_time() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("auto-update");
        std::fs::write(&path, "timestamp\n2024-01-01 10:00:00.000000")
            .expect("status should be written");
        age_file(&path, Duration::from_secs(3 * 60 * 60));

        let status = StatusFile::<RawText>::load(&path);

        assert!(!status.is_recent_within_hours(2));
        assert!(status.is_recent_within_hours(4));
        assert!(status.is_recent_within_minutes(200));
        assert!(!status.is_recent_within_minutes(120));
        assert!(status.is_recent_within_days(1));
        assert_eq!(
            status.data(),
            &StatusData::Timestamp("2024-01-01 10:00:00.000000".to_string())
        );
    }

    #[test]
    fn timestamp_written_by_update_reads_back_as_timestamp() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("auto-update");
        StatusFile::<Json<BTreeMap<String, u32>>>::load(&path)
            .update(None)
            .expect("update should persist");

        let reloaded = StatusFile::<Json<BTreeMap<String, u32>>>::load(&path);

        assert!(matches!(reloaded.data(), StatusData::Timestamp(_)));
        assert!(reloaded.payload().is_none());
    }

    #[test]
    fn structured_payload_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("status.json");
        let payload = BTreeMap::from([("bettercap".to_string(), 3_u32), ("pwngrid".to_string(), 1)]);

        let mut status = StatusFile::<Json<BTreeMap<String, u32>>>::load(&path);
        status
            .update(Some(payload.clone()))
            .expect("update should persist");

        let reloaded = StatusFile::<Json<BTreeMap<String, u32>>>::load(&path);
        assert_eq!(reloaded.payload(), Some(&payload));
        assert!(reloaded.is_recent_within_minutes(5));
    }

    #[test]
    fn raw_payload_is_stored_verbatim() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("raw");
        let mut status = StatusFile::<RawText>::load(&path);

        status
            .update(Some("3 handshakes\nlast: wlan0".to_string()))
            .expect("update should persist");

        assert_eq!(
            std::fs::read_to_string(&path).expect("status should be readable"),
            "payload\n3 handshakes\nlast: wlan0"
        );
        let reloaded = StatusFile::<RawText>::load(&path);
        assert_eq!(
            reloaded.payload().map(String::as_str),
            Some("3 handshakes\nlast: wlan0")
        );
    }

    #[test]
    fn timestamp_shaped_payload_stays_a_payload() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("raw");
        StatusFile::<RawText>::load(&path)
            .update(Some("2024-01-01 10:00:00".to_string()))
            .expect("update should persist");

        let reloaded = StatusFile::<RawText>::load(&path);

        assert_eq!(
            reloaded.data(),
            &StatusData::Payload("2024-01-01 10:00:00".to_string())
        );
        assert_eq!(
            reloaded.payload().map(String::as_str),
            Some("2024-01-01 10:00:00")
        );
    }

    #[test]
    fn unreadable_file_loads_empty_but_keeps_throttling() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("auto-update");
        std::fs::write(&path, [0xff_u8, 0xfe, 0x00]).expect("status should be written");

        let mut status = StatusFile::<RawText>::load(&path);

        assert_eq!(status.data(), &StatusData::Empty);
        assert!(status.last_checked_at().is_some());
        assert!(status.is_recent_within_hours(1));

        status.update(None).expect("update should replace the broken file");
        let reloaded = StatusFile::<RawText>::load(&path);
        assert!(matches!(reloaded.data(), StatusData::Timestamp(_)));
    }

    #[test]
    fn undecodable_payload_loads_empty() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("status.json");
        std::fs::write(&path, "payload\n{not-json").expect("status should be written");
        age_file(&path, Duration::from_secs(2 * 60 * 60));

        let status = StatusFile::<Json<serde_json::Value>>::load(&path);

        assert_eq!(status.data(), &StatusData::Empty);
        assert!(status.payload().is_none());
        assert!(!status.is_recent_within_hours(1));
        assert!(status.is_recent_within_hours(3));
    }

    #[test]
    fn untagged_file_loads_empty() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("auto-update");
        std::fs::write(&path, "2024-01-01 10:00:00.000000").expect("status should be written");

        let status = StatusFile::<RawText>::load(&path);

        assert_eq!(status.data(), &StatusData::Empty);
        assert!(status.is_recent_within_minutes(5));
    }

    #[test]
    fn data_field_or_falls_back_to_default() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("status.json");
        let mut status = StatusFile::<Json<serde_json::Value>>::load(&path);

        assert_eq!(status.data_field_or("count", json!(0)), json!(0));

        status
            .update(Some(json!({ "count": 4 })))
            .expect("update should persist");
        assert_eq!(status.data_field_or("count", json!(0)), json!(4));
        assert_eq!(status.data_field_or("missing", json!("n/a")), json!("n/a"));
    }

    #[test]
    fn update_leaves_no_temp_files_behind() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("auto-update");
        std::fs::write(&path, "stale").expect("status should be written");

        let mut status = StatusFile::<RawText>::load(&path);
        status.update(None).expect("update should persist");

        let leftovers = std::fs::read_dir(temp.path())
            .expect("read temp dir entries")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
        assert_ne!(
            std::fs::read_to_string(&path).expect("status should be readable"),
            "stale"
        );
    }
}
