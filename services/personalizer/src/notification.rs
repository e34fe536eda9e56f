use percent_encoding::percent_decode_str;
use serde::Deserialize;
use thiserror::Error;

/// Errors raised while reading a notification. Always fatal to the run.
#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("No records found in event")]
    NoRecords,

    #[error("Malformed notification: {0}")]
    Malformed(String),
}

/// Location of the object that arrived
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLocation {
    /// Bucket name
    pub container_id: String,
    /// Percent-decoded object key
    pub object_key: String,
}

#[derive(Debug, Deserialize)]
struct EventNotification {
    #[serde(rename = "Records", default)]
    records: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct EventRecord {
    s3: S3Entity,
}

#[derive(Debug, Deserialize)]
struct S3Entity {
    bucket: BucketEntity,
    object: ObjectEntity,
}

#[derive(Debug, Deserialize)]
struct BucketEntity {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ObjectEntity {
    key: String,
}

impl FileLocation {
    /// Read the file location from a raw notification payload
    pub fn from_notification(payload: &serde_json::Value) -> Result<Self, NotificationError> {
        let notification = EventNotification::deserialize(payload)
            .map_err(|e| NotificationError::Malformed(e.to_string()))?;

        let first = notification
            .records
            .into_iter()
            .next()
            .ok_or(NotificationError::NoRecords)?;

        let record = EventRecord::deserialize(first)
            .map_err(|e| NotificationError::Malformed(e.to_string()))?;

        Ok(Self {
            container_id: record.s3.bucket.name,
            object_key: decode_object_key(&record.s3.object.key),
        })
    }
}

/// Percent-decode an object key. `+` is kept literally.
fn decode_object_key(key: &str) -> String {
    percent_decode_str(key).decode_utf8_lossy().into_owned()
}
