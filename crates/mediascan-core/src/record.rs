//! Boundary record types: probed files and volume capacity snapshots.
//!
//! Both records can be built from a loosely-typed key-value source (a
//! `serde_json::Value` or a JSON string). Construction coerces numeric
//! strings and integral floats, rejects values that cannot be represented,
//! and enforces the record invariants.

use std::path::{Path, PathBuf};

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RecordError;

/// Metadata for one regular file matched by a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct FileInfo {
    /// Path of the file; unique within one scan.
    pub path: PathBuf,
    /// Size in bytes at probe time.
    pub size: u64,
    /// Playable duration in seconds (0 when unknown).
    pub duration: f64,
    /// Container tag, empty when undetermined.
    pub format: CompactString,
    /// Primary stream codec tag, empty when undetermined.
    pub codec: CompactString,
    /// Primary video width in pixels (0 when not applicable).
    pub width: u32,
    /// Primary video height in pixels (0 when not applicable).
    pub height: u32,
}

impl FileInfo {
    /// Create a record with only path and size known.
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
            duration: 0.0,
            format: CompactString::default(),
            codec: CompactString::default(),
            width: 0,
            height: 0,
        }
    }

    /// Set the container tag.
    pub fn with_format(mut self, format: impl Into<CompactString>) -> Self {
        self.format = format.into();
        self
    }

    /// Set the primary stream codec tag.
    pub fn with_codec(mut self, codec: impl Into<CompactString>) -> Self {
        self.codec = codec.into();
        self
    }

    /// Set the duration. Negative or non-finite values become 0.
    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = if seconds.is_finite() && seconds > 0.0 {
            seconds
        } else {
            0.0
        };
        self
    }

    /// Set the video dimensions. Both are zeroed unless both are known.
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        if width > 0 && height > 0 {
            self.width = width;
            self.height = height;
        } else {
            self.width = 0;
            self.height = 0;
        }
        self
    }

    /// Whether the file was classified as a media container.
    pub fn is_media(&self) -> bool {
        !self.format.is_empty()
    }

    /// Whether a video stream with known dimensions was found.
    pub fn has_video(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Build from a JSON document (an object, or a string holding one).
    pub fn from_json_str(source: &str) -> Result<Self, RecordError> {
        Self::try_from(serde_json::from_str::<Value>(source)?)
    }

    fn from_fields(fields: &Fields<'_>) -> Result<Self, RecordError> {
        let width = fields.u32("width")?;
        let height = fields.u32("height")?;
        if (width > 0) != (height > 0) {
            return Err(RecordError::invalid(
                "width",
                format!("dimensions must both be set or both be zero ({width}x{height})"),
            ));
        }

        let duration = fields.f64("duration")?;
        let format = fields.string("format")?;
        if duration > 0.0 && format.is_empty() {
            return Err(RecordError::invalid(
                "duration",
                format!("{duration}s given for a file with no recognized format"),
            ));
        }

        Ok(Self {
            path: fields.path()?,
            size: fields.u64("size")?,
            duration,
            format: format.into(),
            codec: fields.string("codec")?.into(),
            width,
            height,
        })
    }
}

impl TryFrom<Value> for FileInfo {
    type Error = RecordError;

    fn try_from(source: Value) -> Result<Self, Self::Error> {
        with_object(&source, Self::from_fields)
    }
}

/// Capacity snapshot of one storage volume.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct MountPoint {
    /// Mount root of the volume.
    pub path: PathBuf,
    /// Total capacity in bytes.
    pub total: u64,
    /// Bytes available to unprivileged users.
    pub available: u64,
    /// Bytes in use (`total - available`).
    pub used: u64,
}

impl MountPoint {
    /// Create a snapshot. `available` is clamped to `total`.
    pub fn new(path: impl Into<PathBuf>, total: u64, available: u64) -> Self {
        let available = available.min(total);
        Self {
            path: path.into(),
            total,
            available,
            used: total - available,
        }
    }

    /// Placeholder for a volume whose capacity could not be queried.
    pub fn unavailable(path: impl Into<PathBuf>) -> Self {
        Self::new(path, 0, 0)
    }

    /// Whether this snapshot carries real capacity figures.
    pub fn is_known(&self) -> bool {
        self.total > 0
    }

    /// Fraction of the volume in use, in `0.0..=1.0`.
    pub fn usage_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.used as f64 / self.total as f64
        }
    }

    /// Check whether a path lies on this volume by prefix.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.path)
    }

    /// Build from a JSON document (an object, or a string holding one).
    pub fn from_json_str(source: &str) -> Result<Self, RecordError> {
        Self::try_from(serde_json::from_str::<Value>(source)?)
    }

    fn from_fields(fields: &Fields<'_>) -> Result<Self, RecordError> {
        let total = fields.u64("total")?;
        let available = fields.u64("available")?;
        if available > total {
            return Err(RecordError::invalid(
                "available",
                format!("{available} exceeds total {total}"),
            ));
        }

        let used = match fields.get("used") {
            None => total - available,
            Some(_) => {
                let used = fields.u64("used")?;
                if used > total {
                    return Err(RecordError::invalid(
                        "used",
                        format!("{used} exceeds total {total}"),
                    ));
                }
                used
            }
        };

        Ok(Self {
            path: fields.path()?,
            total,
            available,
            used,
        })
    }
}

impl TryFrom<Value> for MountPoint {
    type Error = RecordError;

    fn try_from(source: Value) -> Result<Self, Self::Error> {
        with_object(&source, Self::from_fields)
    }
}

/// Unwrap an object source, parsing one level of JSON-in-a-string.
fn with_object<T>(
    source: &Value,
    build: impl FnOnce(&Fields<'_>) -> Result<T, RecordError>,
) -> Result<T, RecordError> {
    match source {
        Value::Object(map) => build(&Fields(map)),
        Value::String(text) => match serde_json::from_str::<Value>(text)? {
            Value::Object(map) => build(&Fields(&map)),
            other => Err(RecordError::NotAnObject {
                found: type_name(&other),
            }),
        },
        other => Err(RecordError::NotAnObject {
            found: type_name(other),
        }),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Field accessors with coercion. Null is treated as absent.
struct Fields<'a>(&'a Map<String, Value>);

impl Fields<'_> {
    fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field).filter(|v| !v.is_null())
    }

    fn path(&self) -> Result<PathBuf, RecordError> {
        match self.get("path") {
            None => Err(RecordError::MissingField { field: "path" }),
            Some(Value::String(s)) if !s.is_empty() => Ok(PathBuf::from(s)),
            Some(Value::String(_)) => Err(RecordError::invalid("path", "empty path")),
            Some(other) => Err(RecordError::invalid(
                "path",
                format!("expected string, found {}", type_name(other)),
            )),
        }
    }

    fn string(&self, field: &'static str) -> Result<String, RecordError> {
        match self.get(field) {
            None => Ok(String::new()),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(other) => Err(RecordError::invalid(
                field,
                format!("expected string, found {}", type_name(other)),
            )),
        }
    }

    fn f64(&self, field: &'static str) -> Result<f64, RecordError> {
        let value = match self.get(field) {
            None => return Ok(0.0),
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            Some(other) => {
                return Err(RecordError::invalid(
                    field,
                    format!("expected number, found {}", type_name(other)),
                ));
            }
        };

        match value {
            Some(v) if v.is_finite() && v >= 0.0 => Ok(v),
            Some(v) => Err(RecordError::invalid(
                field,
                format!("{v} is not a non-negative finite number"),
            )),
            None => Err(RecordError::invalid(field, "not a number")),
        }
    }

    fn u64(&self, field: &'static str) -> Result<u64, RecordError> {
        let value = match self.get(field) {
            None => return Ok(0),
            Some(v) => v,
        };

        if let Value::Number(n) = value {
            if let Some(u) = n.as_u64() {
                return Ok(u);
            }
        }
        if let Value::String(s) = value {
            if let Ok(u) = s.trim().parse::<u64>() {
                return Ok(u);
            }
        }

        // Integral floats ("1920.0", 1.5e3) are accepted; fractions are not.
        let float = self.f64(field)?;
        if float.fract() != 0.0 || float > u64::MAX as f64 {
            return Err(RecordError::invalid(
                field,
                format!("{float} is not a non-negative integer"),
            ));
        }
        Ok(float as u64)
    }

    fn u32(&self, field: &'static str) -> Result<u32, RecordError> {
        let value = self.u64(field)?;
        u32::try_from(value)
            .map_err(|_| RecordError::invalid(field, format!("{value} is out of range")))
    }
}
