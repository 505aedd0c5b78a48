//! Upload progress reporting.

use bridge_traits::HostValue;
use serde::{Deserialize, Serialize};

/// One progress report for a file in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub total_bytes: u64,
    pub completed_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressEvent {
    pub fn new(total_bytes: u64, completed_bytes: u64) -> Self {
        Self {
            total_bytes,
            completed_bytes,
            filename: None,
            object_url: None,
            error: None,
        }
    }

    /// Parses the arguments of a progress channel invocation.
    ///
    /// Accepts `(total, completed, error)` and
    /// `(total, completed, filename, objectUrl, error)`.
    pub fn from_args(args: &[HostValue]) -> Option<Self> {
        let total_bytes = byte_count(args.first()?)?;
        let completed_bytes = byte_count(args.get(1)?)?;

        let (filename, object_url, error) = if args.len() >= 4 {
            (
                text(args.get(2)),
                text(args.get(3)),
                text(args.get(4)),
            )
        } else {
            (None, None, text(args.get(2)))
        };

        Some(Self {
            total_bytes,
            completed_bytes,
            filename,
            object_url,
            error,
        })
    }

    /// Completion ratio in `[0, 100]`.
    pub fn percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.completed_bytes.min(self.total_bytes) as f64 / self.total_bytes as f64) * 100.0
    }

    pub fn is_complete(&self) -> bool {
        self.total_bytes > 0 && self.completed_bytes >= self.total_bytes
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Receives progress for one upload job.
pub trait ProgressCallback: Send + Sync {
    fn on_progress(&self, event: ProgressEvent);
}

impl<F> ProgressCallback for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: ProgressEvent) {
        self(event)
    }
}

fn byte_count(value: &HostValue) -> Option<u64> {
    let n = value.as_f64()?;
    (n.is_finite() && n >= 0.0).then(|| n.trunc() as u64)
}

fn text(value: Option<&HostValue>) -> Option<String> {
    let value = value?;
    if !value.is_truthy() {
        return None;
    }
    Some(match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_form() {
        let event = ProgressEvent::from_args(&[
            HostValue::from(100u64),
            HostValue::from(40u64),
            HostValue::from(""),
        ])
        .unwrap();
        assert_eq!(event, ProgressEvent::new(100, 40));
        assert_eq!(event.percent(), 40.0);
    }

    #[test]
    fn test_extended_form() {
        let event = ProgressEvent::from_args(&[
            HostValue::from(100u64),
            HostValue::from(100u64),
            HostValue::from("clip.mp4"),
            HostValue::from("blob:1"),
            HostValue::from("blobber timeout"),
        ])
        .unwrap();
        assert_eq!(event.filename.as_deref(), Some("clip.mp4"));
        assert_eq!(event.object_url.as_deref(), Some("blob:1"));
        assert_eq!(event.error.as_deref(), Some("blobber timeout"));
        assert!(event.is_complete());
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(ProgressEvent::from_args(&[]).is_none());
        assert!(ProgressEvent::from_args(&[HostValue::from("x"), HostValue::from(1u64)]).is_none());
        assert!(ProgressEvent::from_args(&[HostValue::from(-1i64), HostValue::from(1u64)]).is_none());
    }
}
