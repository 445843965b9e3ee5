//! Transition egress - appends fence transitions to file
//!
//! Events are written in JSONL format (one JSON object per line)
//! to the file specified in config.

use crate::domain::types::TransitionEvent;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, info};

/// Egress writer for transition events
pub struct Egress {
    file_path: String,
}

impl Egress {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "egress_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Write an event to the egress file
    /// Returns true if successful, false otherwise
    pub fn write_event(&self, event: &TransitionEvent) -> bool {
        let line = match event.to_json() {
            Ok(line) => line,
            Err(e) => {
                error!(event_id = %event.event_id, error = %e, "transition_serialize_failed");
                return false;
            }
        };

        match self.append_line(&line) {
            Ok(()) => {
                debug!(
                    event_id = %event.event_id,
                    device_id = %event.device_id,
                    fence_id = %event.fence_id,
                    kind = %event.kind,
                    "transition_egressed"
                );
                true
            }
            Err(e) => {
                error!(event_id = %event.event_id, error = %e, "transition_egress_failed");
                false
            }
        }
    }

    /// Append a line to the egress file
    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    /// Write multiple events, returning how many were written
    pub fn write_events(&self, events: &[TransitionEvent]) -> usize {
        events.iter().filter(|event| self.write_event(event)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{AssetId, DeviceId, FenceId, TrackingPoint, TransitionKind};
    use chrono::{TimeZone, Utc};
    use std::fs;
    use tempfile::tempdir;

    fn event(kind: TransitionKind) -> TransitionEvent {
        let point = TrackingPoint::new(
            DeviceId::new("gps-1"),
            AssetId::new("truck-7"),
            1.5,
            2.5,
            Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        );
        TransitionEvent::new(FenceId(3), kind, point)
    }

    #[test]
    fn test_egress_new() {
        let egress = Egress::new("test.jsonl");
        assert_eq!(egress.file_path, "test.jsonl");
    }

    #[test]
    fn test_write_event() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("transitions.jsonl");
        let egress = Egress::new(file_path.to_str().unwrap());

        let event = event(TransitionKind::Entered);
        assert!(egress.write_event(&event));

        let content = fs::read_to_string(&file_path).unwrap();
        assert!(content.ends_with('\n'));

        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(parsed["event_id"], event.event_id.to_string());
        assert_eq!(parsed["kind"], "entered");
        assert_eq!(parsed["fence_id"], 3);
        assert_eq!(parsed["device_id"], "gps-1");
        assert_eq!(parsed["asset_id"], "truck-7");
    }

    #[test]
    fn test_unwritable_path_counts_as_failure() {
        let dir = tempdir().unwrap();
        // A directory cannot be opened for append
        let egress = Egress::new(dir.path().to_str().unwrap());

        let events = vec![event(TransitionKind::Entered), event(TransitionKind::Exited)];
        assert!(!egress.write_event(&events[0]));
        assert_eq!(egress.write_events(&events), 0);
    }

    #[test]
    fn test_written_line_matches_event_json() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("transitions.jsonl");
        let egress = Egress::new(file_path.to_str().unwrap());

        let event = event(TransitionKind::Entered);
        assert!(egress.write_event(&event));
        let content = fs::read_to_string(&file_path).unwrap();
        assert_eq!(content.trim_end(), event.to_json().unwrap());
        assert_ne!(content.trim_end(), "{}");
    }

    #[test]
    fn test_write_events_batch() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("transitions.jsonl");
        let egress = Egress::new(file_path.to_str().unwrap());

        let events = vec![event(TransitionKind::Entered), event(TransitionKind::Exited)];
        assert_eq!(egress.write_events(&events), 2);

        let content = fs::read_to_string(&file_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let back: TransitionEvent = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(back, events[1]);
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let nested_path = dir.path().join("nested").join("dir").join("transitions.jsonl");
        let egress = Egress::new(nested_path.to_str().unwrap());

        assert!(egress.write_event(&event(TransitionKind::Entered)));
        assert!(nested_path.exists());
    }

    #[test]
    fn test_append_mode() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("transitions.jsonl");
        fs::write(&file_path, "{\"existing\":\"data\"}\n").unwrap();

        let egress = Egress::new(file_path.to_str().unwrap());
        let event = event(TransitionKind::Exited);
        egress.write_event(&event);

        let content = fs::read_to_string(&file_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("existing"));
        assert!(lines[1].contains(&event.event_id.to_string()));
    }
}
