//! Shared AI-perceived state.
//!
//! The perception service sends partial updates: each present field replaces
//! the stored value wholesale, absent fields leave it untouched. There is one
//! writer ([`PerceptionWriter`], owned by the inbound channel) and any number
//! of readers ([`PerceptionReader`]) that get woken on change and decide for
//! themselves whether their own inputs moved, usually through a [`Memo`].

use crate::types::{Landmarks, PerceivedMetrics, SkinRoi};
use serde::Deserialize;
use tokio::sync::watch;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerceivedState {
    pub metrics: Option<PerceivedMetrics>,
    pub skin_tone: Option<String>,
    pub landmarks: Landmarks,
    pub skin_roi: Option<SkinRoi>,
}

/// One inbound message. Unknown keys (`status`, `message`, ...) are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PerceptionUpdate {
    #[serde(default)]
    pub metrics: Option<PerceivedMetrics>,
    #[serde(default)]
    pub skin_tone: Option<String>,
    #[serde(default)]
    pub landmarks: Option<Landmarks>,
    #[serde(default)]
    pub skin_roi: Option<SkinRoi>,
}

impl PerceptionUpdate {
    pub fn parse(document: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(document)
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_none() && self.skin_tone.is_none() && self.landmarks.is_none() && self.skin_roi.is_none()
    }

    /// Overwrites each present field. Returns true if the state changed.
    pub fn apply_to(self, state: &mut PerceivedState) -> bool {
        let mut changed = false;

        if let Some(metrics) = self.metrics {
            changed |= replace(&mut state.metrics, Some(metrics));
        }
        // an empty label carries no estimate
        if let Some(tone) = self.skin_tone.filter(|t| !t.is_empty()) {
            changed |= replace(&mut state.skin_tone, Some(tone));
        }
        if let Some(landmarks) = self.landmarks {
            changed |= replace(&mut state.landmarks, landmarks);
        }
        if let Some(roi) = self.skin_roi {
            changed |= replace(&mut state.skin_roi, Some(roi));
        }

        changed
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

/// Creates the shared state cell and its single writer.
pub fn perception_store() -> (PerceptionWriter, PerceptionReader) {
    let (tx, rx) = watch::channel(PerceivedState::default());
    (PerceptionWriter { tx }, PerceptionReader { rx })
}

/// Sole mutator of the perceived state. Deliberately not `Clone`.
#[derive(Debug)]
pub struct PerceptionWriter {
    tx: watch::Sender<PerceivedState>,
}

impl PerceptionWriter {
    pub fn apply(&self, update: PerceptionUpdate) -> bool {
        self.tx.send_if_modified(|state| update.apply_to(state))
    }

    pub fn reader(&self) -> PerceptionReader {
        PerceptionReader { rx: self.tx.subscribe() }
    }
}

#[derive(Debug, Clone)]
pub struct PerceptionReader {
    rx: watch::Receiver<PerceivedState>,
}

impl PerceptionReader {
    pub fn snapshot(&self) -> PerceivedState {
        self.rx.borrow().clone()
    }

    /// Waits for the next change. Returns false once the writer is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

/// Remembers the last input a subscriber acted on.
#[derive(Debug, Clone)]
pub struct Memo<T> {
    last: Option<T>,
}

impl<T> Default for Memo<T> {
    fn default() -> Self {
        Self { last: None }
    }
}

impl<T: PartialEq> Memo<T> {
    /// Stores `next` and returns it if it differs from the previous value.
    pub fn update(&mut self, next: T) -> Option<&T> {
        if self.last.as_ref() == Some(&next) {
            return None;
        }
        self.last = Some(next);
        self.last.as_ref()
    }

    pub fn last(&self) -> Option<&T> {
        self.last.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BodyType, Landmark};

    fn seeded() -> (PerceptionWriter, PerceptionReader) {
        let (writer, reader) = perception_store();
        let update = PerceptionUpdate::parse(
            r#"{"metrics":{"body_type":"Ectomorph","ratio":1.05},"skin_tone":"Fair",
                "landmarks":[[11,1,2,0]],"skin_roi":[1,2,3,4]}"#,
        )
        .unwrap();
        assert!(writer.apply(update));
        (writer, reader)
    }

    #[test]
    fn skin_tone_only_leaves_other_fields() {
        let (writer, reader) = seeded();
        let before = reader.snapshot();

        let update = PerceptionUpdate::parse(r#"{"skin_tone":"Wheatish"}"#).unwrap();
        assert!(writer.apply(update));

        let after = reader.snapshot();
        assert_eq!(after.skin_tone.as_deref(), Some("Wheatish"));
        assert_eq!(after.metrics, before.metrics);
        assert_eq!(after.landmarks, before.landmarks);
        assert_eq!(after.skin_roi, before.skin_roi);
    }

    #[test]
    fn metrics_replace_whole_record() {
        let (writer, reader) = seeded();
        let update = PerceptionUpdate::parse(r#"{"metrics":{"body_type":"Mesomorph"}}"#).unwrap();
        writer.apply(update);

        let metrics = reader.snapshot().metrics.unwrap();
        assert_eq!(metrics.body_type, Some(BodyType::Mesomorph));
        // no field-by-field merge
        assert_eq!(metrics.ratio, None);
    }

    #[test]
    fn malformed_documents_are_rejected() {
        assert!(PerceptionUpdate::parse("not json").is_err());
        assert!(PerceptionUpdate::parse(r#"{"skin_roi":[1,2,3]}"#).is_err());
        assert!(PerceptionUpdate::parse(r#"{"landmarks":[[11,1,2]]}"#).is_err());
    }

    #[test]
    fn status_messages_are_no_ops() {
        let (writer, reader) = seeded();
        let before = reader.snapshot();
        let update = PerceptionUpdate::parse(r#"{"status":"searching","message":"Position yourself in frame"}"#).unwrap();
        assert!(update.is_empty());
        assert!(!writer.apply(update));
        assert_eq!(reader.snapshot(), before);
    }

    #[test]
    fn identical_overwrite_reports_no_change() {
        let (writer, _reader) = seeded();
        let update = PerceptionUpdate {
            landmarks: Some(Landmarks::new(vec![Landmark::new(11, 1.0, 2.0, 0.0)])),
            ..Default::default()
        };
        assert!(!writer.apply(update));

        let empty_tone = PerceptionUpdate { skin_tone: Some(String::new()), ..Default::default() };
        assert!(!writer.apply(empty_tone));
    }

    #[tokio::test]
    async fn readers_wake_on_change_and_see_writer_drop() {
        let (writer, mut reader) = perception_store();
        writer.apply(PerceptionUpdate { skin_tone: Some("Dusky".into()), ..Default::default() });
        assert!(reader.changed().await);
        assert_eq!(reader.snapshot().skin_tone.as_deref(), Some("Dusky"));

        drop(writer);
        assert!(!reader.changed().await);
    }

    #[test]
    fn memo_only_reports_changes() {
        let mut memo = Memo::default();
        assert_eq!(memo.update(1), Some(&1));
        assert_eq!(memo.update(1), None);
        assert_eq!(memo.update(2), Some(&2));
        assert_eq!(memo.last(), Some(&2));
    }
}
