use std::collections::BTreeMap;

use serde_json::json;

use crate::logging::{LogLevel, Logger, emit, json_kv};

use super::SignalKind;

/// Platform hook that adds or removes the listener for one signal family.
pub trait SignalSource: Send {
    fn attach(&mut self, kind: SignalKind);
    fn detach(&mut self, kind: SignalKind);
}

/// Source for hosts that push every signal unconditionally.
#[derive(Debug, Default)]
pub struct NullSignalSource;

impl SignalSource for NullSignalSource {
    fn attach(&mut self, _kind: SignalKind) {}
    fn detach(&mut self, _kind: SignalKind) {}
}

/// One row of the table: the listener's state and how often it was toggled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Subscription {
    pub attached: bool,
    pub attaches: u64,
    pub detaches: u64,
}

/// Listener lifecycle keyed by signal family. Every attach has exactly one
/// matching detach; attaching an attached family is a no-op.
pub struct SubscriptionTable {
    entries: BTreeMap<SignalKind, Subscription>,
    source: Box<dyn SignalSource>,
    logger: Option<Logger>,
}

impl Default for SubscriptionTable {
    fn default() -> Self {
        Self::new(NullSignalSource)
    }
}

impl SubscriptionTable {
    pub fn new<S>(source: S) -> Self
    where
        S: SignalSource + 'static,
    {
        Self {
            entries: BTreeMap::new(),
            source: Box::new(source),
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: Option<Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn set_source<S>(&mut self, source: S)
    where
        S: SignalSource + 'static,
    {
        self.detach_all();
        self.source = Box::new(source);
    }

    /// Attach each family not yet attached. Returns how many were newly attached.
    pub fn attach_all(&mut self, kinds: impl IntoIterator<Item = SignalKind>) -> usize {
        let mut attached = 0;
        for kind in kinds {
            let entry = self.entries.entry(kind).or_default();
            if entry.attached {
                continue;
            }
            self.source.attach(kind);
            entry.attached = true;
            entry.attaches += 1;
            attached += 1;
        }
        if attached > 0 {
            emit(
                self.logger.as_ref(),
                LogLevel::Debug,
                "vigil::monitor.subscriptions",
                "listeners_attached",
                [json_kv("count", json!(attached))],
            );
        }
        attached
    }

    /// Detach every attached family. Returns how many were detached.
    pub fn detach_all(&mut self) -> usize {
        let mut detached = 0;
        for (kind, entry) in self.entries.iter_mut() {
            if !entry.attached {
                continue;
            }
            self.source.detach(*kind);
            entry.attached = false;
            entry.detaches += 1;
            detached += 1;
        }
        if detached > 0 {
            emit(
                self.logger.as_ref(),
                LogLevel::Debug,
                "vigil::monitor.subscriptions",
                "listeners_detached",
                [json_kv("count", json!(detached))],
            );
        }
        detached
    }

    pub fn is_attached(&self, kind: SignalKind) -> bool {
        self.entries.get(&kind).is_some_and(|e| e.attached)
    }

    pub fn attached_kinds(&self) -> Vec<SignalKind> {
        self.entries
            .iter()
            .filter(|(_, e)| e.attached)
            .map(|(k, _)| *k)
            .collect()
    }

    pub fn get(&self, kind: SignalKind) -> Option<Subscription> {
        self.entries.get(&kind).copied()
    }

    /// True when every attach has been matched by a detach.
    pub fn is_balanced(&self) -> bool {
        self.entries
            .values()
            .all(|e| !e.attached && e.attaches == e.detaches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSignals;

    #[test]
    fn attach_is_not_duplicated() {
        let source = RecordingSignals::default();
        let mut table = SubscriptionTable::new(source.clone());

        assert_eq!(table.attach_all([SignalKind::Keyboard, SignalKind::Focus]), 2);
        assert_eq!(table.attach_all([SignalKind::Keyboard]), 0);

        assert!(table.is_attached(SignalKind::Keyboard));
        assert_eq!(source.attached(), vec![SignalKind::Keyboard, SignalKind::Focus]);
        assert_eq!(table.get(SignalKind::Keyboard).unwrap().attaches, 1);
    }

    #[test]
    fn detach_matches_every_attach() {
        let source = RecordingSignals::default();
        let mut table = SubscriptionTable::new(source.clone());
        table.attach_all(SignalKind::ALL);
        assert!(!table.is_balanced());

        assert_eq!(table.detach_all(), SignalKind::ALL.len());
        assert_eq!(table.detach_all(), 0);

        assert!(table.is_balanced());
        assert!(table.attached_kinds().is_empty());
        assert_eq!(source.detached().len(), SignalKind::ALL.len());
    }

    #[test]
    fn repeated_sessions_stay_balanced() {
        let source = RecordingSignals::default();
        let mut table = SubscriptionTable::new(source.clone());
        for _ in 0..3 {
            table.attach_all([SignalKind::Visibility, SignalKind::Fullscreen]);
            table.detach_all();
        }
        let row = table.get(SignalKind::Visibility).unwrap();
        assert_eq!((row.attaches, row.detaches), (3, 3));
        assert!(table.is_balanced());
        assert_eq!(source.attached().len(), source.detached().len());
    }

    #[test]
    fn replacing_source_detaches_from_old_one() {
        let old = RecordingSignals::default();
        let mut table = SubscriptionTable::new(old.clone());
        table.attach_all([SignalKind::Focus]);
        table.set_source(NullSignalSource);
        assert_eq!(old.detached(), vec![SignalKind::Focus]);
        assert!(table.is_balanced());
    }
}
