use parking_lot::RwLock;
use serde::Serialize;

/// The most recently accepted frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatestFrame {
    pub filename: String,
    pub timestamp: String,
}

/// In-process register holding the latest frame pointer.
///
/// Every `set` replaces the held record regardless of its timestamp; readers
/// see either the previous record or the new one, never a mix of the two.
#[derive(Debug, Default)]
pub struct LatestRegister {
    inner: RwLock<Option<LatestFrame>>,
}

impl LatestRegister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held record
    pub fn set(&self, filename: impl Into<String>, timestamp: impl Into<String>) {
        let record = LatestFrame {
            filename: filename.into(),
            timestamp: timestamp.into(),
        };
        *self.inner.write() = Some(record);
    }

    /// Snapshot of the held record, if any upload has completed
    pub fn get(&self) -> Option<LatestFrame> {
        self.inner.read().clone()
    }
}
