use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::shared::frame::Frame;

/// Latest-value cell between the capture thread and its readers.
///
/// One writer replaces the stored `Arc<Frame>` wholesale; readers clone the
/// `Arc`. A reader therefore sees either the previous or the new frame, never
/// a mix. There is no queue: frames published between two reads are skipped.
#[derive(Default)]
pub struct FrameSlot {
    latest: RwLock<Option<Arc<Frame>>>,
    published: AtomicU64,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the stored frame and returns the total number published.
    pub fn publish(&self, frame: Frame) -> u64 {
        let frame = Arc::new(frame);
        // A poisoned lock still holds a complete Arc, so keep using it.
        let mut guard = self.latest.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(frame);
        drop(guard);
        self.published.fetch_add(1, Ordering::Release) + 1
    }

    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.latest
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Acquire)
    }
}
