//! LRU replacement policy over unpinned frames.

use crate::buffer::FrameId;
use hashlink::LinkedHashMap;
use parking_lot::Mutex;

/// Tracks the frames currently eligible for eviction, in
/// least-recently-used order.
///
/// The buffer pool reports a frame here when its pin count drops to
/// zero (`unpin`) and withdraws it when the frame is pinned again or
/// rebound (`pin`). `victim` yields the frame that has been eligible
/// the longest.
///
/// The `LinkedHashMap` gives O(1) membership, removal and LRU pop; the
/// insertion end is the MRU end. `num_pages` only sizes the map — the
/// pool never unpins more frames than it owns.
pub struct LruReplacer {
    eligible: Mutex<LinkedHashMap<FrameId, ()>>,
}

impl LruReplacer {
    /// Create a replacer for a pool of `num_pages` frames
    pub fn new(num_pages: usize) -> Self {
        Self {
            eligible: Mutex::new(LinkedHashMap::with_capacity(num_pages)),
        }
    }

    /// Mark a frame eligible for eviction, as most recently used.
    /// No-op if it is already eligible.
    pub fn unpin(&self, frame_id: FrameId) {
        let mut eligible = self.eligible.lock();
        if !eligible.contains_key(&frame_id) {
            eligible.insert(frame_id, ());
        }
    }

    /// Withdraw a frame from the eligible set. No-op if absent.
    pub fn pin(&self, frame_id: FrameId) {
        self.eligible.lock().remove(&frame_id);
    }

    /// Remove and return the least-recently-used eligible frame
    pub fn victim(&self) -> Option<FrameId> {
        self.eligible.lock().pop_front().map(|(frame_id, ())| frame_id)
    }

    /// Number of currently eligible frames
    pub fn len(&self) -> usize {
        self.eligible.lock().len()
    }

    /// Whether no frame is eligible
    pub fn is_empty(&self) -> bool {
        self.eligible.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_victim_is_lru() {
        let replacer = LruReplacer::new(4);
        replacer.unpin(1);
        replacer.unpin(2);
        replacer.unpin(3);
        assert_eq!(replacer.len(), 3);

        assert_eq!(replacer.victim(), Some(1));
        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), Some(3));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_unpin_twice_keeps_position() {
        let replacer = LruReplacer::new(4);
        replacer.unpin(1);
        replacer.unpin(2);
        // 1 is already eligible; its LRU position must not refresh
        replacer.unpin(1);
        assert_eq!(replacer.len(), 2);
        assert_eq!(replacer.victim(), Some(1));
    }

    #[test]
    fn test_pin_removes() {
        let replacer = LruReplacer::new(4);
        replacer.unpin(1);
        replacer.unpin(2);
        replacer.pin(1);
        assert_eq!(replacer.len(), 1);
        assert_eq!(replacer.victim(), Some(2));

        // pinning an absent frame is a no-op
        replacer.pin(9);
        assert!(replacer.is_empty());
    }

    #[test]
    fn test_unpin_after_victim_is_mru() {
        let replacer = LruReplacer::new(4);
        replacer.unpin(1);
        replacer.unpin(2);
        assert_eq!(replacer.victim(), Some(1));
        replacer.unpin(1);
        // 2 has now been eligible longer than 1
        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), Some(1));
    }
}
