//! Output surfaces and per-surface render sequencing
//!
//! A surface is an addressable bitmap target that composited renders commit
//! to. Each registered surface owns a monotonic sequence counter; a render
//! may only commit if no later render for the same surface was started in
//! the interim. The table is explicit: surfaces register and unregister,
//! nothing is cleaned up behind the owner's back.

use std::collections::HashMap;

use super::Bitmap;

/// Handle to a registered output surface
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceId(u64);

struct Slot {
    /// Latest issued render sequence number
    seq: u64,
    /// Last committed content
    bitmap: Bitmap,
}

/// Registry of output surfaces keyed by id
#[derive(Default)]
pub struct SurfaceTable {
    slots: HashMap<SurfaceId, Slot>,
    next_id: u64,
}

impl SurfaceTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new surface, initially transparent
    pub fn register(&mut self, width: u32, height: u32) -> SurfaceId {
        self.next_id += 1;
        let id = SurfaceId(self.next_id);
        self.slots.insert(
            id,
            Slot {
                seq: 0,
                bitmap: Bitmap::blank(width, height),
            },
        );
        id
    }

    pub fn unregister(&mut self, id: SurfaceId) {
        self.slots.remove(&id);
    }

    /// Reset a surface's content to transparent at a new size.
    /// Bumps the sequence counter so in-flight renders cannot commit stale
    /// content at the old geometry.
    pub fn resize(&mut self, id: SurfaceId, width: u32, height: u32) -> bool {
        match self.slots.get_mut(&id) {
            Some(slot) => {
                slot.seq += 1;
                slot.bitmap = Bitmap::blank(width, height);
                true
            }
            None => false,
        }
    }

    /// Start a render against this surface, claiming the next sequence
    /// number. The returned value must be presented back at commit time.
    pub fn begin(&mut self, id: SurfaceId) -> Option<u64> {
        let slot = self.slots.get_mut(&id)?;
        slot.seq += 1;
        Some(slot.seq)
    }

    /// Commit a finished render. Returns false (and drops the bitmap) if a
    /// later render for this surface was started after `seq` was issued.
    pub fn commit(&mut self, id: SurfaceId, seq: u64, bitmap: Bitmap) -> bool {
        match self.slots.get_mut(&id) {
            Some(slot) if slot.seq == seq => {
                slot.bitmap = bitmap;
                true
            }
            _ => false,
        }
    }

    /// Latest issued sequence number for a surface
    #[must_use]
    pub fn current_seq(&self, id: SurfaceId) -> Option<u64> {
        self.slots.get(&id).map(|slot| slot.seq)
    }

    /// Last committed content of a surface
    #[must_use]
    pub fn content(&self, id: SurfaceId) -> Option<&Bitmap> {
        self.slots.get(&id).map(|slot| &slot.bitmap)
    }

    /// Copy one surface's committed content onto another in a single blit.
    ///
    /// The destination's counter is bumped, so any render still in flight
    /// against it is vetoed rather than overwriting the transferred content.
    pub fn transfer(&mut self, src: SurfaceId, dst: SurfaceId) -> bool {
        let Some(bitmap) = self.slots.get(&src).map(|s| s.bitmap.clone()) else {
            return false;
        };
        match self.slots.get_mut(&dst) {
            Some(slot) => {
                slot.seq += 1;
                slot.bitmap = bitmap;
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
