//! Stamp placement and pointer-driven manipulation
//!
//! Stamps live in CSS-pixel page coordinates at the session's current zoom
//! and are always contained within their page. Manipulation never fails:
//! out-of-bounds input is clamped, not rejected. The manipulator is the
//! sole writer of stamp geometry; rendering and export only read it.

use serde::{Deserialize, Serialize};

use crate::session::PageGeometry;

/// Minimum stamp width so the handle stays grabbable
pub const MIN_STAMP_WIDTH: f32 = 24.0;
/// Fixed height/width ratio enforced while resizing
pub const RESIZE_ASPECT: f32 = 0.25;

/// Hit radius of the delete affordance, anchored at the top-right corner
const DELETE_HIT_RADIUS: f32 = 12.0;
/// Side of the square resize handle at the bottom-right corner
const HANDLE_HIT_SIZE: f32 = 14.0;

pub type StampId = u64;

/// A user-placed image overlay anchored to one page
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stamp {
    pub id: StampId,
    pub page_index: usize,
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub image_bytes: Vec<u8>,
}

/// Committed geometry change produced by ending a gesture
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct StampPatch {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// Control affordances of a selected stamp, in hit-test precedence order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Affordance {
    Delete,
    ResizeHandle,
    Body,
}

fn clamp_position(x: f32, y: f32, w: f32, h: f32, page: &PageGeometry) -> (f32, f32) {
    (
        x.clamp(0.0, (page.width_px - w).max(0.0)),
        y.clamp(0.0, (page.height_px - h).max(0.0)),
    )
}

/// All stamps of a session, addressed by stable id
#[derive(Default)]
pub struct StampSet {
    stamps: Vec<Stamp>,
    next_id: StampId,
}

impl StampSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a new stamp, clamped into the page
    pub fn add(
        &mut self,
        page_index: usize,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        image_bytes: Vec<u8>,
        page: &PageGeometry,
    ) -> StampId {
        self.next_id += 1;
        let id = self.next_id;

        let w = w.clamp(MIN_STAMP_WIDTH, page.width_px.max(MIN_STAMP_WIDTH));
        let h = h.min(page.height_px).max(1.0);
        let (x, y) = clamp_position(x, y, w, h, page);

        self.stamps.push(Stamp {
            id,
            page_index,
            x,
            y,
            w,
            h,
            image_bytes,
        });
        id
    }

    #[must_use]
    pub fn get(&self, id: StampId) -> Option<&Stamp> {
        self.stamps.iter().find(|s| s.id == id)
    }

    #[must_use]
    pub fn all(&self) -> &[Stamp] {
        &self.stamps
    }

    pub fn for_page(&self, page_index: usize) -> impl Iterator<Item = &Stamp> {
        self.stamps.iter().filter(move |s| s.page_index == page_index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    /// Apply a committed geometry patch. Position and size only; identity
    /// and page anchoring never change after placement.
    pub fn patch(&mut self, id: StampId, patch: StampPatch) -> bool {
        match self.stamps.iter_mut().find(|s| s.id == id) {
            Some(stamp) => {
                stamp.x = patch.x;
                stamp.y = patch.y;
                stamp.w = patch.w;
                stamp.h = patch.h;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: StampId) -> bool {
        let before = self.stamps.len();
        self.stamps.retain(|s| s.id != id);
        self.stamps.len() != before
    }

    pub fn clear(&mut self) {
        self.stamps.clear();
    }

    /// Rescale every stamp by `factor`, tracking a zoom change of the
    /// owning session's page geometry
    pub fn rescale(&mut self, factor: f32) {
        if !factor.is_finite() || factor <= 0.0 {
            return;
        }
        for stamp in &mut self.stamps {
            stamp.x *= factor;
            stamp.y *= factor;
            stamp.w *= factor;
            stamp.h *= factor;
        }
    }
}

/// Hit-test a pointer position against a stamp and its affordances.
///
/// Control affordances take precedence over the drag gesture on the body;
/// they are only active while the stamp is selected.
#[must_use]
pub fn hit_test(stamp: &Stamp, p: Point, selected: bool) -> Option<Affordance> {
    if selected {
        let (cx, cy) = (stamp.x + stamp.w, stamp.y);
        let (dx, dy) = (p.x - cx, p.y - cy);
        if dx * dx + dy * dy <= DELETE_HIT_RADIUS * DELETE_HIT_RADIUS {
            return Some(Affordance::Delete);
        }

        let (hx, hy) = (stamp.x + stamp.w, stamp.y + stamp.h);
        if (p.x - hx).abs() <= HANDLE_HIT_SIZE / 2.0 && (p.y - hy).abs() <= HANDLE_HIT_SIZE / 2.0 {
            return Some(Affordance::ResizeHandle);
        }
    }

    let inside = p.x >= stamp.x
        && p.x <= stamp.x + stamp.w
        && p.y >= stamp.y
        && p.y <= stamp.y + stamp.h;
    inside.then_some(Affordance::Body)
}

#[derive(Clone, Copy, Debug)]
enum Gesture {
    Drag {
        id: StampId,
        pointer_start: Point,
        origin: Point,
        /// Live translation offset applied visually but not yet committed
        offset: Point,
    },
    Resize {
        id: StampId,
        pointer_start: Point,
        origin_w: f32,
        start: StampPatch,
    },
}

/// Pointer-gesture state: selection plus at most one active drag or resize
#[derive(Default)]
pub struct Manipulator {
    selected: Option<StampId>,
    gesture: Option<Gesture>,
}

impl Manipulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a stamp (or clear the selection). Exactly one stamp is
    /// selected at a time; selection never moves anything.
    pub fn select(&mut self, id: Option<StampId>) {
        self.selected = id;
        self.gesture = None;
    }

    #[must_use]
    pub fn selected(&self) -> Option<StampId> {
        self.selected
    }

    /// Live translation offset of an active drag, for cheap visual feedback
    #[must_use]
    pub fn drag_offset(&self) -> Option<Point> {
        match self.gesture {
            Some(Gesture::Drag { offset, .. }) => Some(offset),
            _ => None,
        }
    }

    pub fn begin_drag(&mut self, set: &StampSet, id: StampId, pointer: Point) -> bool {
        let Some(stamp) = set.get(id) else {
            return false;
        };
        self.selected = Some(id);
        self.gesture = Some(Gesture::Drag {
            id,
            pointer_start: pointer,
            origin: Point {
                x: stamp.x,
                y: stamp.y,
            },
            offset: Point { x: 0.0, y: 0.0 },
        });
        true
    }

    /// Update an active drag. Returns the clamped visual offset; the stamp
    /// itself is not mutated until `end_drag`.
    pub fn update_drag(
        &mut self,
        set: &StampSet,
        page: &PageGeometry,
        pointer: Point,
    ) -> Option<Point> {
        let Some(Gesture::Drag {
            id,
            pointer_start,
            origin,
            ..
        }) = self.gesture
        else {
            return None;
        };
        let stamp = set.get(id)?;

        let (x, y) = clamp_position(
            origin.x + (pointer.x - pointer_start.x),
            origin.y + (pointer.y - pointer_start.y),
            stamp.w,
            stamp.h,
            page,
        );
        let clamped = Point {
            x: x - origin.x,
            y: y - origin.y,
        };
        if let Some(Gesture::Drag { offset, .. }) = &mut self.gesture {
            *offset = clamped;
        }
        Some(clamped)
    }

    /// Fold the drag offset into the stamp via a single patch.
    /// Returns the committed patch, or None when the position is unchanged.
    pub fn end_drag(&mut self, set: &mut StampSet) -> Option<StampPatch> {
        let Some(Gesture::Drag {
            id, origin, offset, ..
        }) = self.gesture.take()
        else {
            return None;
        };
        if offset.x == 0.0 && offset.y == 0.0 {
            return None;
        }
        let stamp = set.get(id)?;
        let patch = StampPatch {
            x: origin.x + offset.x,
            y: origin.y + offset.y,
            w: stamp.w,
            h: stamp.h,
        };
        set.patch(id, patch).then_some(patch)
    }

    pub fn begin_resize(&mut self, set: &StampSet, id: StampId, pointer: Point) -> bool {
        let Some(stamp) = set.get(id) else {
            return false;
        };
        self.selected = Some(id);
        self.gesture = Some(Gesture::Resize {
            id,
            pointer_start: pointer,
            origin_w: stamp.w,
            start: StampPatch {
                x: stamp.x,
                y: stamp.y,
                w: stamp.w,
                h: stamp.h,
            },
        });
        true
    }

    /// Update an active resize, applying the clamped size live.
    ///
    /// Anchored at the top-left corner, aspect locked, bounded by the
    /// page's right and bottom edges and the minimum width.
    pub fn update_resize(
        &mut self,
        set: &mut StampSet,
        page: &PageGeometry,
        pointer: Point,
    ) -> Option<StampPatch> {
        let Some(Gesture::Resize {
            id,
            pointer_start,
            origin_w,
            start,
        }) = self.gesture
        else {
            return None;
        };

        let mut w = origin_w + (pointer.x - pointer_start.x);
        w = w.max(MIN_STAMP_WIDTH);
        w = w.min(page.width_px - start.x);
        // Keep the aspect-locked height inside the bottom edge. When the
        // stamp sits so close to it that even the minimum width would not
        // fit, containment wins over the aspect lock.
        let max_h = page.height_px - start.y;
        w = w.min(max_h / RESIZE_ASPECT).max(MIN_STAMP_WIDTH);
        let h = (w * RESIZE_ASPECT).min(max_h);

        let patch = StampPatch {
            x: start.x,
            y: start.y,
            w,
            h,
        };
        set.patch(id, patch).then_some(patch)
    }

    /// Finish a resize. Returns the final patch when the size changed.
    pub fn end_resize(&mut self, set: &StampSet) -> Option<StampPatch> {
        let Some(Gesture::Resize { id, start, .. }) = self.gesture.take() else {
            return None;
        };
        let stamp = set.get(id)?;
        let patch = StampPatch {
            x: stamp.x,
            y: stamp.y,
            w: stamp.w,
            h: stamp.h,
        };
        (patch != start).then_some(patch)
    }

    /// Delete a stamp, clearing selection and any gesture on it
    pub fn remove(&mut self, set: &mut StampSet, id: StampId) -> bool {
        if self.selected == Some(id) {
            self.selected = None;
        }
        self.gesture = None;
        set.remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: PageGeometry = PageGeometry {
        width_px: 600.0,
        height_px: 800.0,
        scale: 1.0,
    };

    fn contained(stamp: &Stamp, page: &PageGeometry) -> bool {
        stamp.x >= 0.0
            && stamp.y >= 0.0
            && stamp.x + stamp.w <= page.width_px
            && stamp.y + stamp.h <= page.height_px
    }

    fn setup() -> (StampSet, StampId) {
        let mut set = StampSet::new();
        let id = set.add(0, 100.0, 100.0, 120.0, 30.0, vec![1, 2, 3], &PAGE);
        (set, id)
    }

    #[test]
    fn add_clamps_into_the_page() {
        let mut set = StampSet::new();
        let id = set.add(0, 590.0, 790.0, 120.0, 30.0, vec![], &PAGE);
        let stamp = set.get(id).expect("stamp");
        assert!(contained(stamp, &PAGE));
        assert_eq!(stamp.w, 120.0);
    }

    #[test]
    fn ids_stay_stable_and_unique_across_removal() {
        let (mut set, first) = setup();
        let second = set.add(1, 0.0, 0.0, 60.0, 15.0, vec![], &PAGE);
        assert_ne!(first, second);

        set.remove(first);
        let third = set.add(0, 0.0, 0.0, 60.0, 15.0, vec![], &PAGE);
        assert_ne!(second, third);
        assert_ne!(first, third);
    }

    #[test]
    fn drag_offset_is_clamped_at_every_step() {
        let (mut set, id) = setup();
        let mut m = Manipulator::new();
        assert!(m.begin_drag(&set, id, Point { x: 110.0, y: 110.0 }));

        // Wild pointer excursions; the offset must keep the stamp inside.
        for (px, py) in [
            (-500.0, -500.0),
            (2000.0, 50.0),
            (300.0, 5000.0),
            (150.0, 140.0),
        ] {
            let offset = m
                .update_drag(&set, &PAGE, Point { x: px, y: py })
                .expect("offset");
            let stamp = set.get(id).expect("stamp");
            let probe = Stamp {
                x: stamp.x + offset.x,
                y: stamp.y + offset.y,
                ..stamp.clone()
            };
            assert!(contained(&probe, &PAGE), "pointer ({px}, {py})");
        }

        let patch = m.end_drag(&mut set).expect("moved");
        let stamp = set.get(id).expect("stamp");
        assert_eq!((stamp.x, stamp.y), (patch.x, patch.y));
        assert!(contained(stamp, &PAGE));
    }

    #[test]
    fn unmoved_drag_commits_nothing() {
        let (mut set, id) = setup();
        let mut m = Manipulator::new();
        m.begin_drag(&set, id, Point { x: 110.0, y: 110.0 });
        m.update_drag(&set, &PAGE, Point { x: 110.0, y: 110.0 });
        assert_eq!(m.end_drag(&mut set), None);
    }

    #[test]
    fn resize_locks_aspect_and_respects_bounds() {
        let (mut set, id) = setup();
        let mut m = Manipulator::new();
        assert!(m.begin_resize(&set, id, Point { x: 220.0, y: 130.0 }));

        let patch = m
            .update_resize(&mut set, &PAGE, Point { x: 500.0, y: 130.0 })
            .expect("patch");
        assert_eq!(patch.h, patch.w * RESIZE_ASPECT);
        assert!(contained(set.get(id).expect("stamp"), &PAGE));

        // Dragging far past the page edge stays bounded.
        let patch = m
            .update_resize(&mut set, &PAGE, Point { x: 5000.0, y: 130.0 })
            .expect("patch");
        assert!(patch.w <= PAGE.width_px - patch.x);
        assert!(contained(set.get(id).expect("stamp"), &PAGE));

        assert!(m.end_resize(&set).is_some());
    }

    #[test]
    fn resize_enforces_minimum_width() {
        let (mut set, id) = setup();
        let mut m = Manipulator::new();
        m.begin_resize(&set, id, Point { x: 220.0, y: 130.0 });

        let patch = m
            .update_resize(&mut set, &PAGE, Point { x: -400.0, y: 130.0 })
            .expect("patch");
        assert_eq!(patch.w, MIN_STAMP_WIDTH);
        assert_eq!(patch.h, MIN_STAMP_WIDTH * RESIZE_ASPECT);
    }

    #[test]
    fn resize_near_the_bottom_edge_stays_contained() {
        let mut set = StampSet::new();
        // A thin stamp with less bottom-edge room than the minimum width's
        // aspect-locked height implies.
        let id = set.add(0, 100.0, 795.0, 30.0, 5.0, vec![], &PAGE);
        let mut m = Manipulator::new();
        m.begin_resize(&set, id, Point { x: 130.0, y: 799.0 });

        let patch = m
            .update_resize(&mut set, &PAGE, Point { x: 180.0, y: 799.0 })
            .expect("patch");
        assert!(patch.w >= MIN_STAMP_WIDTH);
        assert!(patch.y + patch.h <= PAGE.height_px, "y+h = {}", patch.y + patch.h);
        assert!(contained(set.get(id).expect("stamp"), &PAGE));
    }

    #[test]
    fn unchanged_resize_commits_nothing() {
        let (mut set, id) = setup();
        let mut m = Manipulator::new();
        m.begin_resize(&set, id, Point { x: 220.0, y: 130.0 });
        m.update_resize(&mut set, &PAGE, Point { x: 220.0, y: 130.0 });
        assert_eq!(m.end_resize(&set), None);
    }

    #[test]
    fn selection_is_exclusive_and_does_not_move_stamps() {
        let (mut set, first) = setup();
        let second = set.add(0, 300.0, 300.0, 60.0, 15.0, vec![], &PAGE);
        let before: Vec<Stamp> = set.all().to_vec();

        let mut m = Manipulator::new();
        m.select(Some(first));
        assert_eq!(m.selected(), Some(first));
        m.select(Some(second));
        assert_eq!(m.selected(), Some(second));
        m.select(None);
        assert_eq!(m.selected(), None);

        assert_eq!(set.all(), before.as_slice());
    }

    #[test]
    fn delete_affordance_beats_body_drag() {
        let (set, id) = setup();
        let stamp = set.get(id).expect("stamp");

        // Top-right corner lies both on the delete control and the body.
        let corner = Point {
            x: stamp.x + stamp.w - 2.0,
            y: stamp.y + 2.0,
        };
        assert_eq!(hit_test(stamp, corner, true), Some(Affordance::Delete));
        // Without selection the affordances are hidden.
        assert_eq!(hit_test(stamp, corner, false), Some(Affordance::Body));
    }

    #[test]
    fn resize_handle_beats_body() {
        let (set, id) = setup();
        let stamp = set.get(id).expect("stamp");
        let corner = Point {
            x: stamp.x + stamp.w - 3.0,
            y: stamp.y + stamp.h - 3.0,
        };
        assert_eq!(hit_test(stamp, corner, true), Some(Affordance::ResizeHandle));
        assert_eq!(hit_test(stamp, corner, false), Some(Affordance::Body));
    }

    #[test]
    fn miss_hits_nothing() {
        let (set, id) = setup();
        let stamp = set.get(id).expect("stamp");
        assert_eq!(hit_test(stamp, Point { x: 1.0, y: 1.0 }, true), None);
    }

    #[test]
    fn remove_clears_selection() {
        let (mut set, id) = setup();
        let mut m = Manipulator::new();
        m.select(Some(id));
        assert!(m.remove(&mut set, id));
        assert_eq!(m.selected(), None);
        assert!(set.is_empty());
        assert!(!m.remove(&mut set, id));
    }

    #[test]
    fn rescale_tracks_zoom_changes() {
        let (mut set, id) = setup();
        set.rescale(2.0);
        let stamp = set.get(id).expect("stamp");
        assert_eq!((stamp.x, stamp.y, stamp.w, stamp.h), (200.0, 200.0, 240.0, 60.0));

        set.rescale(0.0); // ignored
        assert_eq!(set.get(id).expect("stamp").w, 240.0);
    }
}
