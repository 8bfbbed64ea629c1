use crate::pipeline::dirty::DirtyRegion;
use crate::pipeline::messages::SurfaceSize;
use crate::pipeline::paint::{FlipResult, PaintRing, RenderBuffer};
use crate::pipeline::popup::{composite, PopupState};
use anyhow::{anyhow, Result};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

#[derive(Debug, Default)]
pub enum ScreenshotState {
    #[default]
    Idle,
    Pending {
        deadline: Option<Instant>,
    },
    Ready(RenderBuffer),
}

/// Paint state of one surface. Pixel writes happen on the engine thread;
/// the host reads flipped slots and screenshots under the same lock.
#[derive(Debug)]
pub struct SurfacePaint {
    ring: PaintRing,
    popup: PopupState,
    // Area the popup occupied in the last presented frame.
    popup_covered: DirtyRegion,
    screenshot: ScreenshotState,
}

impl SurfacePaint {
    pub fn new(depth: usize, width: u32, height: u32) -> Self {
        Self {
            ring: PaintRing::new(depth, width, height),
            popup: PopupState::default(),
            popup_covered: DirtyRegion::clean(),
            screenshot: ScreenshotState::Idle,
        }
    }

    pub fn ring(&self) -> &PaintRing {
        &self.ring
    }

    pub fn ring_mut(&mut self) -> &mut PaintRing {
        &mut self.ring
    }

    pub fn popup(&self) -> &PopupState {
        &self.popup
    }

    pub fn size(&self) -> SurfaceSize {
        let (width, height) = self.ring.main().size();
        SurfaceSize { width, height }
    }

    pub fn apply_paint(
        &mut self,
        rects: &[DirtyRegion],
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<DirtyRegion> {
        self.ring.apply_paint(rects, pixels, width, height)
    }

    fn popup_area(&self) -> DirtyRegion {
        let (width, height) = self.ring.main().size();
        self.popup.covered_region(width, height)
    }

    pub fn show_popup(&mut self, visible: bool) {
        if !visible {
            self.hide_popup();
            return;
        }
        self.popup.show(true);
        if self.popup.is_paintable() {
            let area = self.popup_area();
            self.ring.mark_dirty(area);
        }
    }

    /// Hides the popup and schedules a repaint of everything it covered.
    pub fn hide_popup(&mut self) {
        let uncovered = self.popup_covered.union(self.popup_area());
        self.popup.show(false);
        self.popup_covered = DirtyRegion::clean();
        self.ring.mark_dirty(uncovered);
    }

    pub fn resize_popup(&mut self, x: i32, y: i32, width: u32, height: u32) {
        let before = self.popup_area();
        self.popup.set_rect(x, y, width, height);
        if self.popup.visible {
            let after = self.popup_area();
            self.ring.mark_dirty(before.union(after));
        }
    }

    pub fn paint_popup(&mut self, pixels: &[u8]) {
        self.popup.set_pixels(pixels);
        if self.popup.is_paintable() {
            let area = self.popup_area();
            self.ring.mark_dirty(area);
        } else if self.popup.visible {
            tracing::debug!(
                width = self.popup.width,
                height = self.popup.height,
                bytes = pixels.len(),
                "popup pixels do not cover reported size"
            );
        }
    }

    /// Flips the ring and draws the popup over the published slot. The popup
    /// area is marked stale in every slot, the published one included, since
    /// the slot no longer mirrors the main buffer there.
    pub fn present(&mut self) -> Option<FlipResult> {
        let flip = self.ring.flip()?;
        let mut region = flip.region;
        let covered = match self.ring.slot_mut(flip.slot) {
            Some(slot) => composite(slot, &self.popup),
            None => None,
        };
        if let Some(covered) = covered {
            self.ring.mark_slots_dirty(covered);
            region = region.union(covered);
        }
        self.popup_covered = covered.unwrap_or_default();
        Some(FlipResult {
            slot: flip.slot,
            region,
        })
    }

    pub fn request_screenshot(&mut self, deadline: Option<Instant>) {
        self.screenshot = ScreenshotState::Pending { deadline };
    }

    pub fn screenshot_pending(&self) -> bool {
        matches!(self.screenshot, ScreenshotState::Pending { .. })
    }

    /// Abandons a pending screenshot whose deadline has passed.
    pub fn expire_screenshot(&mut self, now: Instant) -> bool {
        let expired = matches!(
            self.screenshot,
            ScreenshotState::Pending { deadline: Some(deadline) } if now >= deadline
        );
        if expired {
            self.screenshot = ScreenshotState::Idle;
        }
        expired
    }

    /// Captures the main buffer with the popup on top, if a screenshot was
    /// requested.
    pub fn capture_screenshot(&mut self) -> Option<SurfaceSize> {
        if !self.screenshot_pending() {
            return None;
        }
        let mut shot = self.ring.main().clone();
        composite(&mut shot, &self.popup);
        shot.take_pending();
        let size = SurfaceSize {
            width: shot.width(),
            height: shot.height(),
        };
        self.screenshot = ScreenshotState::Ready(shot);
        Some(size)
    }

    pub fn take_screenshot(&mut self) -> Option<RenderBuffer> {
        match std::mem::take(&mut self.screenshot) {
            ScreenshotState::Ready(shot) => Some(shot),
            other => {
                self.screenshot = other;
                None
            }
        }
    }
}

/// Per-surface state shared by the host and the engine thread.
#[derive(Debug)]
pub struct SurfaceShared {
    paint: Mutex<SurfacePaint>,
}

impl SurfaceShared {
    pub fn new(depth: usize, width: u32, height: u32) -> Self {
        Self {
            paint: Mutex::new(SurfacePaint::new(depth, width, height)),
        }
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, SurfacePaint>> {
        self.paint
            .lock()
            .map_err(|_| anyhow!("surface paint lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::paint::byte_len;
    use std::time::Duration;

    fn frame(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
        rgba.iter()
            .copied()
            .cycle()
            .take(byte_len(width, height))
            .collect()
    }

    fn painted_surface() -> SurfacePaint {
        let mut paint = SurfacePaint::new(2, 8, 8);
        paint
            .apply_paint(&[DirtyRegion::full(8, 8)], &frame(8, 8, [10, 10, 10, 255]), 8, 8)
            .expect("paint");
        paint
    }

    #[test]
    fn present_composites_popup_without_touching_main() {
        let mut paint = painted_surface();
        paint.resize_popup(2, 2, 2, 2);
        paint.show_popup(true);
        paint.paint_popup(&frame(2, 2, [0, 200, 0, 255]));

        let flip = paint.present().expect("slot");
        let slot = paint.ring().slot(flip.slot).expect("slot");
        assert_eq!(slot.pixel(2, 2), Some([0, 200, 0, 255]));
        assert_eq!(slot.pixel(1, 1), Some([10, 10, 10, 255]));
        assert_eq!(paint.ring().main().pixel(2, 2), Some([10, 10, 10, 255]));
        assert_eq!(slot.pending(), DirtyRegion::from_rect(2, 2, 2, 2));
    }

    #[test]
    fn hiding_popup_marks_covered_area_in_every_slot() {
        let mut paint = painted_surface();
        paint.resize_popup(1, 1, 3, 3);
        paint.show_popup(true);
        paint.paint_popup(&frame(3, 3, [1, 2, 3, 255]));
        let first = paint.present().expect("slot");
        paint.ring_mut().ack(first.slot);

        paint.hide_popup();
        assert!(paint.ring().has_pending_frame());
        let covered = DirtyRegion::from_rect(1, 1, 3, 3);
        for slot in 0..paint.ring().depth() as u32 {
            let pending = paint
                .ring()
                .slot(crate::pipeline::paint::SlotId(slot))
                .expect("slot")
                .pending();
            assert_eq!(pending.union(covered), pending, "slot {slot} misses popup area");
        }

        let second = paint.present().expect("slot");
        assert_eq!(second.region, covered);
        let slot = paint.ring().slot(second.slot).expect("slot");
        assert_eq!(slot.pixel(2, 2), Some([10, 10, 10, 255]));
    }

    #[test]
    fn unpaintable_popup_is_skipped_by_present() {
        let mut paint = painted_surface();
        paint.resize_popup(0, 0, 100, 100);
        paint.show_popup(true);
        paint.paint_popup(&[255; 16]);

        let flip = paint.present().expect("slot");
        assert_eq!(flip.region, DirtyRegion::full(8, 8));
        let slot = paint.ring().slot(flip.slot).expect("slot");
        assert_eq!(slot.pixel(0, 0), Some([10, 10, 10, 255]));
    }

    #[test]
    fn screenshot_expires_at_deadline() {
        let mut paint = painted_surface();
        let now = Instant::now();
        paint.request_screenshot(Some(now + Duration::from_millis(5)));
        assert!(!paint.expire_screenshot(now));
        assert!(paint.expire_screenshot(now + Duration::from_millis(5)));
        assert!(!paint.screenshot_pending());
        assert_eq!(paint.capture_screenshot(), None);
        assert!(paint.take_screenshot().is_none());
    }

    #[test]
    fn screenshot_includes_popup() {
        let mut paint = painted_surface();
        paint.resize_popup(0, 0, 1, 1);
        paint.show_popup(true);
        paint.paint_popup(&[7, 7, 7, 255]);
        paint.request_screenshot(None);

        let size = paint.capture_screenshot().expect("captured");
        assert_eq!(
            size,
            SurfaceSize {
                width: 8,
                height: 8
            }
        );
        let shot = paint.take_screenshot().expect("ready");
        assert_eq!(shot.pixel(0, 0), Some([7, 7, 7, 255]));
        assert_eq!(shot.pixel(1, 0), Some([10, 10, 10, 255]));
        assert!(paint.take_screenshot().is_none());
    }
}
