use crate::pipeline::dirty::DirtyRegion;
use anyhow::{bail, Result};

pub const BYTES_PER_PIXEL: usize = 4;
pub const MIN_RING_DEPTH: usize = 2;
pub const MAX_RING_DEPTH: usize = 32;

pub fn byte_len(width: u32, height: u32) -> usize {
    (width as usize)
        .saturating_mul(height as usize)
        .saturating_mul(BYTES_PER_PIXEL)
}

/// RGBA pixel store plus the region changed since it was last consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    pending: DirtyRegion,
}

impl RenderBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; byte_len(width, height)],
            pending: DirtyRegion::full(width, height),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn pending(&self) -> DirtyRegion {
        self.pending
    }

    /// Reallocates for a new size. The whole buffer becomes pending.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if self.size() == (width, height) {
            return false;
        }
        self.width = width;
        self.height = height;
        self.pixels = vec![0; byte_len(width, height)];
        self.pending = DirtyRegion::full(width, height);
        true
    }

    pub fn mark_dirty(&mut self, region: DirtyRegion) {
        self.pending = self.pending.union(region.clamp(self.width, self.height));
    }

    pub fn take_pending(&mut self) -> DirtyRegion {
        std::mem::take(&mut self.pending)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = y as usize * self.stride() + x as usize * BYTES_PER_PIXEL;
        let px = self.pixels.get(idx..idx + BYTES_PER_PIXEL)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    pub fn fill(&mut self, rgba: [u8; 4]) {
        for chunk in self.pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
            chunk.copy_from_slice(&rgba);
        }
        self.pending = DirtyRegion::full(self.width, self.height);
    }

    /// Copies `region` from a buffer of the same size. Returns false when the
    /// sizes differ.
    pub fn copy_region_from(&mut self, src: &RenderBuffer, region: DirtyRegion) -> bool {
        if self.size() != src.size() {
            return false;
        }
        let region = region.clamp(self.width, self.height);
        if !region.is_clean() {
            copy_rect(&src.pixels, &mut self.pixels, self.width, region);
        }
        true
    }
}

/// Copies a clamped region between two buffers of identical width. Regions
/// spanning whole rows are copied as a single contiguous block.
pub(crate) fn copy_rect(src: &[u8], dst: &mut [u8], width: u32, region: DirtyRegion) {
    let stride = width as usize * BYTES_PER_PIXEL;
    let y0 = region.y0 as usize;
    let y1 = region.y1 as usize;
    if region.covers_full_width(width) {
        let start = y0 * stride;
        let end = y1 * stride;
        dst[start..end].copy_from_slice(&src[start..end]);
        return;
    }
    let x0 = region.x0 as usize * BYTES_PER_PIXEL;
    let x1 = region.x1 as usize * BYTES_PER_PIXEL;
    for y in y0..y1 {
        let row = y * stride;
        dst[row + x0..row + x1].copy_from_slice(&src[row + x0..row + x1]);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlipResult {
    pub slot: SlotId,
    /// Union of everything painted into the main buffer since the last flip.
    pub region: DirtyRegion,
}

/// Main buffer plus a ring of hand-off slots for one surface.
///
/// The engine thread writes the main buffer; `flip` publishes it into a free
/// slot and marks that slot in flight until the host acknowledges it. Every
/// paint is propagated into each slot's own pending region, so a slot copies
/// exactly what changed since it was last published.
#[derive(Debug)]
pub struct PaintRing {
    main: RenderBuffer,
    slots: Vec<RenderBuffer>,
    in_flight: u32,
    next: usize,
}

impl PaintRing {
    /// Slots start fully stale; the main buffer has nothing to publish until
    /// the engine paints.
    pub fn new(depth: usize, width: u32, height: u32) -> Self {
        let depth = depth.clamp(MIN_RING_DEPTH, MAX_RING_DEPTH);
        let mut main = RenderBuffer::new(width, height);
        main.take_pending();
        Self {
            main,
            slots: (0..depth).map(|_| RenderBuffer::new(width, height)).collect(),
            in_flight: 0,
            next: 0,
        }
    }

    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    pub fn main(&self) -> &RenderBuffer {
        &self.main
    }

    pub fn slot(&self, slot: SlotId) -> Option<&RenderBuffer> {
        self.slots.get(slot.0 as usize)
    }

    pub(crate) fn slot_mut(&mut self, slot: SlotId) -> Option<&mut RenderBuffer> {
        self.slots.get_mut(slot.0 as usize)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.count_ones() as usize
    }

    pub fn is_in_flight(&self, slot: SlotId) -> bool {
        (slot.0 as usize) < self.slots.len() && self.in_flight & (1 << slot.0) != 0
    }

    pub fn has_pending_frame(&self) -> bool {
        !self.main.pending().is_clean()
    }

    /// Resizes the main buffer and every free slot. Slots held by the host
    /// keep their pixels and size; `flip` resizes them once they come back.
    pub fn resize(&mut self, width: u32, height: u32) {
        if !self.main.resize(width, height) {
            return;
        }
        let in_flight = self.in_flight;
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if in_flight & (1 << idx) == 0 {
                slot.resize(width, height);
            }
        }
    }

    /// Marks a region changed in the main buffer and in every slot.
    pub fn mark_dirty(&mut self, region: DirtyRegion) {
        self.main.mark_dirty(region);
        self.mark_slots_dirty(region);
    }

    /// Marks a region stale in every slot without producing a new frame.
    pub fn mark_slots_dirty(&mut self, region: DirtyRegion) {
        for slot in &mut self.slots {
            slot.mark_dirty(region);
        }
    }

    /// Copies the engine's raw frame into the main buffer for each dirty
    /// rectangle. `pixels` holds a full `width` x `height` RGBA frame; a
    /// frame at a new size is copied whole.
    pub fn apply_paint(
        &mut self,
        rects: &[DirtyRegion],
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<DirtyRegion> {
        let expected = byte_len(width, height);
        if pixels.len() < expected {
            bail!(
                "paint buffer holds {} bytes, {width}x{height} needs {expected}",
                pixels.len()
            );
        }
        if self.main.size() != (width, height) {
            self.resize(width, height);
            let full = DirtyRegion::full(width, height);
            if !full.is_clean() {
                copy_rect(pixels, self.main.pixels_mut(), width, full);
            }
            self.mark_dirty(full);
            return Ok(full);
        }

        let mut painted = DirtyRegion::clean();
        for rect in rects {
            let rect = rect.clamp(width, height);
            if rect.is_clean() {
                continue;
            }
            copy_rect(pixels, self.main.pixels_mut(), width, rect);
            painted = painted.union(rect);
        }
        self.mark_dirty(painted);
        Ok(painted)
    }

    /// Publishes the main buffer into the next free slot, or returns `None`
    /// when every slot is still held by the host.
    pub fn flip(&mut self) -> Option<FlipResult> {
        let depth = self.slots.len();
        let (width, height) = self.main.size();
        for offset in 0..depth {
            let idx = (self.next + offset) % depth;
            if self.in_flight & (1 << idx) != 0 {
                continue;
            }

            let slot = &mut self.slots[idx];
            slot.resize(width, height);
            let stale = slot.take_pending().clamp(width, height);
            if !stale.is_clean() {
                copy_rect(self.main.pixels(), slot.pixels_mut(), width, stale);
            }

            self.in_flight |= 1 << idx;
            self.next = (idx + 1) % depth;
            let region = self.main.take_pending();
            return Some(FlipResult {
                slot: SlotId(idx as u32),
                region,
            });
        }
        None
    }

    /// Host acknowledgement: the slot may be reused. Returns false when the
    /// slot was not in flight.
    pub fn ack(&mut self, slot: SlotId) -> bool {
        if !self.is_in_flight(slot) {
            return false;
        }
        self.in_flight &= !(1 << slot.0);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
        rgba.iter()
            .copied()
            .cycle()
            .take(byte_len(width, height))
            .collect()
    }

    #[test]
    fn resize_marks_buffer_fully_dirty() {
        let mut buffer = RenderBuffer::new(4, 4);
        buffer.take_pending();
        assert!(buffer.pending().is_clean());

        assert!(buffer.resize(8, 2));
        assert!(buffer.pending().is_full(8, 2));
        assert_eq!(buffer.pixels().len(), 8 * 2 * 4);
        assert!(!buffer.resize(8, 2));
    }

    #[test]
    fn flip_never_exceeds_ring_depth() {
        let mut ring = PaintRing::new(3, 2, 2);
        let frame = solid_frame(2, 2, [1, 2, 3, 255]);
        let mut slots = Vec::new();
        for _ in 0..3 {
            ring.apply_paint(&[DirtyRegion::full(2, 2)], &frame, 2, 2)
                .expect("paint");
            let flip = ring.flip().expect("free slot");
            assert!(!slots.contains(&flip.slot), "slot handed out twice");
            slots.push(flip.slot);
        }
        assert_eq!(ring.in_flight_count(), 3);

        ring.apply_paint(&[DirtyRegion::full(2, 2)], &frame, 2, 2)
            .expect("paint");
        assert_eq!(ring.flip(), None, "full ring must apply backpressure");
        assert!(ring.has_pending_frame(), "deferred frame stays pending");

        assert!(ring.ack(slots[1]));
        assert!(!ring.ack(slots[1]), "double ack is rejected");
        let flip = ring.flip().expect("acked slot is free again");
        assert_eq!(flip.slot, slots[1]);
        assert_eq!(ring.in_flight_count(), 3);
    }

    #[test]
    fn flipped_slot_matches_main_buffer() {
        let mut ring = PaintRing::new(2, 4, 3);
        let red = solid_frame(4, 3, [255, 0, 0, 255]);
        ring.apply_paint(&[DirtyRegion::full(4, 3)], &red, 4, 3)
            .expect("paint");
        let first = ring.flip().expect("slot");
        assert_eq!(first.region, DirtyRegion::full(4, 3));
        ring.ack(first.slot);

        // A partial paint lands while slot 1 has not been published yet.
        let blue = solid_frame(4, 3, [0, 0, 255, 255]);
        let rect = DirtyRegion::from_rect(1, 1, 2, 1);
        ring.apply_paint(&[rect], &blue, 4, 3).expect("paint");

        let second = ring.flip().expect("slot");
        assert_eq!(second.region, rect);
        let slot = ring.slot(second.slot).expect("slot buffer");
        assert_eq!(slot.pixels(), ring.main().pixels());
        assert!(slot.pending().is_clean());

        // Slot 0 was published before the partial paint and must still
        // carry it as pending.
        let stale = ring.slot(first.slot).expect("slot buffer");
        assert_eq!(stale.pending(), rect);
        assert_eq!(stale.pixel(1, 1), Some([255, 0, 0, 255]));
    }

    #[test]
    fn unflipped_slots_accumulate_every_paint() {
        let mut ring = PaintRing::new(2, 8, 8);
        let frame = solid_frame(8, 8, [9, 9, 9, 255]);
        ring.apply_paint(&[DirtyRegion::full(8, 8)], &frame, 8, 8)
            .expect("paint");
        let a = ring.flip().expect("slot");
        let b = ring.flip();
        assert!(b.is_some());
        ring.ack(a.slot);

        ring.apply_paint(&[DirtyRegion::from_rect(0, 0, 1, 1)], &frame, 8, 8)
            .expect("paint");
        ring.apply_paint(&[DirtyRegion::from_rect(6, 6, 2, 2)], &frame, 8, 8)
            .expect("paint");

        let pending = ring.slot(a.slot).expect("slot").pending();
        assert_eq!(pending, DirtyRegion::from_rect(0, 0, 8, 8));
    }

    #[test]
    fn full_row_copy_matches_per_row_copy() {
        let width = 5;
        let height = 4;
        let src: Vec<u8> = (0..byte_len(width, height)).map(|i| i as u8).collect();

        let mut fast = vec![0u8; src.len()];
        copy_rect(&src, &mut fast, width, DirtyRegion::from_rect(0, 1, 5, 2));

        let mut slow = vec![0u8; src.len()];
        for y in 1..3 {
            copy_rect(&src, &mut slow, width, DirtyRegion::from_rect(0, y, 4, 1));
            copy_rect(&src, &mut slow, width, DirtyRegion::from_rect(4, y, 1, 1));
        }
        assert_eq!(fast, slow);
        assert!(fast[..20].iter().all(|b| *b == 0));
        assert!(fast[60..].iter().all(|b| *b == 0));
    }

    #[test]
    fn short_paint_buffer_is_rejected() {
        let mut ring = PaintRing::new(2, 4, 4);
        ring.flip();
        let err = ring.apply_paint(&[DirtyRegion::full(4, 4)], &[0u8; 10], 4, 4);
        assert!(err.is_err());
        assert!(!ring.has_pending_frame());
    }

    #[test]
    fn paint_with_new_size_resizes_free_buffers() {
        let mut ring = PaintRing::new(2, 4, 4);
        ring.flip();
        let frame = solid_frame(6, 2, [5, 5, 5, 255]);
        let painted = ring
            .apply_paint(&[DirtyRegion::from_rect(0, 0, 1, 1)], &frame, 6, 2)
            .expect("paint");
        assert_eq!(painted, DirtyRegion::full(6, 2));
        assert_eq!(ring.main().size(), (6, 2));
        assert_eq!(ring.main().pixel(5, 1), Some([5, 5, 5, 255]));

        let flip = ring.flip().expect("slot");
        let slot = ring.slot(flip.slot).expect("slot");
        assert_eq!(slot.size(), (6, 2));
        assert_eq!(slot.pixels(), ring.main().pixels());
    }

    #[test]
    fn resize_leaves_host_held_slot_untouched() {
        let mut ring = PaintRing::new(2, 8, 8);
        let red = solid_frame(8, 8, [255, 0, 0, 255]);
        ring.apply_paint(&[DirtyRegion::full(8, 8)], &red, 8, 8)
            .expect("paint");
        let held = ring.flip().expect("slot").slot;

        let blue = solid_frame(4, 4, [0, 0, 255, 255]);
        ring.apply_paint(&[DirtyRegion::full(4, 4)], &blue, 4, 4)
            .expect("paint");

        let slot = ring.slot(held).expect("slot");
        assert_eq!(slot.size(), (8, 8));
        assert_eq!(slot.pixel(7, 7), Some([255, 0, 0, 255]));

        let next = ring.flip().expect("free slot");
        assert_ne!(next.slot, held);
        assert_eq!(next.region, DirtyRegion::full(4, 4));
        let fresh = ring.slot(next.slot).expect("slot");
        assert_eq!(fresh.size(), (4, 4));
        assert_eq!(fresh.pixel(3, 3), Some([0, 0, 255, 255]));

        // Once released, the old slot catches up to the new size in full.
        assert!(ring.ack(held));
        assert!(ring.ack(next.slot));
        ring.apply_paint(&[DirtyRegion::from_rect(0, 0, 1, 1)], &blue, 4, 4)
            .expect("paint");
        let reused = ring.flip().expect("slot");
        assert_eq!(reused.slot, held);
        let slot = ring.slot(held).expect("slot");
        assert_eq!(slot.size(), (4, 4));
        assert_eq!(slot.pixels(), ring.main().pixels());
    }

    #[test]
    fn new_ring_has_no_frame_to_publish() {
        let ring = PaintRing::new(2, 4, 4);
        assert!(!ring.has_pending_frame());
        assert!(ring
            .slot(SlotId(0))
            .expect("slot")
            .pending()
            .is_full(4, 4));
    }

    #[test]
    fn depth_is_clamped() {
        assert_eq!(PaintRing::new(0, 1, 1).depth(), MIN_RING_DEPTH);
        assert_eq!(PaintRing::new(100, 1, 1).depth(), MAX_RING_DEPTH);
    }
}
