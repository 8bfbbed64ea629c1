use crate::pipeline::dirty::DirtyRegion;
use crate::pipeline::paint::{byte_len, RenderBuffer, BYTES_PER_PIXEL};

/// Secondary bitmap (select lists, tooltips) the engine draws above a view.
///
/// The rectangle comes from the engine's popup resize callback; the pixels
/// come from a separate paint callback and may lag behind the rectangle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PopupState {
    pub visible: bool,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl PopupState {
    pub fn show(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn set_rect(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.x = x;
        self.y = y;
        self.width = width;
        self.height = height;
    }

    pub fn set_pixels(&mut self, pixels: &[u8]) {
        self.pixels.clear();
        self.pixels.extend_from_slice(pixels);
    }

    /// A popup whose reported size outgrows its pixel buffer is not
    /// paintable, whatever the `visible` flag says.
    pub fn is_paintable(&self) -> bool {
        self.visible
            && self.width > 0
            && self.height > 0
            && self.pixels.len() >= byte_len(self.width, self.height)
    }

    pub fn rect(&self) -> DirtyRegion {
        DirtyRegion::from_rect(
            self.x,
            self.y,
            i32::try_from(self.width).unwrap_or(i32::MAX),
            i32::try_from(self.height).unwrap_or(i32::MAX),
        )
    }

    /// Part of a `width` x `height` surface the popup rectangle overlaps.
    pub fn covered_region(&self, width: u32, height: u32) -> DirtyRegion {
        self.rect().clamp(width, height)
    }
}

/// Overlays the popup onto `target`, clipped to its extent. Returns the
/// covered region, or `None` when there is nothing to draw.
pub fn composite(target: &mut RenderBuffer, popup: &PopupState) -> Option<DirtyRegion> {
    if !popup.is_paintable() {
        return None;
    }
    let covered = popup.covered_region(target.width(), target.height());
    if covered.is_clean() {
        return None;
    }

    let src_stride = popup.width as usize * BYTES_PER_PIXEL;
    let dst_stride = target.stride();
    let span = covered.width() as usize * BYTES_PER_PIXEL;
    // Offsets of the clipped area inside the popup bitmap.
    let src_x = (i64::from(covered.x0) - i64::from(popup.x)) as usize * BYTES_PER_PIXEL;
    let src_y0 = (i64::from(covered.y0) - i64::from(popup.y)) as usize;

    let dst = target.pixels_mut();
    for (row, y) in (covered.y0..covered.y1).enumerate() {
        let src_start = (src_y0 + row) * src_stride + src_x;
        let dst_start = y as usize * dst_stride + covered.x0 as usize * BYTES_PER_PIXEL;
        dst[dst_start..dst_start + span]
            .copy_from_slice(&popup.pixels[src_start..src_start + span]);
    }
    Some(covered)
}
