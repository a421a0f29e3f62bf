//! Damage tracking and the desktop rectangle mesh
//!
//! The capture side reports which parts of a frame changed. Those rectangles
//! drive two things:
//! 1. The buffered upload only copies the damaged rows
//! 2. The desktop mesh only covers the damaged regions, so the compositor
//!    redraws as little as possible
//!
//! # Example
//!
//! ```
//! use lumen::renderer::damage::{DamageRect, DesktopRects, FrameDamage};
//!
//! let mut damage = FrameDamage::new(16);
//! damage.add(DamageRect::new(10, 10, 50, 50));
//!
//! let mut mesh = DesktopRects::new(16);
//! mesh.update(damage.rects(), 1920, 1080);
//! assert_eq!(mesh.rect_count(), 1);
//! ```

use bytemuck::{Pod, Zeroable};

/// Axis-aligned rectangle in frame pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DamageRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl DamageRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering a whole `width` x `height` frame
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Checks if this rectangle completely contains another
    pub fn contains_rect(&self, other: &DamageRect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.x.saturating_add(other.width) <= self.x.saturating_add(self.width)
            && other.y.saturating_add(other.height) <= self.y.saturating_add(self.height)
    }

    /// Clip to a `width` x `height` frame; `None` when nothing is left
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<DamageRect> {
        if self.x >= width || self.y >= height {
            return None;
        }

        let clamped_w = self.width.min(width - self.x);
        let clamped_h = self.height.min(height - self.y);
        if clamped_w == 0 || clamped_h == 0 {
            return None;
        }

        Some(DamageRect::new(self.x, self.y, clamped_w, clamped_h))
    }
}

/// Damage accumulated for one frame
///
/// Holds at most `capacity` rectangles. Going over the cap coalesces to
/// full damage, which is cheaper than tracking many small regions.
#[derive(Debug, Clone)]
pub struct FrameDamage {
    rects: Vec<DamageRect>,
    capacity: usize,
    full_damage: bool,
}

impl FrameDamage {
    pub fn new(capacity: usize) -> Self {
        Self {
            rects: Vec::with_capacity(capacity),
            capacity,
            full_damage: false,
        }
    }

    /// Adds a damaged rectangle
    ///
    /// No-op once the frame is fully damaged.
    pub fn add(&mut self, rect: DamageRect) {
        if self.full_damage {
            return;
        }

        self.rects.push(rect);
        if self.rects.len() > self.capacity {
            self.mark_full();
        }
    }

    pub fn mark_full(&mut self) {
        self.full_damage = true;
        self.rects.clear();
    }

    pub fn is_full(&self) -> bool {
        self.full_damage
    }

    pub fn has_damage(&self) -> bool {
        self.full_damage || !self.rects.is_empty()
    }

    /// Damaged rectangles, or `None` for the whole frame
    pub fn rects(&self) -> Option<&[DamageRect]> {
        if self.full_damage {
            None
        } else {
            Some(&self.rects)
        }
    }

    /// Reset after the frame has been handed off
    pub fn clear(&mut self) {
        self.full_damage = false;
        self.rects.clear();
    }
}

/// Vertex of the desktop mesh, in desktop pixels
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct RectVertex {
    pub position: [f32; 2],
}

/// Geometry covering the damaged parts of the desktop
///
/// Rebuilt on every update, four vertices and six indices per rectangle.
#[derive(Debug, Clone)]
pub struct DesktopRects {
    max_rects: usize,
    vertices: Vec<RectVertex>,
    indices: Vec<u16>,
    rects: Vec<DamageRect>,
}

impl DesktopRects {
    /// Most rectangles a mesh can hold with 16-bit indices
    pub const MAX_RECTS: usize = u16::MAX as usize / 4;

    /// `max_rects` is clamped to `1..=MAX_RECTS`
    pub fn new(max_rects: usize) -> Self {
        let max_rects = max_rects.clamp(1, Self::MAX_RECTS);
        Self {
            max_rects,
            vertices: Vec::with_capacity(max_rects * 4),
            indices: Vec::with_capacity(max_rects * 6),
            rects: Vec::with_capacity(max_rects),
        }
    }

    pub fn max_rects(&self) -> usize {
        self.max_rects
    }

    /// Rebuild the mesh for a `width` x `height` desktop
    pub fn update(&mut self, damage: Option<&[DamageRect]>, width: u32, height: u32) {
        self.rects.clear();
        let full = DamageRect::full(width, height);

        match damage {
            Some(rects) if !rects.is_empty() && rects.len() <= self.max_rects => {
                for rect in rects.iter().filter_map(|r| r.clamp_to(width, height)) {
                    if rect.contains_rect(&full) {
                        self.rects.clear();
                        self.rects.push(full);
                        break;
                    }
                    self.rects.push(rect);
                }
            }
            _ => self.rects.push(full),
        }

        self.vertices.clear();
        self.indices.clear();
        for (i, rect) in self.rects.iter().enumerate() {
            let x1 = rect.x as f32;
            let y1 = rect.y as f32;
            let x2 = rect.x.saturating_add(rect.width) as f32;
            let y2 = rect.y.saturating_add(rect.height) as f32;

            self.vertices.extend_from_slice(&[
                RectVertex { position: [x1, y1] },
                RectVertex { position: [x2, y1] },
                RectVertex { position: [x1, y2] },
                RectVertex { position: [x2, y2] },
            ]);

            let base = (i * 4) as u16;
            self.indices.extend_from_slice(&[
                base,
                base + 1,
                base + 2,
                base + 2,
                base + 1,
                base + 3,
            ]);
        }
    }

    /// Rectangles covered by the current mesh
    pub fn rects(&self) -> &[DamageRect] {
        &self.rects
    }

    pub fn rect_count(&self) -> usize {
        self.rects.len()
    }

    pub fn vertices(&self) -> &[RectVertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u16] {
        &self.indices
    }

    /// Raw vertex data for upload
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_damage_rect_area() {
        let rect = DamageRect::new(0, 0, 100, 50);
        assert_eq!(rect.area(), 5000);
    }

    #[test]
    fn test_damage_rect_contains_rect() {
        let outer = DamageRect::new(0, 0, 100, 100);
        let inner = DamageRect::new(10, 10, 50, 50);
        let overlapping = DamageRect::new(50, 50, 100, 100);

        assert!(outer.contains_rect(&inner));
        assert!(!outer.contains_rect(&overlapping));
        assert!(!inner.contains_rect(&outer));
    }

    #[test]
    fn test_damage_rect_clamp() {
        let rect = DamageRect::new(1900, 1000, 100, 100);
        assert_eq!(
            rect.clamp_to(1920, 1080),
            Some(DamageRect::new(1900, 1000, 20, 80))
        );

        assert_eq!(DamageRect::new(1920, 0, 10, 10).clamp_to(1920, 1080), None);
        assert_eq!(DamageRect::new(0, 0, 0, 10).clamp_to(1920, 1080), None);
    }

    #[test]
    fn test_frame_damage_add() {
        let mut damage = FrameDamage::new(4);
        assert!(!damage.has_damage());

        damage.add(DamageRect::new(0, 0, 10, 10));
        assert!(damage.has_damage());
        assert_eq!(damage.rects().map(|r| r.len()), Some(1));
    }

    #[test]
    fn test_frame_damage_too_many_rects() {
        let mut damage = FrameDamage::new(4);
        for i in 0..5 {
            damage.add(DamageRect::new(i * 10, 0, 10, 10));
        }

        assert!(damage.is_full());
        assert!(damage.rects().is_none());

        damage.clear();
        assert!(!damage.has_damage());
    }

    #[test]
    fn test_mesh_without_damage_covers_desktop() {
        let mut mesh = DesktopRects::new(8);
        mesh.update(None, 1920, 1080);

        assert_eq!(mesh.rects(), &[DamageRect::full(1920, 1080)]);
        assert_eq!(mesh.vertices().len(), 4);
        assert_eq!(mesh.indices(), &[0, 1, 2, 2, 1, 3]);
        assert_eq!(mesh.vertices()[3].position, [1920.0, 1080.0]);

        mesh.update(Some(&[]), 1920, 1080);
        assert_eq!(mesh.rect_count(), 1);
    }

    #[test]
    fn test_mesh_covers_only_damage() {
        let mut mesh = DesktopRects::new(8);
        let rects = [DamageRect::new(10, 20, 30, 40), DamageRect::new(100, 100, 10, 10)];
        mesh.update(Some(&rects), 1920, 1080);

        assert_eq!(mesh.rect_count(), 2);
        assert_eq!(mesh.vertices().len(), 8);
        assert_eq!(mesh.indices().len(), 12);
        assert_eq!(mesh.indices()[6], 4);
        assert_eq!(mesh.vertices()[0].position, [10.0, 20.0]);
        assert_eq!(mesh.vertices()[3].position, [40.0, 60.0]);
        assert_eq!(mesh.vertex_bytes().len(), 8 * 2 * 4);
    }

    #[test]
    fn test_mesh_over_capacity_falls_back_to_full() {
        let mut mesh = DesktopRects::new(2);
        let rects = [
            DamageRect::new(0, 0, 1, 1),
            DamageRect::new(2, 2, 1, 1),
            DamageRect::new(4, 4, 1, 1),
        ];
        mesh.update(Some(&rects), 640, 480);

        assert_eq!(mesh.rects(), &[DamageRect::full(640, 480)]);
    }

    #[test]
    fn test_mesh_full_rect_collapses() {
        let mut mesh = DesktopRects::new(4);
        let rects = [DamageRect::new(5, 5, 10, 10), DamageRect::new(0, 0, 4000, 4000)];
        mesh.update(Some(&rects), 640, 480);

        assert_eq!(mesh.rects(), &[DamageRect::full(640, 480)]);
    }

    #[test]
    fn test_mesh_capacity_fits_u16_indices() {
        let mesh = DesktopRects::new(100_000);
        assert_eq!(mesh.max_rects(), DesktopRects::MAX_RECTS);
        assert_eq!(DesktopRects::new(0).max_rects(), 1);

        let mut mesh = DesktopRects::new(usize::MAX);
        let rects: Vec<DamageRect> = (0..DesktopRects::MAX_RECTS as u32)
            .map(|i| DamageRect::new(i % 128, i / 128, 1, 1))
            .collect();
        mesh.update(Some(&rects), 1024, 1024);

        assert_eq!(mesh.rect_count(), DesktopRects::MAX_RECTS);
        let last = mesh.indices()[mesh.indices().len() - 1] as usize;
        assert_eq!(last, mesh.vertices().len() - 1);
    }

    #[test]
    fn test_mesh_drops_offscreen_rects() {
        let mut mesh = DesktopRects::new(4);
        let rects = [DamageRect::new(700, 0, 10, 10), DamageRect::new(0, 0, 8, 8)];
        mesh.update(Some(&rects), 640, 480);

        assert_eq!(mesh.rects(), &[DamageRect::new(0, 0, 8, 8)]);
    }
}
