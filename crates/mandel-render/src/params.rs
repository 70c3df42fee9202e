// SPDX-License-Identifier: CEPL-1.0
use bytemuck::{Pod, Zeroable};

use crate::RenderSize;

/// Guaranteed minimum `maxPushConstantsSize` across Vulkan implementations.
pub const MAX_PARAMETER_BLOCK_BYTES: usize = 128;
pub const GRADIENT_CAPACITY: usize = 21;
/// Fills gradient slots past `gradient_length`; makes indexing mistakes visible.
pub const GRADIENT_SENTINEL: u32 = 0x00FF00;
/// Installed when a block is built without colors or given an empty gradient.
pub const DEFAULT_GRADIENT: [u32; 2] = [0x000000, 0xFFFFFF];

/// Rectangle in the complex plane mapped onto the surface.
/// `top`/`left` land on pixel (0, 0).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FractalRect {
    pub top: f32,
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
}

/// Per-draw parameter block pushed to the fragment stage.
///
/// Field order and widths are the push-constant layout of the built-in
/// fragment program; do not reorder.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct DrawParameters {
    pub top: f32,
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    pub surface_width: f32,
    pub surface_height: f32,
    pub bailout_radius: f32,
    pub max_iterations: u32,
    pub fill_color: u32,
    pub gradient_period_factor: f32,
    pub gradient_length: u32,
    pub gradient: [u32; GRADIENT_CAPACITY],
}

const _: () = assert!(std::mem::size_of::<DrawParameters>() <= MAX_PARAMETER_BLOCK_BYTES);

impl DrawParameters {
    /// Block size handed to `load_fragment_shader` for the built-in program.
    pub const SIZE: u32 = std::mem::size_of::<DrawParameters>() as u32;

    pub fn new(rect: FractalRect, size: RenderSize) -> Self {
        let mut p = Self {
            top: rect.top,
            left: rect.left,
            right: rect.right,
            bottom: rect.bottom,
            surface_width: size.width as f32,
            surface_height: size.height as f32,
            bailout_radius: 256.0,
            max_iterations: 5000,
            fill_color: 0x000000,
            gradient_period_factor: 0.2,
            gradient_length: 0,
            gradient: [GRADIENT_SENTINEL; GRADIENT_CAPACITY],
        };
        p.set_gradient(&DEFAULT_GRADIENT);
        p
    }

    pub fn with_escape(mut self, bailout_radius: f32, max_iterations: u32) -> Self {
        self.bailout_radius = bailout_radius;
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_fill(mut self, fill_color: u32) -> Self {
        self.fill_color = fill_color & 0x00FF_FFFF;
        self
    }

    pub fn with_period_factor(mut self, factor: f32) -> Self {
        self.gradient_period_factor = factor;
        self
    }

    pub fn with_gradient(mut self, colors: &[u32]) -> Self {
        self.set_gradient(colors);
        self
    }

    /// Copies up to `GRADIENT_CAPACITY` colors; the remainder is sentinel green.
    /// An empty slice installs [`DEFAULT_GRADIENT`], so the length is never 0.
    pub fn set_gradient(&mut self, colors: &[u32]) {
        let colors: &[u32] = if colors.is_empty() {
            &DEFAULT_GRADIENT
        } else {
            colors
        };
        let len = colors.len().min(GRADIENT_CAPACITY);
        self.gradient = [GRADIENT_SENTINEL; GRADIENT_CAPACITY];
        for (slot, &c) in self.gradient.iter_mut().zip(&colors[..len]) {
            *slot = c & 0x00FF_FFFF;
        }
        self.gradient_length = len as u32;
    }

    pub fn set_rect(&mut self, rect: FractalRect) {
        self.top = rect.top;
        self.left = rect.left;
        self.right = rect.right;
        self.bottom = rect.bottom;
    }

    pub fn set_surface_size(&mut self, size: RenderSize) {
        self.surface_width = size.width as f32;
        self.surface_height = size.height as f32;
    }

    pub fn gradient(&self) -> &[u32] {
        let len = (self.gradient_length as usize).min(GRADIENT_CAPACITY);
        &self.gradient[..len]
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect() -> FractalRect {
        FractalRect {
            top: 2.0,
            left: -2.5,
            right: 1.5,
            bottom: -2.0,
        }
    }

    #[test]
    fn block_fits_push_constant_budget() {
        assert_eq!(DrawParameters::SIZE as usize, MAX_PARAMETER_BLOCK_BYTES);
        let p = DrawParameters::new(rect(), RenderSize { width: 8, height: 4 });
        assert_eq!(p.as_bytes().len(), 128);
    }

    #[test]
    fn field_offsets_match_shader_layout() {
        let p = DrawParameters::new(rect(), RenderSize { width: 8, height: 4 })
            .with_escape(4.0, 77)
            .with_fill(0x123456)
            .with_gradient(&[0xAABBCC]);
        let words: &[u32] = bytemuck::cast_slice(p.as_bytes());
        assert_eq!(f32::from_bits(words[0]), 2.0);
        assert_eq!(f32::from_bits(words[1]), -2.5);
        assert_eq!(f32::from_bits(words[4]), 8.0);
        assert_eq!(f32::from_bits(words[6]), 4.0);
        assert_eq!(words[7], 77);
        assert_eq!(words[8], 0x123456);
        assert_eq!(words[10], 1);
        assert_eq!(words[11], 0xAABBCC);
        assert_eq!(words[12], GRADIENT_SENTINEL);
    }

    #[test]
    fn long_gradients_are_truncated() {
        let colors: Vec<u32> = (0..30).collect();
        let p = DrawParameters::new(rect(), RenderSize { width: 1, height: 1 }).with_gradient(&colors);
        assert_eq!(p.gradient_length as usize, GRADIENT_CAPACITY);
        assert_eq!(p.gradient(), &colors[..GRADIENT_CAPACITY]);
    }

    #[test]
    fn shrinking_gradient_restores_sentinel() {
        let mut p = DrawParameters::new(rect(), RenderSize { width: 1, height: 1 })
            .with_gradient(&[1, 2, 3, 4]);
        p.set_gradient(&[9]);
        assert_eq!(p.gradient(), &[9]);
        assert!(p.gradient[1..].iter().all(|&c| c == GRADIENT_SENTINEL));
    }

    #[test]
    fn new_block_has_a_usable_gradient() {
        let p = DrawParameters::new(rect(), RenderSize { width: 4, height: 4 });
        assert_eq!(p.gradient_length, 2);
        assert_eq!(p.gradient(), &DEFAULT_GRADIENT);
        assert_eq!(p.gradient[2], GRADIENT_SENTINEL);
    }

    #[test]
    fn empty_gradient_falls_back_to_default() {
        let p = DrawParameters::new(rect(), RenderSize { width: 1, height: 1 })
            .with_gradient(&[1, 2, 3])
            .with_gradient(&[]);
        assert_eq!(p.gradient(), &DEFAULT_GRADIENT);
    }

    #[test]
    fn colors_are_masked_to_24_bits() {
        let p = DrawParameters::new(rect(), RenderSize { width: 1, height: 1 })
            .with_fill(0xFF11_2233)
            .with_gradient(&[0xFFFF_FFFF]);
        assert_eq!(p.fill_color, 0x112233);
        assert_eq!(p.gradient[0], 0xFFFFFF);
    }
}
