// SPDX-License-Identifier: CEPL-1.0

//! CPU mirror of the built-in fragment program.
//!
//! Every step is carried out in `f32` in the same order as the GLSL source so
//! host-side tests and tooling see the colors the GPU writes.

use crate::color::unpack_rgb;
use crate::params::DrawParameters;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Escape {
    /// Never reached the bailout radius within `max_iterations`.
    Bounded,
    /// `m1`/`m2` are |z|^2 on the step before bailout and on the bailout step.
    Escaped { iteration: u32, m1: f32, m2: f32 },
}

/// GLSL `mix`.
#[inline]
fn mix(x: f32, y: f32, a: f32) -> f32 {
    x * (1.0 - a) + y * a
}

/// GLSL `mod`: `x - y * floor(x / y)`.
#[inline]
fn glsl_mod(x: f32, y: f32) -> f32 {
    x - y * (x / y).floor()
}

/// Maps a fragment coordinate (pixel centers sit at +0.5) into the plane.
pub fn map_fragment(p: &DrawParameters, frag_x: f32, frag_y: f32) -> (f32, f32) {
    let cr = mix(p.left, p.right, frag_x / p.surface_width);
    let ci = mix(p.top, p.bottom, frag_y / p.surface_height);
    (cr, ci)
}

pub fn iterate(cr: f32, ci: f32, bailout_radius: f32, max_iterations: u32) -> Escape {
    let (mut zr, mut zi) = (0.0f32, 0.0f32);
    let (mut m1, mut m2) = (0.0f32, 0.0f32);
    let mut iteration = 0u32;

    while iteration < max_iterations && m2 < bailout_radius {
        let zr2 = zr * zr;
        let zi2 = zi * zi;
        let zr_next = zr2 - zi2 + cr;
        let zi_next = 2.0 * zr * zi + ci;
        zr = zr_next;
        zi = zi_next;
        m1 = m2;
        m2 = zr2 + zi2;
        iteration += 1;
    }

    if iteration < max_iterations {
        Escape::Escaped { iteration, m1, m2 }
    } else {
        Escape::Bounded
    }
}

/// Continuous escape count `T = iteration - delta` (log smoothing).
pub fn smooth_count(iteration: u32, m1: f32, m2: f32, bailout_radius: f32) -> f32 {
    let invm1 = 1.0 / m1;
    let delta = 1.0 - (bailout_radius * invm1).ln() / (m2 * invm1).ln();
    iteration as f32 - delta
}

/// Gradient slots and blend weight for a continuous count `t`.
pub fn gradient_position(p: &DrawParameters, t: f32) -> (usize, usize, f32) {
    let l = p.gradient_length as f32;
    let m = p.max_iterations as f32;
    let period = mix(l, m * p.gradient_period_factor, (t - 1.0) / (m - 1.0));
    let k = (t / period).floor();
    let hue = ((t - k * period) / period) * l;
    gradient_slots(hue, l)
}

/// Neighbouring slots for `hue` in `[0, l]`. Both wrap, so `hue == l`
/// (rounding at the end of a period) lands on slot 0.
fn gradient_slots(hue: f32, l: f32) -> (usize, usize, f32) {
    let frac = hue - hue.floor();
    let i1 = glsl_mod(hue.floor(), l);
    let i2 = glsl_mod((hue + 1.0).floor(), l);
    (i1 as usize, i2 as usize, frac)
}

/// Color for one fragment coordinate.
pub fn shade(p: &DrawParameters, frag_x: f32, frag_y: f32) -> [f32; 3] {
    let (cr, ci) = map_fragment(p, frag_x, frag_y);
    match iterate(cr, ci, p.bailout_radius, p.max_iterations) {
        Escape::Bounded => unpack_rgb(p.fill_color),
        Escape::Escaped { .. } if p.gradient_length == 0 => unpack_rgb(p.fill_color),
        Escape::Escaped { iteration, m1, m2 } => {
            let t = smooth_count(iteration, m1, m2, p.bailout_radius);
            let (i1, i2, frac) = gradient_position(p, t);
            let c1 = unpack_rgb(p.gradient[i1]);
            let c2 = unpack_rgb(p.gradient[i2]);
            [
                c1[0] + (c2[0] - c1[0]) * frac,
                c1[1] + (c2[1] - c1[1]) * frac,
                c1[2] + (c2[2] - c1[2]) * frac,
            ]
        }
    }
}

/// Color for integer pixel `(x, y)`, sampled at its center.
pub fn shade_pixel(p: &DrawParameters, x: u32, y: u32) -> [f32; 3] {
    shade(p, x as f32 + 0.5, y as f32 + 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::FractalRect;
    use crate::RenderSize;

    const GRADIENT: [u32; 4] = [0xFF0000, 0x00FF00, 0x0000FF, 0xFFFF00];

    fn params(width: u32, height: u32) -> DrawParameters {
        let rect = FractalRect {
            top: 2.0,
            left: -3.0,
            right: 1.0,
            bottom: -2.0,
        };
        DrawParameters::new(rect, RenderSize { width, height })
            .with_escape(256.0, 500)
            .with_fill(0x000000)
            .with_period_factor(0.2)
            .with_gradient(&GRADIENT)
    }

    #[test]
    fn origin_never_escapes() {
        for &max in &[1u32, 2, 17, 5000] {
            for &bailout in &[1.0f32, 4.0, 256.0] {
                assert_eq!(iterate(0.0, 0.0, bailout, max), Escape::Bounded);
            }
        }
    }

    #[test]
    fn origin_pixel_gets_fill_color() {
        // 4x4 units over 400x400 pixels: pixel center (300.5, 200.5) is near (0, 0).
        let p = params(400, 400).with_fill(0x336699);
        let (cr, ci) = map_fragment(&p, 300.0, 200.0);
        assert_eq!((cr, ci), (0.0, 0.0));
        assert_eq!(shade(&p, 300.0, 200.0), unpack_rgb(0x336699));
    }

    #[test]
    fn far_point_escapes_quickly() {
        match iterate(3.0, 0.0, 256.0, 5000) {
            Escape::Escaped { iteration, m1, m2 } => {
                assert_eq!(iteration, 4);
                assert_eq!(m1, 144.0);
                assert_eq!(m2, 21609.0);
            }
            Escape::Bounded => panic!("(3, 0) must escape"),
        }
    }

    #[test]
    fn far_point_gets_gradient_color() {
        let mut p = params(4, 4);
        p.set_rect(FractalRect {
            top: 0.0,
            left: 3.0,
            right: 3.0,
            bottom: 0.0,
        });
        let rgb = shade_pixel(&p, 1, 1);
        assert_ne!(rgb, unpack_rgb(p.fill_color));
        assert!(rgb.iter().all(|c| (0.0..=1.0).contains(c)));
    }

    #[test]
    fn smooth_count_lies_between_steps() {
        let t = smooth_count(4, 144.0, 21609.0, 256.0);
        assert!(t > 3.0 && t < 4.0, "t = {t}");
    }

    #[test]
    fn neighbour_slot_wraps_around_gradient() {
        let p = params(1, 1);
        let len = p.gradient_length as usize;
        for step in 0..200 {
            let t = 1.0 + step as f32 * 0.37;
            let (i1, i2, frac) = gradient_position(&p, t);
            assert!(i1 < len);
            assert_eq!(i2, (i1 + 1) % len);
            assert!((0.0..1.0).contains(&frac));
        }
    }

    #[test]
    fn hue_at_gradient_end_wraps_to_first_slot() {
        assert_eq!(gradient_slots(4.0, 4.0), (0, 1, 0.0));
        assert_eq!(gradient_slots(3.5, 4.0), (3, 0, 0.5));
        assert_eq!(gradient_slots(0.25, 2.0), (0, 1, 0.25));
    }

    fn far_rect() -> FractalRect {
        FractalRect {
            top: 0.0,
            left: 3.0,
            right: 3.0,
            bottom: 0.0,
        }
    }

    #[test]
    fn default_block_shades_from_gray_gradient() {
        let p = DrawParameters::new(far_rect(), RenderSize { width: 4, height: 4 });
        let rgb = shade_pixel(&p, 1, 1);
        assert_ne!(rgb, unpack_rgb(crate::GRADIENT_SENTINEL));
        assert_eq!(rgb[0], rgb[1]);
        assert_eq!(rgb[1], rgb[2]);
    }

    #[test]
    fn zero_length_gradient_paints_fill() {
        let mut p = params(4, 4).with_fill(0x102030);
        p.set_rect(far_rect());
        p.gradient_length = 0;
        assert_eq!(shade_pixel(&p, 1, 1), unpack_rgb(0x102030));
    }

    #[test]
    fn corners_map_to_rect_edges() {
        let p = params(640, 480);
        assert_eq!(map_fragment(&p, 0.0, 0.0), (p.left, p.top));
        let (cr, ci) = map_fragment(&p, 639.0, 479.0);
        let dx = (p.right - p.left) / 640.0;
        let dy = (p.top - p.bottom) / 480.0;
        assert!((cr - p.right).abs() <= dx * 1.01);
        assert!((ci - p.bottom).abs() <= dy * 1.01);
    }

    #[test]
    fn resized_surface_rescales_mapping() {
        let mut p = params(640, 480);
        let before = map_fragment(&p, 320.0, 240.0);
        p.set_surface_size(RenderSize {
            width: 1280,
            height: 960,
        });
        assert_eq!(map_fragment(&p, 640.0, 480.0), before);
        assert_eq!(map_fragment(&p, 0.0, 0.0), (p.left, p.top));
    }

    #[test]
    fn shading_is_deterministic() {
        let p = params(32, 24);
        let a: Vec<[f32; 3]> = (0..24)
            .flat_map(|y| (0..32).map(move |x| (x, y)))
            .map(|(x, y)| shade_pixel(&p, x, y))
            .collect();
        let b: Vec<[f32; 3]> = (0..24)
            .flat_map(|y| (0..32).map(move |x| (x, y)))
            .map(|(x, y)| shade_pixel(&p, x, y))
            .collect();
        assert_eq!(a, b);
    }
}
