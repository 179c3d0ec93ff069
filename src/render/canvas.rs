//! RGBA canvas and color ramp

use bytemuck::{Pod, Zeroable};

/// One RGBA pixel, laid out for direct upload to a host surface
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    fn lerp(self, other: Self, t: f32) -> Self {
        let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        Self {
            r: mix(self.r, other.r),
            g: mix(self.g, other.g),
            b: mix(self.b, other.b),
            a: mix(self.a, other.a),
        }
    }
}

pub const DEEP_BLUE: Rgba = Rgba::rgb(0, 0, 128);
pub const CYAN: Rgba = Rgba::rgb(0, 255, 255);
pub const GREEN: Rgba = Rgba::rgb(0, 255, 0);
pub const YELLOW: Rgba = Rgba::rgb(255, 255, 0);
pub const RED: Rgba = Rgba::rgb(255, 0, 0);

/// Piecewise-linear color ramp over evenly spaced stops
#[derive(Debug, Clone)]
pub struct ColorRamp {
    stops: Vec<Rgba>,
}

impl ColorRamp {
    /// # Panics
    /// If fewer than two stops are given.
    pub fn new(stops: Vec<Rgba>) -> Self {
        assert!(stops.len() >= 2, "a ramp needs at least two stops");
        Self { stops }
    }

    /// deep blue → cyan → green → yellow → red
    pub fn spectrogram() -> Self {
        Self::new(vec![DEEP_BLUE, CYAN, GREEN, YELLOW, RED])
    }

    /// Color at `t`, clamped to 0.0..=1.0 (NaN maps to the first stop)
    pub fn map(&self, t: f32) -> Rgba {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let segments = (self.stops.len() - 1) as f32;
        let position = t * segments;
        let index = (position.floor() as usize).min(self.stops.len() - 2);
        let local = position - index as f32;
        self.stops[index].lerp(self.stops[index + 1], local)
    }
}

impl Default for ColorRamp {
    fn default() -> Self {
        Self::spectrogram()
    }
}

/// Row-major RGBA pixel buffer, row 0 at the top
#[derive(Debug, Clone)]
pub struct Canvas {
    width: usize,
    height: usize,
    pixels: Vec<Rgba>,
}

impl Canvas {
    /// Canvas filled with the background color
    pub fn new(width: usize, height: usize, background: Rgba) -> Self {
        Self {
            width,
            height,
            pixels: vec![background; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<Rgba> {
        if x < self.width && y < self.height {
            Some(self.pixels[y * self.width + x])
        } else {
            None
        }
    }

    pub fn set_pixel(&mut self, x: usize, y: usize, color: Rgba) {
        if x < self.width && y < self.height {
            self.pixels[y * self.width + x] = color;
        }
    }

    pub fn fill(&mut self, color: Rgba) {
        self.pixels.iter_mut().for_each(|p| *p = color);
    }

    /// Fill the rectangle clipped to the canvas
    pub fn fill_rect(&mut self, x: usize, y: usize, w: usize, h: usize, color: Rgba) {
        let x_end = (x + w).min(self.width);
        let y_end = (y + h).min(self.height);
        for row in y.min(self.height)..y_end {
            let start = row * self.width;
            self.pixels[start + x.min(x_end)..start + x_end].fill(color);
        }
    }

    /// Move every row one pixel to the left; the last column keeps its
    /// old value until overwritten
    pub fn shift_left(&mut self) {
        if self.width < 2 {
            return;
        }
        for row in self.pixels.chunks_exact_mut(self.width) {
            row.copy_within(1.., 0);
        }
    }

    /// Overwrite column `x` with `color(y)` for every row
    pub fn draw_column<F>(&mut self, x: usize, mut color: F)
    where
        F: FnMut(usize) -> Rgba,
    {
        if x >= self.width {
            return;
        }
        for y in 0..self.height {
            self.pixels[y * self.width + x] = color(y);
        }
    }

    pub fn pixels(&self) -> &[Rgba] {
        &self.pixels
    }

    /// Raw RGBA bytes for the host surface
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    /// Binary PPM (P6) image of the canvas, alpha dropped
    pub fn to_ppm(&self) -> Vec<u8> {
        let header = format!("P6\n{} {}\n255\n", self.width, self.height);
        let mut out = Vec::with_capacity(header.len() + self.pixels.len() * 3);
        out.extend_from_slice(header.as_bytes());
        for p in &self.pixels {
            out.extend_from_slice(&[p.r, p.g, p.b]);
        }
        out
    }
}
