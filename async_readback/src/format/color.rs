/// Normalized 4-channel color produced by the pixel decoders

use glam::Vec4;

/// Linear RGBA color with `f32` channels
///
/// Integer formats decode into [0,1]; float formats are copied verbatim and
/// may hold HDR values outside that range.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LinearColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl LinearColor {
    /// All channels zero. Also the value left in pixels whose format has no decoder.
    pub const TRANSPARENT: LinearColor = LinearColor::new(0.0, 0.0, 0.0, 0.0);
    pub const BLACK: LinearColor = LinearColor::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: LinearColor = LinearColor::new(1.0, 1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Same value in every channel
    pub const fn splat(value: f32) -> Self {
        Self::new(value, value, value, value)
    }

    /// Divide 8-bit channel values by 255
    pub fn from_unorm8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self::from(Vec4::new(r as f32, g as f32, b as f32, a as f32) / 255.0)
    }

    pub fn to_vec4(self) -> Vec4 {
        Vec4::new(self.r, self.g, self.b, self.a)
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Per-channel comparison with an absolute tolerance
    pub fn abs_diff_eq(self, other: LinearColor, max_abs_diff: f32) -> bool {
        self.to_vec4().abs_diff_eq(other.to_vec4(), max_abs_diff)
    }

    /// Bitwise equality (distinguishes -0.0 / NaN payloads, unlike `==`)
    pub fn bit_eq(self, other: LinearColor) -> bool {
        self.to_array()
            .iter()
            .zip(other.to_array().iter())
            .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

impl From<Vec4> for LinearColor {
    fn from(v: Vec4) -> Self {
        Self::new(v.x, v.y, v.z, v.w)
    }
}

impl From<LinearColor> for Vec4 {
    fn from(c: LinearColor) -> Self {
        c.to_vec4()
    }
}

impl From<[f32; 4]> for LinearColor {
    fn from(c: [f32; 4]) -> Self {
        Self::new(c[0], c[1], c[2], c[3])
    }
}
