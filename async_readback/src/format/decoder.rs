/// Pixel decoders and the registry that maps formats to them
///
/// Decoders are pure functions from one raw source pixel to a [`LinearColor`].
/// The poll stage only ever talks to the registry, so supporting a new format
/// means registering one more entry, nothing else.

use bytemuck::pod_read_unaligned;
use half::f16;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::format::{LinearColor, PixelFormat};

/// Signature of a single-pixel decode function
///
/// `raw` is at least `format.block_bytes()` long.
pub type DecodeFn = fn(raw: &[u8]) -> LinearColor;

/// A named decode function
#[derive(Debug, Clone, Copy)]
pub struct PixelDecoder {
    /// Human-readable name (shows up in logs)
    pub name: &'static str,
    /// Decode function
    pub decode: DecodeFn,
}

impl PixelDecoder {
    pub const fn new(name: &'static str, decode: DecodeFn) -> Self {
        Self { name, decode }
    }
}

// ===== BUILT-IN DECODERS =====

/// 8-bit grayscale: replicated to RGB, alpha forced to 1
pub fn decode_g8(raw: &[u8]) -> LinearColor {
    let v = raw[0] as f32 / 255.0;
    LinearColor::new(v, v, v, 1.0)
}

/// 8-bit BGRA byte order
pub fn decode_b8g8r8a8(raw: &[u8]) -> LinearColor {
    LinearColor::from_unorm8(raw[2], raw[1], raw[0], raw[3])
}

/// 8-bit RGBA byte order
pub fn decode_r8g8b8a8(raw: &[u8]) -> LinearColor {
    LinearColor::from_unorm8(raw[0], raw[1], raw[2], raw[3])
}

/// 16-bit half float single channel: clamped to [0,1], replicated to all channels
pub fn decode_r16f(raw: &[u8]) -> LinearColor {
    let bits = u16::from_le_bytes([raw[0], raw[1]]);
    let v = f16::from_bits(bits).to_f32().clamp(0.0, 1.0);
    LinearColor::splat(v)
}

/// 16-bit half float RGBA: copied verbatim (HDR values preserved)
pub fn decode_float_rgba(raw: &[u8]) -> LinearColor {
    let bits: [u16; 4] = pod_read_unaligned(&raw[..8]);
    let [r, g, b, a] = bits.map(|h| f16::from_bits(u16::from_le(h)).to_f32());
    LinearColor::new(r, g, b, a)
}

/// 32-bit float RGBA: copied verbatim
pub fn decode_a32b32g32r32f(raw: &[u8]) -> LinearColor {
    let channels: [f32; 4] = pod_read_unaligned(&raw[..16]);
    LinearColor::from(channels)
}

// ===== REGISTRY =====

/// Table of decoders keyed by pixel format
#[derive(Debug, Clone)]
pub struct PixelDecoderRegistry {
    decoders: FxHashMap<PixelFormat, PixelDecoder>,
}

impl PixelDecoderRegistry {
    /// Registry with no decoders at all
    pub fn empty() -> Self {
        Self {
            decoders: FxHashMap::default(),
        }
    }

    /// Registry with the built-in color decoders
    ///
    /// Depth formats are deliberately absent.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(PixelFormat::G8, PixelDecoder::new("G8", decode_g8));
        registry.register(PixelFormat::B8G8R8A8, PixelDecoder::new("B8G8R8A8", decode_b8g8r8a8));
        registry.register(PixelFormat::R8G8B8A8, PixelDecoder::new("R8G8B8A8", decode_r8g8b8a8));
        registry.register(PixelFormat::R16F, PixelDecoder::new("R16F", decode_r16f));
        registry.register(PixelFormat::FloatRGBA, PixelDecoder::new("FloatRGBA", decode_float_rgba));
        registry.register(
            PixelFormat::A32B32G32R32F,
            PixelDecoder::new("A32B32G32R32F", decode_a32b32g32r32f),
        );
        registry
    }

    /// Register (or replace) the decoder for `format`
    ///
    /// Returns the decoder previously registered for that format, if any.
    pub fn register(&mut self, format: PixelFormat, decoder: PixelDecoder) -> Option<PixelDecoder> {
        self.decoders.insert(format, decoder)
    }

    /// Remove the decoder for `format`
    pub fn unregister(&mut self, format: PixelFormat) -> Option<PixelDecoder> {
        self.decoders.remove(&format)
    }

    /// Decoder registered for `format`
    pub fn get(&self, format: PixelFormat) -> Option<&PixelDecoder> {
        self.decoders.get(&format)
    }

    pub fn supports(&self, format: PixelFormat) -> bool {
        self.decoders.contains_key(&format)
    }

    /// Formats with a registered decoder, in no particular order
    pub fn formats(&self) -> impl Iterator<Item = PixelFormat> + '_ {
        self.decoders.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Decode one pixel
    ///
    /// # Errors
    ///
    /// `Error::UnsupportedFormat` if no decoder is registered. Callers inside
    /// the pipeline log this and keep the default color.
    ///
    /// # Panics
    ///
    /// If `raw` is shorter than one pixel of `format`.
    pub fn decode(&self, format: PixelFormat, raw: &[u8]) -> Result<LinearColor> {
        let decoder = self.get(format).ok_or(Error::UnsupportedFormat(format))?;
        assert!(
            raw.len() >= format.block_bytes(),
            "pixel buffer too small for {:?}: {} < {} bytes",
            format,
            raw.len(),
            format.block_bytes()
        );
        Ok((decoder.decode)(raw))
    }
}

impl Default for PixelDecoderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
#[path = "decoder_tests.rs"]
mod tests;
