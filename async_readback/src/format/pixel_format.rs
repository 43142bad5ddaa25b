/// Pixel formats a render target (and therefore a staging copy) can have

/// Source pixel format of a texture
///
/// Only a subset has a decoder registered by default; see
/// [`PixelDecoderRegistry::with_defaults`](crate::format::PixelDecoderRegistry::with_defaults).
/// Depth formats are listed so they can be described, copied and reported as
/// unsupported rather than rejected at request time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8-bit single channel (grayscale)
    G8,
    /// 8-bit per channel, blue-green-red-alpha byte order
    B8G8R8A8,
    /// 8-bit per channel, red-green-blue-alpha byte order
    R8G8B8A8,
    /// 16-bit half float, single channel
    R16F,
    /// 16-bit half float per channel, RGBA
    FloatRGBA,
    /// 32-bit float per channel, RGBA
    A32B32G32R32F,
    /// 32-bit float depth
    D32Float,
    /// 24-bit depth + 8-bit stencil
    D24S8,
}

impl PixelFormat {
    /// Every known format, in declaration order
    pub const ALL: [PixelFormat; 8] = [
        PixelFormat::G8,
        PixelFormat::B8G8R8A8,
        PixelFormat::R8G8B8A8,
        PixelFormat::R16F,
        PixelFormat::FloatRGBA,
        PixelFormat::A32B32G32R32F,
        PixelFormat::D32Float,
        PixelFormat::D24S8,
    ];

    /// Size of one pixel in bytes
    pub fn block_bytes(self) -> usize {
        match self {
            PixelFormat::G8 => 1,
            PixelFormat::R16F => 2,
            PixelFormat::B8G8R8A8
            | PixelFormat::R8G8B8A8
            | PixelFormat::D32Float
            | PixelFormat::D24S8 => 4,
            PixelFormat::FloatRGBA => 8,
            PixelFormat::A32B32G32R32F => 16,
        }
    }

    /// True for floating-point color formats (decoded values may leave [0,1])
    pub fn is_float(self) -> bool {
        matches!(self, PixelFormat::R16F | PixelFormat::FloatRGBA | PixelFormat::A32B32G32R32F)
    }

    /// True for depth / depth-stencil formats
    pub fn is_depth(self) -> bool {
        matches!(self, PixelFormat::D32Float | PixelFormat::D24S8)
    }
}
