/// Texture trait, texture descriptor, and texture info

use std::any::Any;

use bitflags::bitflags;

use crate::format::PixelFormat;

bitflags! {
    /// Texture usage flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Texture can be sampled in shaders
        const SAMPLED = 1 << 0;
        /// Texture can be used as render target
        const RENDER_TARGET = 1 << 1;
        /// Texture can be the source of a copy
        const COPY_SRC = 1 << 2;
        /// Texture can be the destination of a copy
        const COPY_DST = 1 << 3;
        /// Texture memory can be mapped for CPU reads
        const CPU_READBACK = 1 << 4;
    }
}

impl TextureUsage {
    /// Usage of a render target that can be read back
    pub const READABLE_TARGET: TextureUsage = TextureUsage::SAMPLED
        .union(TextureUsage::RENDER_TARGET)
        .union(TextureUsage::COPY_SRC);

    /// Usage of a staging texture
    pub const STAGING: TextureUsage = TextureUsage::COPY_DST
        .union(TextureUsage::COPY_SRC)
        .union(TextureUsage::CPU_READBACK);
}

/// Resource state used by copy transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceAccess {
    /// Whatever state the resource is currently in; contents are preserved
    Unknown,
    /// Readable by copy operations
    CopySrc,
    /// Writable by copy operations
    CopyDest,
}

// ===== TEXTURE DESC =====

/// Descriptor for creating a texture
#[derive(Debug, Clone)]
pub struct TextureDesc {
    /// Debug name
    pub name: String,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel format
    pub format: PixelFormat,
    /// Usage flags
    pub usage: TextureUsage,
    /// Optional tightly packed pixel data uploaded at creation time
    pub data: Option<Vec<u8>>,
}

impl TextureDesc {
    /// Readable render target without initial data
    pub fn render_target(name: impl Into<String>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            format,
            usage: TextureUsage::READABLE_TARGET,
            data: None,
        }
    }

    /// Attach initial pixel data
    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = Some(data);
        self
    }

    /// Size in bytes of a tightly packed image of this descriptor
    pub fn packed_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.block_bytes()
    }
}

// ===== TEXTURE INFO =====

/// Read-only properties of a created texture.
///
/// Returned by `Texture::info()` to query texture properties
/// without exposing backend-specific details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureInfo {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel format
    pub format: PixelFormat,
    /// Usage flags
    pub usage: TextureUsage,
}

impl TextureInfo {
    /// Returns true if this texture can be mapped for CPU reads
    pub fn is_staging(&self) -> bool {
        self.usage.contains(TextureUsage::CPU_READBACK)
    }
}

// ===== TEXTURE TRAIT =====

/// Texture resource trait
///
/// Implemented by backend-specific texture types (e.g., VulkanTexture) and
/// by the staging textures a backend hands out for readback.
/// The texture is automatically destroyed when dropped.
pub trait Texture: Send + Sync {
    /// Get the read-only properties of this texture
    fn info(&self) -> &TextureInfo;

    /// Whether the texture still has GPU memory behind it
    fn is_allocated(&self) -> bool {
        true
    }

    /// Backend downcasting
    fn as_any(&self) -> &dyn Any;
}
