/// Conversions between readback types and Vulkan enums
///
/// Pure functions, testable without a GPU.

use async_readback::device::{ResourceAccess, TextureUsage};
use async_readback::format::PixelFormat;
use ash::vk;

/// Vulkan format of a pixel format
pub fn pixel_format_to_vk(format: PixelFormat) -> vk::Format {
    match format {
        PixelFormat::G8 => vk::Format::R8_UNORM,
        PixelFormat::B8G8R8A8 => vk::Format::B8G8R8A8_UNORM,
        PixelFormat::R8G8B8A8 => vk::Format::R8G8B8A8_UNORM,
        PixelFormat::R16F => vk::Format::R16_SFLOAT,
        PixelFormat::FloatRGBA => vk::Format::R16G16B16A16_SFLOAT,
        PixelFormat::A32B32G32R32F => vk::Format::R32G32B32A32_SFLOAT,
        PixelFormat::D32Float => vk::Format::D32_SFLOAT,
        PixelFormat::D24S8 => vk::Format::D24_UNORM_S8_UINT,
    }
}

/// Image usage flags of a texture
///
/// `upload` adds TRANSFER_DST for textures created with initial data.
pub fn texture_usage_to_vk(usage: TextureUsage, format: PixelFormat, upload: bool) -> vk::ImageUsageFlags {
    let mut flags = vk::ImageUsageFlags::empty();
    if usage.contains(TextureUsage::SAMPLED) {
        flags |= vk::ImageUsageFlags::SAMPLED;
    }
    if usage.contains(TextureUsage::RENDER_TARGET) {
        flags |= if format.is_depth() {
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
        } else {
            vk::ImageUsageFlags::COLOR_ATTACHMENT
        };
    }
    if usage.contains(TextureUsage::COPY_SRC) {
        flags |= vk::ImageUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(TextureUsage::COPY_DST) || upload {
        flags |= vk::ImageUsageFlags::TRANSFER_DST;
    }
    flags
}

/// Aspects covered by layout barriers
pub fn barrier_aspect(format: PixelFormat) -> vk::ImageAspectFlags {
    match format {
        PixelFormat::D24S8 => vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
        PixelFormat::D32Float => vk::ImageAspectFlags::DEPTH,
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Aspect read by buffer copies (exactly one bit)
pub fn copy_aspect(format: PixelFormat) -> vk::ImageAspectFlags {
    if format.is_depth() {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// Image layout for a copy access state
///
/// `Unknown` keeps `current`, so existing contents are never discarded.
pub fn access_to_layout(access: ResourceAccess, current: vk::ImageLayout) -> vk::ImageLayout {
    match access {
        ResourceAccess::Unknown => current,
        ResourceAccess::CopySrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ResourceAccess::CopyDest => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    }
}

/// Access mask matching an image layout
pub fn layout_access_mask(layout: vk::ImageLayout) -> vk::AccessFlags {
    match layout {
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => vk::AccessFlags::TRANSFER_READ,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => vk::AccessFlags::TRANSFER_WRITE,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => vk::AccessFlags::SHADER_READ,
        _ => vk::AccessFlags::empty(),
    }
}

/// Row pitch of a staging buffer, in pixels
///
/// Rows start on `alignment`-byte boundaries and always hold a whole number
/// of pixels. An alignment of 0 or 1 packs rows tightly.
pub fn staging_row_pitch(width: u32, format: PixelFormat, alignment: u32) -> u32 {
    let block = format.block_bytes() as u64;
    let alignment = lcm(alignment.max(1) as u64, block);
    let row_bytes = width as u64 * block;
    let pitch_bytes = row_bytes.div_ceil(alignment) * alignment;
    (pitch_bytes / block) as u32
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 { a } else { gcd(b, a % b) }
}

fn lcm(a: u64, b: u64) -> u64 {
    a / gcd(a, b) * b
}

#[cfg(test)]
#[path = "vulkan_format_tests.rs"]
mod tests;
