/// Pixel format module - source formats, normalized colors and the decoder registry

pub mod pixel_format;
pub mod color;
pub mod decoder;

pub use pixel_format::*;
pub use color::*;
pub use decoder::*;
