/// Requested regions and their clamping against the source size

/// What part of the source a request reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionRequest {
    /// One pixel; delivered as a single color
    Pixel { x: i32, y: i32 },
    /// A rectangle; delivered as a row-major array
    Rect { x: i32, y: i32, width: u32, height: u32 },
    /// The whole source; delivered as a row-major array
    EntireSurface,
}

impl RegionRequest {
    /// Clamp the request against a `source_width` x `source_height` source
    ///
    /// The origin is clamped into the source, then the extent is shrunk so
    /// the region stays inside it. Extents are never smaller than one pixel.
    ///
    /// # Panics
    ///
    /// If the source has a zero dimension.
    pub fn resolve(self, source_width: u32, source_height: u32) -> ReadbackRegion {
        assert!(
            source_width > 0 && source_height > 0,
            "cannot read back from an empty {}x{} surface",
            source_width,
            source_height
        );
        match self {
            RegionRequest::Pixel { x, y } => ReadbackRegion {
                x: clamp_coord(x, source_width),
                y: clamp_coord(y, source_height),
                width: 1,
                height: 1,
            },
            RegionRequest::Rect { x, y, width, height } => {
                let x = clamp_coord(x, source_width);
                let y = clamp_coord(y, source_height);
                ReadbackRegion {
                    x,
                    y,
                    width: width.clamp(1, source_width - x),
                    height: height.clamp(1, source_height - y),
                }
            }
            RegionRequest::EntireSurface => ReadbackRegion {
                x: 0,
                y: 0,
                width: source_width,
                height: source_height,
            },
        }
    }

    /// Whether the result is a single color rather than an array
    pub fn is_single_pixel(&self) -> bool {
        matches!(self, RegionRequest::Pixel { .. })
    }
}

fn clamp_coord(value: i32, size: u32) -> u32 {
    let max = size.saturating_sub(1).min(i32::MAX as u32) as i32;
    value.clamp(0, max) as u32
}

/// Clamped region, guaranteed inside the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReadbackRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ReadbackRegion {
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

#[cfg(test)]
#[path = "region_tests.rs"]
mod tests;
