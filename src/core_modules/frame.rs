// THEORY:
// A `PixelBuffer` is one captured camera frame: a fixed-size grid of RGB or RGBA
// bytes. It is handed to the engine by the acquisition collaborator once per tick.
//
// The bytes live behind an `Arc<[u8]>`, so a clone is a pointer copy. This matters for
// the change gate: it keeps the previous frame as its differencing baseline, and that
// snapshot must never cost a full frame copy. A buffer is immutable once constructed,
// so a retained baseline can never be mutated by the producer of the next frame.

use std::path::Path;
use std::sync::Arc;

use image::{DynamicImage, RgbImage, RgbaImage};

use crate::core_modules::geometry::PixelRect;
use crate::core_modules::pixel::pixel::Pixel;
use crate::error::{ProbeError, Result};

/// Memory layout of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb8,
    Rgba8,
}

impl PixelFormat {
    pub fn channels(&self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }
}

/// An immutable, cheaply clonable camera frame.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Arc<[u8]>,
}

impl PixelBuffer {
    /// Wraps raw bytes, validating the dimensions against the data length.
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ProbeError::invalid_buffer(format!(
                "frame dimensions must be non-zero, got {}x{}",
                width, height
            )));
        }
        let expected = width as usize * height as usize * format.channels();
        if data.len() != expected {
            return Err(ProbeError::invalid_buffer(format!(
                "expected {} bytes for {}x{} {:?}, got {}",
                expected,
                width,
                height,
                format,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            data: data.into(),
        })
    }

    /// A frame where every pixel has the same color.
    pub fn filled(width: u32, height: u32, color: Pixel) -> Result<Self> {
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&[color.red, color.green, color.blue, color.alpha]);
        }
        Self::new(width, height, PixelFormat::Rgba8, data)
    }

    /// Decodes an image file into a frame.
    pub fn open(path: &Path) -> Result<Self> {
        let image = image::open(path)?;
        Self::from_dynamic(image)
    }

    pub fn from_dynamic(image: DynamicImage) -> Result<Self> {
        match image {
            DynamicImage::ImageRgb8(rgb) => Self::from_rgb(rgb),
            other => Self::from_rgba(other.into_rgba8()),
        }
    }

    pub fn from_rgb(image: RgbImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        Self::new(width, height, PixelFormat::Rgb8, image.into_raw())
    }

    pub fn from_rgba(image: RgbaImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        Self::new(width, height, PixelFormat::Rgba8, image.into_raw())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// The rectangle covering the whole frame.
    pub fn bounds(&self) -> PixelRect {
        PixelRect::new(0, 0, self.width, self.height)
    }

    pub fn same_dimensions(&self, other: &PixelBuffer) -> bool {
        self.width == other.width && self.height == other.height
    }

    /// Reads the pixel at `(x, y)`. Callers must stay inside `bounds()`.
    pub fn pixel(&self, x: u32, y: u32) -> Pixel {
        let channels = self.format.channels();
        let offset = (y as usize * self.width as usize + x as usize) * channels;
        let bytes = &self.data[offset..offset + channels];
        match self.format {
            PixelFormat::Rgb8 => Pixel::rgb(bytes[0], bytes[1], bytes[2]),
            PixelFormat::Rgba8 => Pixel::new(bytes[0], bytes[1], bytes[2], bytes[3]),
        }
    }

    /// Bounds-checked variant of [`PixelBuffer::pixel`].
    pub fn get(&self, x: u32, y: u32) -> Option<Pixel> {
        (x < self.width && y < self.height).then(|| self.pixel(x, y))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}
