//! Camera frames as delivered by the capture collaborator.

use std::time::Duration;

use image::GrayImage;

/// Pixel layout of a frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Gray8,
    Rgb8,
    Rgba8,
    /// Full-resolution Y plane followed by interleaved, 2x2-subsampled VU.
    Nv21,
}

impl PixelFormat {
    /// Bytes a `width x height` buffer must hold.
    pub fn buffer_len(self, width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize);
        match self {
            Self::Gray8 => w * h,
            Self::Rgb8 => w * h * 3,
            Self::Rgba8 => w * h * 4,
            Self::Nv21 => w * h + 2 * w.div_ceil(2) * h.div_ceil(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    EmptyFrame,
    BufferSize { expected: usize, got: usize },
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyFrame => write!(f, "frame has zero width or height"),
            Self::BufferSize { expected, got } => {
                write!(f, "frame buffer holds {got} bytes, expected {expected}")
            }
        }
    }
}

impl std::error::Error for FrameError {}

/// One camera sample.
#[derive(Debug, Clone)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    format: PixelFormat,
    /// Capture time relative to the start of the camera session.
    pub timestamp: Duration,
    /// Platform ambient brightness estimate, if the camera reports one.
    pub brightness_hint: Option<f32>,
}

impl Frame {
    /// Wrap a raw buffer. The buffer size is checked when the frame is read.
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            format,
            timestamp: Duration::ZERO,
            brightness_hint: None,
        }
    }

    pub fn from_gray(img: GrayImage) -> Self {
        let (width, height) = img.dimensions();
        Self::new(img.into_raw(), width, height, PixelFormat::Gray8)
    }

    pub fn with_timestamp(mut self, timestamp: Duration) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_brightness_hint(mut self, hint: f32) -> Self {
        self.brightness_hint = Some(hint);
        self
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

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Luminance plane of the frame.
    pub fn to_luma(&self) -> Result<GrayImage, FrameError> {
        if self.width == 0 || self.height == 0 {
            return Err(FrameError::EmptyFrame);
        }
        let expected = self.format.buffer_len(self.width, self.height);
        if self.data.len() < expected {
            return Err(FrameError::BufferSize {
                expected,
                got: self.data.len(),
            });
        }
        let n = self.width as usize * self.height as usize;
        let luma: Vec<u8> = match self.format {
            PixelFormat::Gray8 | PixelFormat::Nv21 => self.data[..n].to_vec(),
            PixelFormat::Rgb8 => self.data[..n * 3].chunks_exact(3).map(rgb_to_luma).collect(),
            PixelFormat::Rgba8 => self.data[..n * 4].chunks_exact(4).map(rgb_to_luma).collect(),
        };
        GrayImage::from_raw(self.width, self.height, luma).ok_or(FrameError::BufferSize {
            expected,
            got: self.data.len(),
        })
    }
}

/// BT.601 luma in 8.8 fixed point.
#[inline]
fn rgb_to_luma(px: &[u8]) -> u8 {
    let v = 77 * px[0] as u32 + 150 * px[1] as u32 + 29 * px[2] as u32;
    ((v + 128) >> 8).min(255) as u8
}
