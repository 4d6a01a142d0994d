//! Logo watermarking and downscaling for uploaded article images.

use std::io::Cursor;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, ImageFormat, RgbaImage};
use thiserror::Error;
use tracing::{debug, warn};

const DEFAULT_LOGO_SIZE_RATIO: f32 = 0.15;
const DEFAULT_MARGIN: u32 = 20;
const OUTPUT_QUALITY: u8 = 95;
const UNBOUNDED: u32 = 10_000;

#[derive(Debug, Error)]
pub enum ImagingError {
    #[error("no watermark logo loaded")]
    NoLogo,
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatermarkPosition {
    #[default]
    BottomRight,
    BottomLeft,
    TopRight,
    TopLeft,
    Center,
}

impl WatermarkPosition {
    /// Top-left corner of a `logo`-sized box inside `image`. May be negative
    /// when the logo plus margin does not fit; the overlay clips it.
    fn origin(self, image: (u32, u32), logo: (u32, u32), margin: u32) -> (i64, i64) {
        let (iw, ih) = (i64::from(image.0), i64::from(image.1));
        let (lw, lh) = (i64::from(logo.0), i64::from(logo.1));
        let m = i64::from(margin);
        match self {
            Self::BottomRight => (iw - lw - m, ih - lh - m),
            Self::BottomLeft => (m, ih - lh - m),
            Self::TopRight => (iw - lw - m, m),
            Self::TopLeft => (m, m),
            Self::Center => ((iw - lw) / 2, (ih - lh) / 2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatermarkOptions {
    pub position: WatermarkPosition,
    /// Logo width relative to the image width; halved before use.
    pub logo_size_ratio: f32,
    pub opacity: u8,
    pub margin: u32,
    pub circular: bool,
}

impl Default for WatermarkOptions {
    fn default() -> Self {
        Self {
            position: WatermarkPosition::BottomRight,
            logo_size_ratio: DEFAULT_LOGO_SIZE_RATIO,
            opacity: u8::MAX,
            margin: DEFAULT_MARGIN,
            circular: true,
        }
    }
}

/// Upload image processing over encoded bytes; output keeps the input's format.
#[derive(Debug, Clone, Default)]
pub struct ImageProcessor {
    logo: Option<DynamicImage>,
}

impl ImageProcessor {
    pub fn new(logo: Option<DynamicImage>) -> Self {
        Self { logo }
    }

    /// A missing or unreadable logo leaves the processor without one.
    pub fn from_logo_path(path: &Path) -> Self {
        if !path.exists() {
            debug!(logo = %path.display(), "no watermark logo present");
            return Self::default();
        }
        match image::open(path) {
            Ok(logo) => Self::new(Some(logo)),
            Err(err) => {
                warn!(logo = %path.display(), error = %err, "watermark logo unreadable");
                Self::default()
            }
        }
    }

    pub fn has_logo(&self) -> bool {
        self.logo.is_some()
    }

    fn watermark_image(&self, base: DynamicImage, options: &WatermarkOptions) -> Result<DynamicImage, ImagingError> {
        let logo = self.logo.as_ref().ok_or(ImagingError::NoLogo)?;
        let logo_width = ((base.width() as f32) * options.logo_size_ratio * 0.5) as u32;
        let logo_width = logo_width.max(1);
        let mut mark = if options.circular {
            circular(&logo.to_rgba8())
        } else {
            logo.to_rgba8()
        };
        mark = imageops::resize(&mark, logo_width, logo_width, FilterType::Lanczos3);
        if options.opacity < u8::MAX {
            for pixel in mark.pixels_mut() {
                pixel[3] = ((u16::from(pixel[3]) * u16::from(options.opacity)) / 255) as u8;
            }
        }

        let (x, y) = options
            .position
            .origin(base.dimensions(), (logo_width, logo_width), options.margin);
        let had_alpha = base.color().has_alpha();
        let mut canvas = base.to_rgba8();
        imageops::overlay(&mut canvas, &mark, x, y);

        Ok(if had_alpha {
            DynamicImage::ImageRgba8(canvas)
        } else {
            DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(canvas).to_rgb8())
        })
    }

    /// Upload pipeline: downscale to the bounds, then watermark. `None` means
    /// the bytes should be stored unchanged. GIFs always are, since decoding
    /// keeps only their first frame.
    pub fn prepare_upload(
        &self,
        bytes: &[u8],
        watermark: Option<&WatermarkOptions>,
        max_width: Option<u32>,
        max_height: Option<u32>,
    ) -> Result<Option<Vec<u8>>, ImagingError> {
        let bounded = max_width.is_some() || max_height.is_some();
        if watermark.is_none() && !bounded {
            return Ok(None);
        }
        let format = image::guess_format(bytes)?;
        if format == ImageFormat::Gif {
            return Ok(None);
        }

        let mut img = image::load_from_memory_with_format(bytes, format)?;
        let original_size = img.dimensions();
        if bounded {
            img = fit_within(img, max_width.unwrap_or(UNBOUNDED), max_height.unwrap_or(UNBOUNDED));
        }
        let mut changed = img.dimensions() != original_size;
        if let Some(options) = watermark {
            img = self.watermark_image(img, options)?;
            changed = true;
        }
        if !changed {
            return Ok(None);
        }
        debug!(?format, from = ?original_size, to = ?img.dimensions(), "upload processed");
        encode(&img, format, OUTPUT_QUALITY).map(Some)
    }
}

fn fit_within(img: DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    if img.width() <= max_width && img.height() <= max_height {
        return img;
    }
    img.resize(max_width.max(1), max_height.max(1), FilterType::Lanczos3)
}

/// Center square of `logo` with everything outside the inscribed circle transparent.
fn circular(logo: &RgbaImage) -> RgbaImage {
    let size = logo.width().min(logo.height());
    let left = (logo.width() - size) / 2;
    let top = (logo.height() - size) / 2;
    let mut square = imageops::crop_imm(logo, left, top, size, size).to_image();

    let radius = size as f32 / 2.0;
    for (x, y, pixel) in square.enumerate_pixels_mut() {
        let dx = x as f32 + 0.5 - radius;
        let dy = y as f32 + 0.5 - radius;
        if dx * dx + dy * dy > radius * radius {
            pixel[3] = 0;
        }
    }
    square
}

fn encode(img: &DynamicImage, format: ImageFormat, quality: u8) -> Result<Vec<u8>, ImagingError> {
    let mut buf = Vec::new();
    if format == ImageFormat::Jpeg {
        JpegEncoder::new_with_quality(&mut buf, quality).encode_image(&img.to_rgb8())?;
    } else {
        img.write_to(&mut Cursor::new(&mut buf), format)?;
    }
    Ok(buf)
}
