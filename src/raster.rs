//! Decoding, normalizing and re-encoding a single PDF image XObject.

use std::io::Read;

use anyhow::{anyhow, bail, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{
    DynamicImage, ExtendedColorType, GenericImageView, GrayImage, ImageFormat, Rgb, RgbImage,
};
use lopdf::{Dictionary, Object, Stream};

use crate::quality::RecompressSettings;

/// A re-encoded image ready to replace the original stream content.
#[derive(Debug)]
pub struct Recompressed {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub gray: bool,
    /// Dimensions before any downscaling.
    pub source_dims: (u32, u32),
    /// The soft mask was composited into the pixels and must be dropped.
    pub mask_applied: bool,
}

/// Decodes `stream`, normalizes and shrinks it, and encodes it as JPEG.
/// A `soft_mask` of matching size is applied as alpha before flattening
/// onto white.
pub fn recompress(
    stream: &Stream,
    soft_mask: Option<&Stream>,
    settings: RecompressSettings,
) -> Result<Recompressed> {
    let mut img = decode(stream)?;
    let mut mask_applied = false;
    if let Some(mask) = soft_mask {
        let alpha = decode_soft_mask(mask)?;
        if alpha.dimensions() == img.dimensions() {
            img = apply_alpha(&img, &alpha);
            mask_applied = true;
        }
    }
    let img = normalize(img);
    let source_dims = img.dimensions();

    let (w, h) = fit_within(source_dims.0, source_dims.1, settings.max_dimension);
    let img = if (w, h) != source_dims {
        img.resize_exact(w, h, FilterType::Lanczos3)
    } else {
        img
    };

    let mut data = Vec::new();
    let gray = {
        let mut encoder = JpegEncoder::new_with_quality(&mut data, settings.jpeg_quality);
        match &img {
            DynamicImage::ImageLuma8(buf) => {
                encoder.encode(buf.as_raw(), w, h, ExtendedColorType::L8)?;
                true
            }
            other => {
                let rgb = other.to_rgb8();
                encoder.encode(rgb.as_raw(), w, h, ExtendedColorType::Rgb8)?;
                false
            }
        }
    };

    Ok(Recompressed {
        data,
        width: w,
        height: h,
        gray,
        source_dims,
        mask_applied,
    })
}

/// Swaps the stream's content for the re-encoded JPEG and rewrites the
/// dictionary entries that describe it.
pub fn replace_content(stream: &mut Stream, image: Recompressed) {
    let color_space: &[u8] = if image.gray {
        b"DeviceGray"
    } else {
        b"DeviceRGB"
    };
    stream
        .dict
        .set("Length", Object::Integer(image.data.len() as i64));
    stream.content = image.data;
    stream.dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
    stream.dict.set("Width", Object::Integer(image.width as i64));
    stream.dict.set("Height", Object::Integer(image.height as i64));
    stream
        .dict
        .set("ColorSpace", Object::Name(color_space.to_vec()));
    stream.dict.set("BitsPerComponent", Object::Integer(8));
    stream.dict.remove(b"DecodeParms");
    stream.dict.remove(b"Decode");
    if image.mask_applied {
        stream.dict.remove(b"SMask");
    }
    // DCT streams must not be flate-compressed again on save
    stream.allows_compression = false;
}

/// Largest size within a `cap`x`cap` box that keeps the aspect ratio.
/// Both sides are scaled by the same factor and truncated.
pub fn fit_within(width: u32, height: u32, cap: u32) -> (u32, u32) {
    if width <= cap && height <= cap {
        return (width, height);
    }
    let ratio = f64::min(cap as f64 / width as f64, cap as f64 / height as f64);
    let scaled = |side: u32| ((side as f64 * ratio) as u32).max(1);
    (scaled(width), scaled(height))
}

/// Keeps plain gray and RGB as they are, composites alpha onto white and
/// converts every other mode to RGB.
fn normalize(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => img,
        other if other.color().has_alpha() => DynamicImage::ImageRgb8(flatten_on_white(&other)),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

fn flatten_on_white(img: &DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (src, dst) in rgba.pixels().zip(out.pixels_mut()) {
        let alpha = src[3] as u16;
        let blend = |c: u8| ((c as u16 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        *dst = Rgb([blend(src[0]), blend(src[1]), blend(src[2])]);
    }
    out
}

fn apply_alpha(img: &DynamicImage, alpha: &GrayImage) -> DynamicImage {
    let mut rgba = img.to_rgba8();
    for (pixel, a) in rgba.pixels_mut().zip(alpha.pixels()) {
        pixel[3] = a[0];
    }
    DynamicImage::ImageRgba8(rgba)
}

fn decode_soft_mask(mask: &Stream) -> Result<GrayImage> {
    match decode(mask).context("Failed to decode soft mask")? {
        DynamicImage::ImageLuma8(alpha) => Ok(alpha),
        _ => bail!("soft mask is not grayscale"),
    }
}

fn filter_names(stream: &Stream) -> Vec<Vec<u8>> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(arr)) => arr
            .iter()
            .filter_map(|o| o.as_name().ok().map(<[u8]>::to_vec))
            .collect(),
        _ => Vec::new(),
    }
}

fn decompress_stream(stream: &Stream) -> Result<Vec<u8>> {
    match stream.decompressed_content() {
        Ok(c) => Ok(c),
        Err(e) => {
            if filter_names(stream) == [b"FlateDecode".to_vec()] {
                let mut decoder = flate2::read::ZlibDecoder::new(&stream.content[..]);
                let mut buffer = Vec::new();
                decoder
                    .read_to_end(&mut buffer)
                    .context("Manual zlib failed")?;
                Ok(buffer)
            } else {
                Err(anyhow!("Decompression failed: {:?}", e))
            }
        }
    }
}

fn decode(stream: &Stream) -> Result<DynamicImage> {
    let dict = &stream.dict;
    if matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true))) {
        bail!("stencil mask");
    }

    if dict.has(b"Decode") {
        bail!("custom Decode array");
    }
    if matches!(dict.get(b"Mask"), Ok(Object::Array(_))) {
        bail!("color key mask");
    }

    let filters = filter_names(stream);
    match filters.as_slice() {
        [only] if only == b"DCTDecode" => {
            return image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg)
                .context("Failed to decode JPEG");
        }
        _ => {}
    }
    if let Some(f) = filters.iter().find(|f| {
        matches!(
            f.as_slice(),
            b"DCTDecode" | b"JPXDecode" | b"JBIG2Decode" | b"CCITTFaxDecode"
        )
    }) {
        bail!("unsupported filter {}", String::from_utf8_lossy(f));
    }

    let content = if filters.is_empty() {
        stream.content.clone()
    } else {
        decompress_stream(stream)?
    };

    let width = dimension(dict, b"Width")?;
    let height = dimension(dict, b"Height")?;
    let bits = dict
        .get(b"BitsPerComponent")
        .and_then(Object::as_i64)
        .unwrap_or(8);
    if bits != 8 {
        bail!("unsupported BitsPerComponent {}", bits);
    }

    let pixels = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| anyhow!("image too large: {}x{}", width, height))?;
    let components = match dict.get(b"ColorSpace") {
        Ok(Object::Name(name)) => match name.as_slice() {
            b"DeviceGray" | b"CalGray" => 1,
            b"DeviceRGB" | b"CalRGB" => 3,
            b"DeviceCMYK" => 4,
            other => bail!("unsupported color space {}", String::from_utf8_lossy(other)),
        },
        Ok(Object::Array(arr))
            if arr.first().and_then(|o| o.as_name().ok()) == Some(b"Indexed".as_slice()) =>
        {
            bail!("indexed color space")
        }
        // ICCBased and friends: infer from the sample count
        _ => match content.len() / pixels {
            n @ (1 | 3 | 4) if content.len() == pixels * n => n,
            _ => bail!("cannot infer components"),
        },
    };
    let expected = pixels
        .checked_mul(components)
        .ok_or_else(|| anyhow!("image too large: {}x{}x{}", width, height, components))?;
    if content.len() < expected {
        bail!(
            "short image data: {} bytes for {}x{}x{}",
            content.len(),
            width,
            height,
            components
        );
    }
    let mut content = content;
    content.truncate(expected);

    let img = match components {
        1 => DynamicImage::ImageLuma8(
            image::GrayImage::from_raw(width, height, content).ok_or(anyhow!("Failed Gray"))?,
        ),
        3 => DynamicImage::ImageRgb8(
            image::RgbImage::from_raw(width, height, content).ok_or(anyhow!("Failed RGB"))?,
        ),
        _ => DynamicImage::ImageRgb8(
            image::RgbImage::from_raw(width, height, cmyk_to_rgb(&content))
                .ok_or(anyhow!("Failed CMYK->RGB"))?,
        ),
    };
    Ok(img)
}

/// A positive `/Width` or `/Height` that fits in `u32`.
fn dimension(dict: &Dictionary, key: &[u8]) -> Result<u32> {
    let value = dict
        .get(key)
        .and_then(Object::as_i64)
        .map_err(|_| anyhow!("missing {}", String::from_utf8_lossy(key)))?;
    match u32::try_from(value) {
        Ok(v) if v > 0 => Ok(v),
        _ => bail!("invalid {} {}", String::from_utf8_lossy(key), value),
    }
}

fn cmyk_to_rgb(content: &[u8]) -> Vec<u8> {
    content
        .chunks_exact(4)
        .flat_map(|cmyk| {
            let k = 1.0 - cmyk[3] as f32 / 255.0;
            let channel = |v: u8| ((1.0 - v as f32 / 255.0) * k * 255.0) as u8;
            [channel(cmyk[0]), channel(cmyk[1]), channel(cmyk[2])]
        })
        .collect()
}
