use super::AssetError;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Decoded RGBA8 image plus the encoded bytes it came from.
#[derive(Clone)]
pub struct Texture {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub encoded: Arc<[u8]>,
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("encoded_len", &self.encoded.len())
            .finish()
    }
}

impl Texture {
    /// Build from raw RGBA8 pixels; `encoded` stays empty.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, AssetError> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected || width == 0 || height == 0 {
            return Err(AssetError::TextureSize {
                width,
                height,
                len: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
            encoded: Arc::from(Vec::new()),
        })
    }

    /// This texture, or a copy scaled down so neither side exceeds
    /// `max_dimension`. The aspect ratio is kept.
    pub fn fitted(&self, max_dimension: u32) -> Cow<'_, Texture> {
        let max_dimension = max_dimension.max(1);
        if self.width <= max_dimension && self.height <= max_dimension {
            return Cow::Borrowed(self);
        }
        let Some(image) = image::RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
        else {
            return Cow::Borrowed(self);
        };
        let (width, height) = fit_dimensions(self.width, self.height, max_dimension);
        let resized =
            image::imageops::resize(&image, width, height, image::imageops::FilterType::Triangle);
        Cow::Owned(Texture {
            width,
            height,
            pixels: resized.into_raw(),
            encoded: self.encoded.clone(),
        })
    }
}

/// Scale `width` x `height` so the longer side is at most `max_dimension`.
pub fn fit_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_dimension {
        return (width, height);
    }
    let scale = |side: u32| ((side as u64 * max_dimension as u64) / longest as u64).max(1) as u32;
    (scale(width), scale(height))
}

/// Decode any format the `image` crate understands into RGBA8.
pub fn load_texture(encoded: Arc<[u8]>) -> Result<Texture, AssetError> {
    let decoded = image::load_from_memory(&encoded)?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(Texture {
        width,
        height,
        pixels: rgba.into_raw(),
        encoded,
    })
}

#[cfg(test)]
pub(crate) fn encode_png(width: u32, height: u32, rgba: &[u8]) -> Vec<u8> {
    use image::ImageEncoder;
    let mut out = Vec::new();
    image::codecs::png::PngEncoder::new(&mut out)
        .write_image(rgba, width, height, image::ExtendedColorType::Rgba8)
        .unwrap();
    out
}
