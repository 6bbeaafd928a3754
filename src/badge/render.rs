use std::io::Cursor;

use base64::Engine;
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};

pub const MIN_SIZE: u32 = 64;
pub const MAX_SIZE: u32 = 2048;

/// Requested pixel size clamped to what we are willing to render.
pub fn clamp_size(requested: Option<u32>, default: u32) -> u32 {
    requested.unwrap_or(default).clamp(MIN_SIZE, MAX_SIZE)
}

/// Render a badge value as a PNG of at least `size`×`size` pixels.
///
/// Pure function of its inputs. Error correction level M survives the
/// creases and glare printed badges pick up on a show floor.
pub fn render_png(value: &str, size: u32) -> anyhow::Result<Vec<u8>> {
    let code = QrCode::with_error_correction_level(value.as_bytes(), EcLevel::M)
        .map_err(|e| anyhow::anyhow!("QR encoding failed: {}", e))?;

    let img = code
        .render::<Luma<u8>>()
        .quiet_zone(true)
        .min_dimensions(size, size)
        .build();

    let mut png = Vec::new();
    DynamicImage::ImageLuma8(img).write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}

pub fn to_data_url(png: &[u8]) -> String {
    let engine = base64::engine::general_purpose::STANDARD;
    format!("data:image/png;base64,{}", engine.encode(png))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn test_clamp_size() {
        assert_eq!(clamp_size(None, 300), 300);
        assert_eq!(clamp_size(Some(10), 300), MIN_SIZE);
        assert_eq!(clamp_size(Some(10_000), 300), MAX_SIZE);
        assert_eq!(clamp_size(Some(512), 300), 512);
    }

    #[test]
    fn test_render_png_produces_png_of_requested_size() {
        let png = render_png("xp1_0123456789abcdef0123456789abcdef0123456789abcdef", 300).unwrap();
        assert!(png.starts_with(PNG_MAGIC));

        let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png).unwrap();
        assert!(decoded.width() >= 300);
        assert_eq!(decoded.width(), decoded.height());
    }

    #[test]
    fn test_render_is_deterministic() {
        let a = render_png("xp1_same", 128).unwrap();
        let b = render_png("xp1_same", 128).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_data_url_prefix() {
        let url = to_data_url(&[1, 2, 3]);
        assert_eq!(url, "data:image/png;base64,AQID");
    }
}
