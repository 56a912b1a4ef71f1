//! PNG reading and writing.
//!
//! Palette, low bit depth and 16-bit inputs are normalized to 8 bits per
//! channel by the decoder. Gray inputs are widened to RGB(A) since the
//! engine only blurs 3 and 4 channel images.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Context, Result, bail};
use blur_core::{Channels, PixelBuffer};

/// Decodes a PNG file into a pixel buffer.
pub fn read_png(path: &Path) -> Result<PixelBuffer> {
    let file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    let mut decoder = png::Decoder::new(BufReader::new(file));
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder
        .read_info()
        .with_context(|| format!("Cannot decode {}", path.display()))?;

    let buf_size = reader
        .output_buffer_size()
        .context("Cannot determine PNG output buffer size")?;
    let mut buf = vec![0u8; buf_size];
    let info = reader
        .next_frame(&mut buf)
        .with_context(|| format!("Cannot decode {}", path.display()))?;

    if info.bit_depth != png::BitDepth::Eight {
        bail!("Unsupported PNG bit depth {:?}", info.bit_depth);
    }

    let (width, height) = (info.width, info.height);
    let image = match info.color_type {
        png::ColorType::Rgb => {
            buf.truncate(info.buffer_size());
            PixelBuffer::from_vec_with_stride(width, height, Channels::Rgb, info.line_size, buf)?
        }
        png::ColorType::Rgba => {
            buf.truncate(info.buffer_size());
            PixelBuffer::from_vec_with_stride(width, height, Channels::Rgba, info.line_size, buf)?
        }
        png::ColorType::Grayscale => {
            let data = widen(&buf, info.line_size, width, height, 1);
            PixelBuffer::from_vec(width, height, Channels::Rgb, data)?
        }
        png::ColorType::GrayscaleAlpha => {
            let data = widen(&buf, info.line_size, width, height, 2);
            PixelBuffer::from_vec(width, height, Channels::Rgba, data)?
        }
        other => bail!("Unsupported PNG color type {other:?}"),
    };
    Ok(image)
}

/// Expands gray (1 channel) to RGB or gray+alpha (2 channels) to RGBA.
fn widen(buf: &[u8], line_size: usize, width: u32, height: u32, src_channels: usize) -> Vec<u8> {
    let dst_channels = src_channels + 2;
    let mut out = Vec::with_capacity(width as usize * height as usize * dst_channels);
    for y in 0..height as usize {
        let row = &buf[y * line_size..y * line_size + width as usize * src_channels];
        for px in row.chunks_exact(src_channels) {
            out.extend_from_slice(&[px[0], px[0], px[0]]);
            if src_channels == 2 {
                out.push(px[1]);
            }
        }
    }
    out
}

/// Encodes a pixel buffer as an 8-bit PNG.
pub fn write_png(path: &Path, image: &PixelBuffer) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Cannot create {}", path.display()))?;
    let color_type = match image.channels() {
        Channels::Rgb => png::ColorType::Rgb,
        Channels::Rgba => png::ColorType::Rgba,
    };

    let mut encoder = png::Encoder::new(BufWriter::new(file), image.width(), image.height());
    encoder.set_color(color_type);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder
        .write_header()
        .with_context(|| format!("Cannot write {}", path.display()))?;
    writer
        .write_image_data(&image.to_packed())
        .with_context(|| format!("Cannot write {}", path.display()))?;
    writer.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widen_gray_alpha() {
        // Two rows of two pixels with one byte of row padding
        let buf = [10, 1, 20, 2, 0, 30, 3, 40, 4, 0];
        let out = widen(&buf, 5, 2, 2, 2);
        assert_eq!(
            out,
            vec![10, 10, 10, 1, 20, 20, 20, 2, 30, 30, 30, 3, 40, 40, 40, 4]
        );
    }

    #[test]
    fn png_roundtrip_rgba() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rgba.png");
        let data = (0..5 * 3 * 4).map(|i| (i * 11 % 256) as u8).collect();
        let image = PixelBuffer::from_vec(5, 3, Channels::Rgba, data).unwrap();

        write_png(&path, &image).unwrap();
        let back = read_png(&path).unwrap();
        assert_eq!(back.dimensions(), (5, 3));
        assert_eq!(back.channels(), Channels::Rgba);
        assert!(back.same_pixels(&image));
    }

    #[test]
    fn missing_file_has_context() {
        let err = read_png(Path::new("/nonexistent/blurkit.png")).unwrap_err();
        assert!(err.to_string().contains("Cannot open"));
    }
}
