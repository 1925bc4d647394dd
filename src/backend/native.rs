use image::{imageops::FilterType, DynamicImage, ImageReader};
use png::{BitDepth, ColorType};
use std::path::Path;

use super::Backend;
use crate::codec::{self, Raster};
use crate::error::BackendError;
use crate::metadata::{Metadata, KEY_HEIGHT, KEY_WIDTH};

/// Pure-Rust backend: decodes with the `image` crate, writes PNG through the
/// text-chunk codec. Always available when compiled in.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeBackend;

impl Backend for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn decode_and_resize(
        &self,
        source: &Path,
        box_size: u32,
        metadata: &Metadata,
        out: &Path,
    ) -> Result<(), BackendError> {
        let img = open_image(source)?;

        let mut metadata = metadata.clone();
        metadata.insert(KEY_WIDTH, img.width());
        metadata.insert(KEY_HEIGHT, img.height());

        // Small sources are stored as they are
        let thumbnail = if img.width() > box_size || img.height() > box_size {
            img.resize(box_size, box_size, FilterType::Lanczos3)
        } else {
            img
        };

        codec::write(out, &Raster::from(thumbnail), &metadata)
    }

    fn write_blank(&self, metadata: &Metadata, out: &Path) -> Result<(), BackendError> {
        codec::write(out, &Raster::blank(), metadata)
    }

    fn read_metadata(&self, path: &Path) -> Result<Metadata, BackendError> {
        codec::read(path)
    }

    fn reattach_metadata(
        &self,
        image: &Path,
        metadata: &Metadata,
        out: &Path,
    ) -> Result<(), BackendError> {
        let img = open_image(image)?;
        codec::write(out, &Raster::from(img), metadata)
    }
}

/// Decode any format `image` knows, sniffing the content rather than trusting
/// the extension (scratch files are always named `*.png`)
fn open_image(path: &Path) -> Result<DynamicImage, BackendError> {
    ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|e| BackendError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Keeps the channel layout and bit depth of 8 and 16 bit images. Float
/// images have no PNG equivalent and are stored as 16 bit RGBA.
impl From<DynamicImage> for Raster {
    fn from(img: DynamicImage) -> Self {
        let (width, height) = (img.width(), img.height());
        let eight = |color, data| (color, BitDepth::Eight, data);
        let sixteen = |color, samples: Vec<u16>| (color, BitDepth::Sixteen, to_be_bytes(samples));

        let (color, depth, data) = match img {
            DynamicImage::ImageLuma8(buf) => eight(ColorType::Grayscale, buf.into_raw()),
            DynamicImage::ImageLumaA8(buf) => eight(ColorType::GrayscaleAlpha, buf.into_raw()),
            DynamicImage::ImageRgb8(buf) => eight(ColorType::Rgb, buf.into_raw()),
            DynamicImage::ImageRgba8(buf) => eight(ColorType::Rgba, buf.into_raw()),
            DynamicImage::ImageLuma16(buf) => sixteen(ColorType::Grayscale, buf.into_raw()),
            DynamicImage::ImageLumaA16(buf) => sixteen(ColorType::GrayscaleAlpha, buf.into_raw()),
            DynamicImage::ImageRgb16(buf) => sixteen(ColorType::Rgb, buf.into_raw()),
            DynamicImage::ImageRgba16(buf) => sixteen(ColorType::Rgba, buf.into_raw()),
            other => sixteen(ColorType::Rgba, other.into_rgba16().into_raw()),
        };

        Raster {
            width,
            height,
            color,
            depth,
            data,
        }
    }
}

/// PNG stores 16 bit samples big-endian
fn to_be_bytes(samples: Vec<u16>) -> Vec<u8> {
    samples.into_iter().flat_map(u16::to_be_bytes).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{KEY_MTIME, KEY_URI};
    use image::{GenericImageView, Rgb, RgbImage};

    fn write_source(dir: &Path, name: &str, width: u32, height: u32) -> std::path::PathBuf {
        let path = dir.join(name);
        RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]))
            .save(&path)
            .unwrap();
        path
    }

    fn source_metadata() -> Metadata {
        [(KEY_URI, "file:///src.jpg"), (KEY_MTIME, "1000")].into_iter().collect()
    }

    #[test]
    fn test_resize_fits_box_and_records_source_size() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_source(dir.path(), "wide.jpg", 1024, 512);
        let out = dir.path().join("thumb.png");
        std::fs::write(&out, b"").unwrap();

        NativeBackend
            .decode_and_resize(&source, 256, &source_metadata(), &out)
            .unwrap();

        let thumb = image::open(&out).unwrap();
        assert_eq!(thumb.dimensions(), (256, 128));

        let metadata = NativeBackend.read_metadata(&out).unwrap();
        assert_eq!(metadata.get(KEY_MTIME), Some("1000"));
        assert_eq!(metadata.get(KEY_WIDTH), Some("1024"));
        assert_eq!(metadata.get(KEY_HEIGHT), Some("512"));
    }

    #[test]
    fn test_small_sources_are_not_enlarged() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_source(dir.path(), "icon.png", 32, 16);
        let out = dir.path().join("thumb.png");

        NativeBackend
            .decode_and_resize(&source, 128, &source_metadata(), &out)
            .unwrap();

        assert_eq!(image::open(&out).unwrap().dimensions(), (32, 16));
    }

    #[test]
    fn test_corrupt_source_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("broken.jpg");
        std::fs::write(&source, b"\xff\xd8 not really a jpeg").unwrap();
        let out = dir.path().join("thumb.png");

        let err = NativeBackend
            .decode_and_resize(&source, 128, &source_metadata(), &out)
            .unwrap_err();
        assert!(matches!(err, BackendError::Unreadable { .. }), "{err:?}");
    }

    #[test]
    fn test_reattach_keeps_pixels_and_replaces_metadata() {
        let dir = tempfile::tempdir().unwrap();
        // A JPEG behind a .png name, like a scratch file filled by another tool
        let jpeg = write_source(dir.path(), "preview.jpg", 40, 30);
        let scratch = dir.path().join("scratch.png");
        std::fs::rename(&jpeg, &scratch).unwrap();
        let out = dir.path().join("final.png");

        let metadata: Metadata = [(KEY_URI, "http://x/y.pdf"), (KEY_MTIME, "0")]
            .into_iter()
            .collect();
        NativeBackend.reattach_metadata(&scratch, &metadata, &out).unwrap();

        assert_eq!(image::open(&out).unwrap().dimensions(), (40, 30));
        let read_back = NativeBackend.read_metadata(&out).unwrap();
        assert_eq!(read_back.get(KEY_URI), Some("http://x/y.pdf"));
        assert_eq!(read_back.get(KEY_MTIME), Some("0"));
    }

    #[test]
    fn test_reattach_keeps_sixteen_bit_depth() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join("deep.png");
        image::ImageBuffer::<image::Rgb<u16>, _>::from_fn(8, 4, |x, y| {
            image::Rgb([x as u16 * 1000 + 1, y as u16 * 3000 + 7, 65535])
        })
        .save(&scratch)
        .unwrap();
        let out = dir.path().join("final.png");

        NativeBackend.reattach_metadata(&scratch, &source_metadata(), &out).unwrap();

        let before = image::open(&scratch).unwrap();
        let after = image::open(&out).unwrap();
        assert_eq!(after.color(), image::ColorType::Rgb16);
        assert_eq!(after.as_bytes(), before.as_bytes());
    }

    #[test]
    fn test_blank_marker() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("fail.png");

        NativeBackend.write_blank(&source_metadata(), &out).unwrap();

        assert_eq!(image::open(&out).unwrap().dimensions(), (1, 1));
        assert_eq!(
            NativeBackend.read_metadata(&out).unwrap().get(KEY_URI),
            Some("file:///src.jpg")
        );
    }
}
