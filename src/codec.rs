//! PNG text-chunk metadata codec
//!
//! Thumbnails are PNG files; their [`Metadata`] lives in text chunks. Values
//! that fit Latin-1 go into `tEXt` chunks (what other implementations read),
//! anything else into UTF-8 `iTXt` chunks.

use png::{BitDepth, ColorType, Transformations};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::error::BackendError;
use crate::metadata::Metadata;

/// Decoded pixels ready to be written as PNG
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    pub width: u32,
    pub height: u32,
    pub color: ColorType,
    pub depth: BitDepth,
    pub data: Vec<u8>,
}

impl Raster {
    /// The 1x1 transparent image used for fail markers
    pub fn blank() -> Self {
        Self {
            width: 1,
            height: 1,
            color: ColorType::Rgba,
            depth: BitDepth::Eight,
            data: vec![0; 4],
        }
    }
}

/// Encode `raster` to `out` with every metadata entry as a text chunk
pub fn write(out: &Path, raster: &Raster, metadata: &Metadata) -> Result<(), BackendError> {
    let file = File::create(out)?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), raster.width, raster.height);
    encoder.set_color(raster.color);
    encoder.set_depth(raster.depth);

    for (key, value) in metadata.iter() {
        if is_latin1(key) && is_latin1(value) {
            encoder.add_text_chunk(key.to_owned(), value.to_owned())?;
        } else {
            encoder.add_itxt_chunk(key.to_owned(), value.to_owned())?;
        }
    }

    let mut writer = encoder.write_header()?;
    writer.write_image_data(&raster.data)?;
    writer.finish()?;
    Ok(())
}

/// Read all text chunks of a PNG, including those after the image data
pub fn read(path: &Path) -> Result<Metadata, BackendError> {
    let file = File::open(path)?;
    let mut decoder = png::Decoder::new(BufReader::new(file));
    decoder.set_transformations(Transformations::EXPAND);

    let mut reader = decoder.read_info()?;
    let mut pixels = vec![0; reader.output_buffer_size()];
    reader.next_frame(&mut pixels)?;
    reader.finish()?;

    let info = reader.info();
    let mut metadata = Metadata::new();
    for chunk in &info.uncompressed_latin1_text {
        metadata.insert(chunk.keyword.clone(), &chunk.text);
    }
    for chunk in &info.compressed_latin1_text {
        metadata.insert(chunk.keyword.clone(), chunk.get_text()?);
    }
    for chunk in &info.utf8_text {
        metadata.insert(chunk.keyword.clone(), chunk.get_text()?);
    }

    Ok(metadata)
}

fn is_latin1(text: &str) -> bool {
    text.chars().all(|c| u32::from(c) <= 0xFF)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{KEY_MTIME, KEY_URI};

    #[test]
    fn test_text_chunks_survive_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.png");
        let metadata: Metadata = [
            (KEY_URI, "http://example.com/\u{65e5}\u{672c}.pdf"),
            (KEY_MTIME, "1000"),
            ("Software", "thumbcache"),
        ]
        .into_iter()
        .collect();

        write(&path, &Raster::blank(), &metadata).unwrap();
        let read_back = read(&path).unwrap();

        assert_eq!(read_back.get(KEY_URI), metadata.get(KEY_URI));
        assert_eq!(read_back.get(KEY_MTIME), Some("1000"));
        assert_eq!(read_back.get("Software"), Some("thumbcache"));
    }

    #[test]
    fn test_reading_a_non_png_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not.png");
        std::fs::write(&path, b"definitely not a png").unwrap();

        assert!(matches!(read(&path), Err(BackendError::PngDecoding(_))));
    }

    #[test]
    fn test_latin1_detection() {
        assert!(is_latin1("file:///tmp/caf\u{e9}.jpg"));
        assert!(!is_latin1("\u{65e5}"));
    }
}
