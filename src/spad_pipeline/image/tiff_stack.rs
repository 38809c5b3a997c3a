//! Multi-page TIFF container for time-resolved SPAD images.
//!
//! Each image row is stored as one 16-bit grayscale page whose width is the number
//! of time bins and whose height is the image width. Concatenating the page buffers
//! therefore reproduces the in-memory order (time bin, column, row) without any
//! reshuffling. The physical scale lives in the first page's ImageDescription.

use std::io::{Cursor, Write};

use tiff::ColorType;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{Compression, TiffEncoder, colortype, compression::DeflateLevel};
use tiff::tags::Tag;
use tracing::debug;

use crate::spad_pipeline::common::error::{Result, SpadError};
use crate::spad_pipeline::common::layout::ImageLayout;
use crate::spad_pipeline::image::reader::SpadImageReader;
use crate::spad_pipeline::image::types::{ImageMetadata, SpadImage, StackCompression};
use crate::spad_pipeline::image::writer::SpadImageWriter;

const DESCRIPTION_PREFIX: &str = "spad-stack";

pub struct TiffStackReader;

pub struct TiffStackWriter;

fn describe(metadata: &ImageMetadata) -> String {
    format!(
        "{} ns_per_bin={} microns_per_pixel={}",
        DESCRIPTION_PREFIX, metadata.ns_per_bin, metadata.microns_per_pixel
    )
}

fn parse_description(description: &str) -> ImageMetadata {
    let mut metadata = ImageMetadata::default();
    for field in description.split_whitespace() {
        let Some((key, value)) = field.split_once('=') else {
            continue;
        };
        let Ok(value) = value.parse::<f64>() else {
            continue;
        };
        match key {
            "ns_per_bin" => metadata.ns_per_bin = value,
            "microns_per_pixel" => metadata.microns_per_pixel = value,
            _ => {}
        }
    }
    metadata
}

fn decode_err(e: tiff::TiffError) -> SpadError {
    SpadError::DecodeError(e.to_string())
}

fn encode_err(e: tiff::TiffError) -> SpadError {
    SpadError::EncodeError(e.to_string())
}

impl SpadImageReader for TiffStackReader {
    fn read_image(&self, data: &[u8]) -> Result<SpadImage> {
        debug!("Decoding TIFF stack, {} bytes", data.len());

        let mut decoder = Decoder::new(Cursor::new(data)).map_err(decode_err)?;

        let metadata = match decoder.find_tag(Tag::ImageDescription).map_err(decode_err)? {
            Some(value) => parse_description(&value.into_string().map_err(decode_err)?),
            None => ImageMetadata::default(),
        };

        let (timebins, width) = decoder.dimensions().map_err(decode_err)?;
        let mut counts: Vec<u16> = Vec::new();
        let mut height = 0usize;

        loop {
            let colortype = decoder.colortype().map_err(decode_err)?;
            if colortype != ColorType::Gray(16) {
                return Err(SpadError::UnsupportedFormat(format!(
                    "page {} is {:?}, expected 16-bit gray",
                    height, colortype
                )));
            }

            let dims = decoder.dimensions().map_err(decode_err)?;
            if dims != (timebins, width) {
                return Err(SpadError::UnsupportedFormat(format!(
                    "page {} is {}x{}, first page is {}x{}",
                    height, dims.0, dims.1, timebins, width
                )));
            }

            match decoder.read_image().map_err(decode_err)? {
                DecodingResult::U16(page) => counts.extend_from_slice(&page),
                _ => {
                    return Err(SpadError::UnsupportedFormat(format!(
                        "page {} did not decode to u16 samples",
                        height
                    )));
                }
            }
            height += 1;

            if !decoder.more_images() {
                break;
            }
            decoder.next_image().map_err(decode_err)?;
        }

        let layout = ImageLayout::new(width as usize, height, timebins as usize)?;
        debug!("Decoded stack: {}", layout);

        SpadImage::new(layout, counts, metadata)
    }
}

impl SpadImageWriter for TiffStackWriter {
    fn write_image(
        &self,
        image: &SpadImage,
        output: &mut dyn Write,
        compression: StackCompression,
    ) -> Result<()> {
        let layout = image.layout();
        debug!("Encoding TIFF stack: {}", layout);

        let compression = match compression {
            StackCompression::None => Compression::Uncompressed,
            StackCompression::Lzw => Compression::Lzw,
            StackCompression::DeflateFast => Compression::Deflate(DeflateLevel::Fast),
            StackCompression::DeflateBalanced => Compression::Deflate(DeflateLevel::Balanced),
            StackCompression::DeflateBest => Compression::Deflate(DeflateLevel::Best),
        };

        let mut buffer = Vec::new();

        {
            let mut encoder = TiffEncoder::new(Cursor::new(&mut buffer))
                .map_err(encode_err)?
                .with_compression(compression);

            let description = describe(&image.metadata);
            for (row, counts) in image.data().chunks_exact(layout.row_len()).enumerate() {
                let mut page = encoder
                    .new_image::<colortype::Gray16>(layout.timebins as u32, layout.width as u32)
                    .map_err(encode_err)?;
                if row == 0 {
                    page.encoder()
                        .write_tag(Tag::ImageDescription, description.as_str())
                        .map_err(encode_err)?;
                }
                page.write_data(counts).map_err(encode_err)?;
            }
        }

        output.write_all(&buffer)?;

        debug!("TIFF stack encoding complete");
        Ok(())
    }
}
