use std::io::Write;

use crate::spad_pipeline::common::error::Result;
use crate::spad_pipeline::image::types::{SpadImage, StackCompression};

pub trait SpadImageWriter {
    fn write_image(
        &self,
        image: &SpadImage,
        output: &mut dyn Write,
        compression: StackCompression,
    ) -> Result<()>;
}
