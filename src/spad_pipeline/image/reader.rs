use crate::spad_pipeline::common::error::Result;
use crate::spad_pipeline::image::types::SpadImage;

pub trait SpadImageReader {
    fn read_image(&self, data: &[u8]) -> Result<SpadImage>;
}
