pub mod logger;
pub mod spad_pipeline;
