//! MJPEG streaming to HTTP clients

pub mod handler;
pub mod multipart;

pub use handler::StreamHandler;
pub use multipart::{content_type, encode_part, part_chunks, BOUNDARY};
