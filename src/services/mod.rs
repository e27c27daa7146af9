//! Services kept apart from request handling: decoding uploads, validating
//! them and encoding results.

pub mod format;
pub mod io;
pub mod upload;

pub use format::{OutputFormatHandler, DEFAULT_JPEG_QUALITY};
pub use io::ImageIOService;
pub use upload::UploadValidator;
