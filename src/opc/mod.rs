/// Open Packaging Convention container support.
///
/// A `.docx` file is a zip archive of named parts. This module provides the
/// in-memory container the replacement engine reads parts from and writes
/// parts back into, plus media-part registration for embedded images.
pub mod constants;
pub mod error;
pub mod package;

pub use error::{OpcError, Result};
pub use package::Package;
