/// Error types for template operations.
use thiserror::Error;

/// Result type for template operations.
pub type Result<T> = std::result::Result<T, TemplateError>;

/// Error types for template operations.
#[derive(Error, Debug)]
pub enum TemplateError {
    /// OPC package error
    #[error("OPC error: {0}")]
    Opc(#[from] crate::opc::error::OpcError),

    /// XML parsing error
    #[error("XML error: {0}")]
    Xml(String),

    /// Part not found
    #[error("Part not found: {0}")]
    PartNotFound(String),

    /// The part parsed but lacks the required container element
    #[error("Missing body element in part: {0}")]
    MissingBody(String),

    /// Placeholder pattern could not be compiled
    #[error("Invalid placeholder pattern: {0}")]
    Pattern(String),

    /// Image encoding error
    #[error("Image error: {0}")]
    Image(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<quick_xml::Error> for TemplateError {
    fn from(err: quick_xml::Error) -> Self {
        TemplateError::Xml(err.to_string())
    }
}

impl From<image::ImageError> for TemplateError {
    fn from(err: image::ImageError) -> Self {
        TemplateError::Image(err.to_string())
    }
}
