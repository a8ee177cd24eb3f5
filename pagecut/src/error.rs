use thiserror::Error;

/// Main capture error type
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Failed to load document: {message}")]
    DocumentLoad { message: String },

    #[error("{0}")]
    Render(#[from] RenderError),

    #[error("Invalid geometry: {message}")]
    InvalidGeometry { message: String },

    #[error(
        "Paragraph width {paragraph_width}px does not match question width {question_width}px"
    )]
    DimensionMismatch {
        paragraph_width: u32,
        question_width: u32,
    },

    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("No page has been rendered yet")]
    NoPageRendered,

    #[error("No document is loaded")]
    NoDocument,

    #[error("Background task failed: {message}")]
    Task { message: String },

    #[error("Image encoding failed")]
    Encode(#[source] image::ImageError),

    #[error("Archive packaging failed")]
    Archive(#[source] zip::result::ZipError),

    #[error("Database error")]
    Database(#[from] DatabaseError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid capture script: {message}")]
    Script { message: String },

    #[error("IO error")]
    Io(#[from] std::io::Error),
}

/// Page rendering errors
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Render cancelled")]
    Cancelled,

    #[error("Page {page} is out of range (document has {page_count} pages)")]
    PageOutOfRange { page: u32, page_count: u32 },

    #[error("Failed to render page {page}: {message}")]
    Backend { page: u32, message: String },
}

/// Database errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed")]
    Connection(#[source] rusqlite::Error),

    #[error("Query failed")]
    Query(#[source] rusqlite::Error),

    #[error("Database lock poisoned")]
    Poisoned,
}

impl CaptureError {
    pub fn invalid_geometry(message: impl Into<String>) -> Self {
        CaptureError::InvalidGeometry {
            message: message.into(),
        }
    }

    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        CaptureError::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Stable machine-readable code for the error
    pub fn error_code(&self) -> &'static str {
        match self {
            CaptureError::DocumentLoad { .. } => "document_load_error",
            CaptureError::Render(RenderError::Cancelled) => "render_cancelled",
            CaptureError::Render(RenderError::PageOutOfRange { .. }) => "page_out_of_range",
            CaptureError::Render(RenderError::Backend { .. }) => "render_error",
            CaptureError::InvalidGeometry { .. } => "invalid_geometry",
            CaptureError::DimensionMismatch { .. } => "dimension_mismatch",
            CaptureError::InvalidConfiguration { .. } => "invalid_configuration",
            CaptureError::NoPageRendered => "no_page_rendered",
            CaptureError::NoDocument => "no_document",
            CaptureError::Task { .. } => "task_error",
            CaptureError::Encode(_) => "encode_error",
            CaptureError::Archive(_) => "archive_error",
            CaptureError::Database(_) => "database_error",
            CaptureError::Config { .. } => "config_error",
            CaptureError::Script { .. } => "script_error",
            CaptureError::Io(_) => "io_error",
        }
    }

    /// Whether the user can retry with a new action without losing capture state.
    ///
    /// Document load failures are fatal to the current document; everything that
    /// happens at capture time leaves pending points and the case context intact.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CaptureError::InvalidGeometry { .. }
                | CaptureError::DimensionMismatch { .. }
                | CaptureError::InvalidConfiguration { .. }
                | CaptureError::NoPageRendered
                | CaptureError::NoDocument
                | CaptureError::Render(_)
        )
    }

    /// Cancelled renders are swallowed instead of surfaced.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, CaptureError::Render(RenderError::Cancelled))
    }
}

/// Result type alias for capture operations
pub type CaptureResult<T> = Result<T, CaptureError>;
