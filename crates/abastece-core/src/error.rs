//! Error types for the abastece-core library.

use thiserror::Error;

/// Main error type for the abastece library.
#[derive(Error, Debug)]
pub enum AbasteceError {
    /// PDF processing error.
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// OCR processing error.
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    /// Vision model error.
    #[error("vision model error: {0}")]
    Vision(#[from] VisionError),

    /// Receipt extraction error.
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Image processing error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors related to PDF processing.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to extract images from PDF.
    #[error("failed to extract images: {0}")]
    ImageExtraction(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// Invalid page number requested.
    #[error("invalid page number: {0}")]
    InvalidPage(u32),
}

/// Errors related to OCR processing.
#[derive(Error, Debug)]
pub enum OcrError {
    /// The OCR engine binary could not be started.
    #[error("failed to run OCR engine '{path}': {reason}")]
    EngineUnavailable { path: String, reason: String },

    /// The engine ran but reported a failure.
    #[error("OCR engine failed for language '{language}': {reason}")]
    Recognition { language: String, reason: String },

    /// Image preprocessing failed.
    #[error("preprocessing failed: {0}")]
    Preprocessing(String),

    /// Invalid image format or dimensions.
    #[error("invalid image: {0}")]
    InvalidImage(String),
}

/// Errors raised by the vision model path.
#[derive(Error, Debug)]
pub enum VisionError {
    /// The credential environment variable is not set.
    #[error("API key not found: set the {0} environment variable")]
    MissingApiKey(String),

    /// Transport-level failure (connection, timeout).
    #[error("request failed: {0}")]
    Request(String),

    /// Non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The response carried no assistant message.
    #[error("response has no choices")]
    NoChoices,

    /// No JSON object could be located in the response text.
    #[error("no JSON object found in response")]
    NoJson,

    /// A JSON object was found but did not parse.
    #[error("malformed JSON in response: {0}")]
    MalformedJson(String),

    /// Image could not be encoded for the request.
    #[error("failed to encode image: {0}")]
    Encoding(String),

    /// The model chain is empty.
    #[error("no vision models configured")]
    NoModels,

    /// Every model in the chain failed.
    #[error("all {} vision models failed", .0.len())]
    AllModelsFailed(Vec<ModelAttempt>),
}

/// One failed attempt within a model chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelAttempt {
    /// Model identifier that was tried.
    pub model: String,
    /// Why it failed.
    pub reason: String,
}

/// Errors related to receipt field extraction.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// A configured pattern does not compile.
    #[error("invalid pattern for {field}: {reason}")]
    Pattern { field: String, reason: String },

    /// Input format not supported.
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
}

/// Result type for the abastece library.
pub type Result<T> = std::result::Result<T, AbasteceError>;
