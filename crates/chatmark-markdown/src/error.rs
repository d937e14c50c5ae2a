use thiserror::Error;

/// Why an image destination could not be turned into something displayable.
///
/// Never surfaced to callers as an `Err`: the block renderer converts it into
/// [`crate::visual::VisualBlock::ImageError`].
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("image has no source")]
    EmptySource,
    #[error("invalid image url `{src}`: {source}")]
    InvalidUrl {
        src: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported image scheme `{0}`")]
    UnsupportedScheme(String),
}
