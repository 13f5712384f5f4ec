//! Text / bytes / base64 transcoding for file content.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use odfs_contents_core::FileFormat;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("content is not UTF-8 encoded")]
    InvalidEncoding,

    #[error("Must specify format of file contents as 'text' or 'base64', got '{0}'")]
    InvalidFormat(String),

    #[error("invalid base64 payload: {0}")]
    Encoding(#[from] base64::DecodeError),
}

/// Decode raw file bytes for a read.
///
/// Without a requested format, valid UTF-8 comes back as text and anything
/// else falls back to base64. Requesting text for non-UTF-8 bytes fails;
/// requesting base64 always succeeds.
pub fn decode_for_read(
    bytes: Vec<u8>,
    want: Option<FileFormat>,
) -> Result<(String, FileFormat), CodecError> {
    match want {
        Some(FileFormat::Base64) => Ok((STANDARD.encode(&bytes), FileFormat::Base64)),
        Some(FileFormat::Text) => String::from_utf8(bytes)
            .map(|text| (text, FileFormat::Text))
            .map_err(|_| CodecError::InvalidEncoding),
        None => match String::from_utf8(bytes) {
            Ok(text) => Ok((text, FileFormat::Text)),
            Err(err) => Ok((STANDARD.encode(err.as_bytes()), FileFormat::Base64)),
        },
    }
}

/// Encode caller-supplied content into the bytes to store.
///
/// Whitespace inside a base64 payload (line breaks from MIME-style encoders)
/// is ignored.
pub fn encode_for_write(content: &str, format: Option<&str>) -> Result<Vec<u8>, CodecError> {
    match format {
        Some("text") => Ok(content.as_bytes().to_vec()),
        Some("base64") => {
            let compact: Vec<u8> = content
                .bytes()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            Ok(STANDARD.decode(compact)?)
        }
        other => Err(CodecError::InvalidFormat(
            other.unwrap_or("none").to_string(),
        )),
    }
}
