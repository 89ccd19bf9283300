//! Synthetic file injected into the style image input

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::E2eResult;
use crate::protocol::FilePayload;

/// 1x1 RGBA PNG.
const TINY_PNG_BASE64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==";

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// The "user-selected" file for the upload step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticUpload {
    name: String,
    mime_type: String,
    bytes: Vec<u8>,
}

impl SyntheticUpload {
    pub fn style_png() -> E2eResult<Self> {
        Ok(Self {
            name: "style.png".to_string(),
            mime_type: "image/png".to_string(),
            bytes: STANDARD.decode(TINY_PNG_BASE64)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_png(&self) -> bool {
        self.bytes.starts_with(&PNG_SIGNATURE)
    }

    pub fn to_payload(&self) -> FilePayload {
        FilePayload {
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            data: STANDARD.encode(&self.bytes),
        }
    }
}
