//! Pairing code rendering.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use pairlink_core::traits::{PairingRenderer, RenderError};
use qrcode::{QrCode, render::svg};

/// Renders pairing payloads as QR codes in an SVG data URL.
#[derive(Debug, Clone, Copy)]
pub struct QrSvgRenderer {
    min_size: u32,
}

impl QrSvgRenderer {
    /// Create a renderer producing images at least `min_size` pixels wide.
    #[must_use]
    pub const fn new(min_size: u32) -> Self {
        Self { min_size }
    }
}

impl Default for QrSvgRenderer {
    fn default() -> Self {
        Self::new(256)
    }
}

impl PairingRenderer for QrSvgRenderer {
    fn render(&self, payload: &str) -> Result<String, RenderError> {
        if payload.is_empty() {
            return Err(RenderError("empty pairing payload".to_string()));
        }
        let code = QrCode::new(payload.as_bytes()).map_err(|e| RenderError(e.to_string()))?;
        let image = code
            .render::<svg::Color<'_>>()
            .min_dimensions(self.min_size, self.min_size)
            .build();
        Ok(format!("data:image/svg+xml;base64,{}", BASE64.encode(image)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renders_data_url() {
        let url = QrSvgRenderer::default().render("2@abcdef,xyz,123").unwrap();
        let encoded = url.strip_prefix("data:image/svg+xml;base64,").unwrap();
        let svg = String::from_utf8(BASE64.decode(encoded).unwrap()).unwrap();
        assert!(svg.contains("<svg"));
    }

    #[test]
    fn test_empty_payload_fails() {
        assert!(QrSvgRenderer::default().render("").is_err());
    }

    #[test]
    fn test_oversized_payload_fails() {
        let payload = "x".repeat(8000);
        assert!(QrSvgRenderer::default().render(&payload).is_err());
    }
}
