//! Screenshot capture methods.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::PageCommand;

use super::Page;

// ============================================================================
// Types
// ============================================================================

/// Image format for screenshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    /// PNG (lossless).
    #[default]
    Png,
    /// JPEG with quality (0-100).
    Jpeg(u8),
    /// WebP with quality (0-100).
    Webp(u8),
}

impl ImageFormat {
    /// Returns the MIME type for this format.
    #[must_use]
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg(_) => "image/jpeg",
            Self::Webp(_) => "image/webp",
        }
    }

    /// Returns the file extension for this format.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg(_) => "jpg",
            Self::Webp(_) => "webp",
        }
    }

    fn format_str(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg(_) => "jpeg",
            Self::Webp(_) => "webp",
        }
    }

    fn quality(&self) -> Option<u8> {
        match self {
            Self::Png => None,
            Self::Jpeg(q) | Self::Webp(q) => Some(*q),
        }
    }
}

// ============================================================================
// ScreenshotBuilder
// ============================================================================

/// Builder for configuring and capturing screenshots.
///
/// Captures go through the page's task queue, so concurrent captures run
/// one after another.
///
/// # Example
///
/// ```ignore
/// let png = page.screenshot().png().capture_bytes().await?;
/// page.screenshot().jpeg(80).save("page.jpg").await?;
/// ```
pub struct ScreenshotBuilder<'a> {
    page: &'a Page,
    format: ImageFormat,
}

impl<'a> ScreenshotBuilder<'a> {
    pub(crate) fn new(page: &'a Page) -> Self {
        Self {
            page,
            format: ImageFormat::Png,
        }
    }

    /// Sets PNG format (default).
    #[must_use]
    pub fn png(mut self) -> Self {
        self.format = ImageFormat::Png;
        self
    }

    /// Sets JPEG format with quality (0-100).
    #[must_use]
    pub fn jpeg(mut self, quality: u8) -> Self {
        self.format = ImageFormat::Jpeg(quality.min(100));
        self
    }

    /// Sets the image format.
    #[must_use]
    pub fn format(mut self, format: ImageFormat) -> Self {
        self.format = format;
        self
    }

    /// Captures the screenshot and returns base64-encoded data.
    ///
    /// # Errors
    ///
    /// Returns the command error, or [`Error::MalformedFrame`] if the reply
    /// carries no image data.
    pub async fn capture(&self) -> Result<String> {
        debug!(session = ?self.page.session().id(), format = ?self.format, "Capturing screenshot");

        let command = PageCommand::CaptureScreenshot {
            format: self.format.format_str().to_string(),
            quality: self.format.quality(),
            from_surface: true,
        };
        let session = self.page.session();
        let reply = self
            .page
            .task_queue()
            .post(session.send_command(command))
            .await?;

        reply
            .get("data")
            .and_then(|data| data.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::malformed(format!("screenshot reply without data: {reply}")))
    }

    /// Captures the screenshot and returns raw bytes.
    ///
    /// # Errors
    ///
    /// Same as [`capture`](Self::capture), or [`Error::MalformedFrame`] for
    /// undecodable data.
    pub async fn capture_bytes(&self) -> Result<Vec<u8>> {
        let data = self.capture().await?;
        BASE64
            .decode(&data)
            .map_err(|e| Error::malformed(format!("screenshot data is not base64: {e}")))
    }

    /// Captures the screenshot and writes it to `path`.
    ///
    /// The format comes from the builder, not the file extension.
    ///
    /// # Errors
    ///
    /// Same as [`capture_bytes`](Self::capture_bytes), or [`Error::Io`].
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = self.capture_bytes().await?;
        tokio::fs::write(path.as_ref(), bytes).await?;
        Ok(())
    }
}

// ============================================================================
// Page - Screenshot
// ============================================================================

impl Page {
    /// Creates a screenshot builder.
    #[must_use]
    pub fn screenshot(&self) -> ScreenshotBuilder<'_> {
        ScreenshotBuilder::new(self)
    }

    /// Captures a PNG screenshot and returns its bytes.
    ///
    /// # Errors
    ///
    /// Same as [`ScreenshotBuilder::capture_bytes`].
    pub async fn capture_screenshot(&self) -> Result<Vec<u8>> {
        self.screenshot().png().capture_bytes().await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::transport::channel::command_id;
    use crate::transport::channel::testing::expect_command;

    use super::super::core::testing::page;

    #[tokio::test]
    async fn test_captures_are_serialized() {
        let (_connection, page, mut remote) = page().await;

        let first = tokio::spawn({
            let page = page.clone();
            async move { page.capture_screenshot().await }
        });
        let second = tokio::spawn({
            let page = page.clone();
            async move { page.screenshot().jpeg(150).capture().await }
        });

        let command = expect_command(&mut remote, "Page.captureScreenshot").await;
        assert_eq!(command["params"]["format"], "png");
        assert_eq!(page.task_queue().pending(), 2);

        // The second capture is not sent before the first one is answered.
        tokio::task::yield_now().await;
        assert!(remote.try_recv_command().is_none());

        remote
            .reply(command_id(&command).expect("id"), json!({ "data": "iVBORw==" }))
            .expect("reply");
        assert_eq!(
            first.await.expect("join").expect("png"),
            vec![0x89, b'P', b'N', b'G']
        );

        let command = expect_command(&mut remote, "Page.captureScreenshot").await;
        assert_eq!(command["params"]["format"], "jpeg");
        assert_eq!(command["params"]["quality"], 100);
        remote
            .reply(command_id(&command).expect("id"), json!({ "data": "AAAA" }))
            .expect("reply");
        assert_eq!(second.await.expect("join").expect("jpeg"), "AAAA");
    }

    #[tokio::test]
    async fn test_missing_data_is_malformed() {
        let (_connection, page, mut remote) = page().await;
        let capture = tokio::spawn({
            let page = page.clone();
            async move { page.capture_screenshot().await }
        });

        let command = expect_command(&mut remote, "Page.captureScreenshot").await;
        remote
            .reply(command_id(&command).expect("id"), json!({}))
            .expect("reply");

        let err = capture.await.expect("join").unwrap_err();
        assert!(matches!(err, Error::MalformedFrame { .. }));
    }

    #[test]
    fn test_format_metadata() {
        assert_eq!(ImageFormat::Webp(50).mime_type(), "image/webp");
        assert_eq!(ImageFormat::Jpeg(80).extension(), "jpg");
        assert_eq!(ImageFormat::default().quality(), None);
    }
}
