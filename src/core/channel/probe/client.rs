//! Image Loader Implementations
//!
//! The probe only needs to know whether a tiny image could be fetched. The
//! loader does not enforce a timeout itself; the probe wraps every attempt in
//! its own hard timeout.

use url::Url;

#[cfg(feature = "network")]
use isahc::{AsyncReadResponseExt, HttpClient, Request};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageLoadError {
    #[error("image request failed: {0}")]
    Network(String),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("response is not an image (content-type: {0})")]
    NotAnImage(String),
}

/// Image-load prober for dependency injection and testing
#[async_trait::async_trait]
pub trait ImageLoader: Send + Sync {
    /// Load the image at `url`
    ///
    /// # Returns
    /// * `Ok(())` - The resource loaded as an image
    /// * `Err(ImageLoadError)` - Network error, bad status or non-image response
    async fn load_image(&self, url: &Url) -> Result<(), ImageLoadError>;
}

/// Production image loader using isahc
#[cfg(feature = "network")]
pub struct IsahcImageLoader {
    client: HttpClient,
}

#[cfg(feature = "network")]
impl IsahcImageLoader {
    pub fn new() -> Result<Self, isahc::Error> {
        Ok(Self {
            client: HttpClient::new()?,
        })
    }
}

#[cfg(feature = "network")]
#[async_trait::async_trait]
impl ImageLoader for IsahcImageLoader {
    async fn load_image(&self, url: &Url) -> Result<(), ImageLoadError> {
        let request = Request::get(url.as_str())
            .header("Accept", "image/*")
            .body(())
            .map_err(|e| ImageLoadError::Network(format!("Image request creation failed: {}", e)))?;

        let mut response = self
            .client
            .send_async(request)
            .await
            .map_err(|e| ImageLoadError::Network(e.to_string()))?;

        let status_code = response.status().as_u16();
        if !(200..300).contains(&status_code) {
            return Err(ImageLoadError::Status(status_code));
        }

        // A missing content-type is accepted; an explicit non-image one is not
        if let Some(content_type) = response
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok())
        {
            if !content_type.to_ascii_lowercase().starts_with("image/") {
                return Err(ImageLoadError::NotAnImage(content_type.to_string()));
            }
        }

        // Drain the body so the load is complete, not just the headers
        response
            .consume()
            .await
            .map_err(|e| ImageLoadError::Network(format!("Failed to read image body: {}", e)))?;

        Ok(())
    }
}
