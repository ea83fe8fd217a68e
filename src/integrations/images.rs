//! Image tooling: background removal via remove.bg and a stubbed
//! enhancement step.

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

const REMOVE_BG_URL: &str = "https://api.remove.bg/v1.0/removebg";

#[derive(Deserialize)]
struct RemoveBgResponse {
    data: RemoveBgData,
}

#[derive(Deserialize)]
struct RemoveBgData {
    result_b64: String,
}

#[derive(Clone)]
pub struct BackgroundRemover {
    client: reqwest::Client,
    api_key: String,
}

impl BackgroundRemover {
    pub fn new(api_key: &str) -> Self {
        BackgroundRemover {
            client: super::http_client(),
            api_key: api_key.to_string(),
        }
    }

    /// Remove the background of `image`; returns PNG bytes.
    pub async fn remove_background(&self, image: &[u8]) -> Result<Vec<u8>> {
        let encoded = STANDARD.encode(image);
        let response = self
            .client
            .post(REMOVE_BG_URL)
            .header("X-Api-Key", &self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[("image_file_b64", encoded.as_str()), ("size", "auto")])
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            bail!("remove.bg returned {}: {}", status, text.trim());
        }
        let body: RemoveBgResponse = response.json().await.context("invalid remove.bg response")?;
        STANDARD
            .decode(body.data.result_b64)
            .map_err(|e| anyhow!("remove.bg returned invalid base64: {}", e))
    }
}

/// Outcome of [`enhance`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Enhanced {
    pub image_base64: String,
    pub enhanced: bool,
}

/// Enhancement has no backend yet: the image comes back unchanged.
pub fn enhance(image: &[u8]) -> Enhanced {
    Enhanced {
        image_base64: STANDARD.encode(image),
        enhanced: false,
    }
}

/// Decode a base64 image, accepting `data:<mime>;base64,` prefixes.
pub fn decode_image(input: &str) -> Result<Vec<u8>> {
    let payload = match input.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => input,
    };
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| anyhow!("image is not valid base64: {}", e))?;
    if bytes.is_empty() {
        bail!("image is empty");
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_accepts_plain_and_data_url() {
        assert_eq!(decode_image("aGVsbG8=").unwrap(), b"hello");
        assert_eq!(
            decode_image("data:image/png;base64,aGVsbG8=").unwrap(),
            b"hello"
        );
    }

    #[test]
    fn decode_rejects_garbage_and_empty() {
        assert!(decode_image("not base64!!").is_err());
        assert!(decode_image("").is_err());
    }

    #[test]
    fn enhance_is_identity() {
        let out = enhance(b"hello");
        assert_eq!(out.image_base64, "aGVsbG8=");
        assert!(!out.enhanced);
    }
}
