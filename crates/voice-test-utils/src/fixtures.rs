//! Request fixtures: audio chunks and product upload forms.

use bytes::Bytes;
use voice_service::notify::cue::tone_wav;

/// Boundary used by [`ProductForm::encode`].
pub const FORM_BOUNDARY: &str = "voice-test-utils-boundary";

/// A short distinct WAV chunk for index `n`.
pub fn audio_chunk(n: u32) -> Bytes {
    tone_wav(220.0 + f64::from(n) * 110.0, 20)
}

/// Builder for a `POST /products` multipart body.
#[derive(Debug, Clone)]
pub struct ProductForm {
    fields: Vec<(String, String)>,
    image: Option<(Vec<u8>, String)>,
}

impl Default for ProductForm {
    fn default() -> Self {
        Self::new()
            .field("name", "Trail Runner")
            .field("brand", "Stride")
            .field("category", "shoes")
            .field("price", "89.50")
            .image(b"\xff\xd8\xff\xe0test-jpeg".to_vec(), "image/jpeg")
    }
}

impl ProductForm {
    /// Empty form.
    pub fn new() -> Self {
        Self {
            fields: Vec::new(),
            image: None,
        }
    }

    /// Add or replace a text field.
    pub fn field(mut self, name: &str, value: &str) -> Self {
        self.fields.retain(|(n, _)| n != name);
        self.fields.push((name.to_string(), value.to_string()));
        self
    }

    /// Drop a text field.
    pub fn without(mut self, name: &str) -> Self {
        self.fields.retain(|(n, _)| n != name);
        if name == "image" {
            self.image = None;
        }
        self
    }

    /// Set the image part.
    pub fn image(mut self, bytes: Vec<u8>, content_type: &str) -> Self {
        self.image = Some((bytes, content_type.to_string()));
        self
    }

    /// Value for the `Content-Type` header.
    pub fn content_type() -> String {
        format!("multipart/form-data; boundary={FORM_BOUNDARY}")
    }

    /// Encoded request body.
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in &self.fields {
            body.extend_from_slice(
                format!(
                    "--{FORM_BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((bytes, content_type)) = &self.image {
            body.extend_from_slice(
                format!(
                    "--{FORM_BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"product.jpg\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{FORM_BOUNDARY}--\r\n").as_bytes());
        body
    }

    /// Send the form to `{base_url}/products`.
    pub async fn post(&self, base_url: &str) -> Result<reqwest::Response, anyhow::Error> {
        let response = reqwest::Client::new()
            .post(format!("{base_url}/products"))
            .header(reqwest::header::CONTENT_TYPE, Self::content_type())
            .body(self.encode())
            .send()
            .await?;
        Ok(response)
    }
}
