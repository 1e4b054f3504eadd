//! Push notifications via ntfy.
//!
//! Publishing is a plain `POST {base}/{topic}` with the message as body and
//! the subject in the `Title` header.

use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Errors that can occur when publishing to ntfy.
#[derive(Debug, Error)]
pub enum NtfyError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server rejected the message.
    #[error("ntfy returned {status}")]
    Status { status: u16 },

    /// Topic cannot be appended to the base URL.
    #[error("invalid topic URL: {0}")]
    Url(#[from] url::ParseError),
}

/// ntfy publishing client.
#[derive(Debug, Clone)]
pub struct NtfyClient {
    client: reqwest::Client,
    base_url: Url,
}

impl NtfyClient {
    /// Create a client for the given server.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(base_url: Url) -> Result<Self, NtfyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, base_url })
    }

    /// URL a topic is published to.
    ///
    /// # Errors
    ///
    /// Returns error if the topic does not form a valid URL.
    pub fn topic_url(&self, topic: &str) -> Result<Url, NtfyError> {
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(base.join(topic)?)
    }

    /// Publish a message to a topic.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the server does not accept it.
    pub async fn publish(&self, topic: &str, title: &str, message: &str) -> Result<(), NtfyError> {
        let response = self
            .client
            .post(self.topic_url(topic)?)
            .header("Title", title)
            .body(message.to_string())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NtfyError::Status {
                status: status.as_u16(),
            });
        }

        tracing::info!("ntfy message published");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_url() {
        let client = NtfyClient::new(Url::parse("https://ntfy.sh").unwrap()).unwrap();
        assert_eq!(
            client.topic_url("my_topic").unwrap().as_str(),
            "https://ntfy.sh/my_topic"
        );

        let client = NtfyClient::new(Url::parse("https://push.example.org/ntfy").unwrap()).unwrap();
        assert_eq!(
            client.topic_url("abc").unwrap().as_str(),
            "https://push.example.org/ntfy/abc"
        );
    }
}
