//! Content Pinning Client
//!
//! Uploads product metadata files to a Pinata-compatible pinning API and
//! returns the content identifier (CID) that gets registered on chain.

use std::fmt;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::PinningConfig;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PinError {
    #[error("Pinning credentials missing: set {0}")]
    MissingCredentials(String),

    #[error("Refusing to pin an empty file")]
    EmptyFile,

    #[error("Upload failed: {0}")]
    Transport(String),

    #[error("Upload rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Unexpected pinning response: {0}")]
    Decode(String),
}

/// Address of an uploaded file in content-addressed storage
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentId(String);

impl ContentId {
    pub fn new(cid: impl Into<String>) -> Option<Self> {
        let cid = cid.into().trim().to_string();
        if cid.is_empty() { None } else { Some(Self(cid)) }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait ContentPinner: Send + Sync {
    async fn pin(&self, file_name: &str, bytes: Vec<u8>) -> Result<ContentId, PinError>;
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PinResponse {
    ipfs_hash: String,
    #[serde(default)]
    pin_size: Option<u64>,
}

#[derive(Deserialize)]
struct PinErrorBody {
    error: PinErrorDetail,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PinErrorDetail {
    Detailed {
        #[serde(alias = "reason")]
        message: String,
        #[serde(default)]
        details: Option<String>,
    },
    Text(String),
}

pub struct PinataClient {
    endpoint: String,
    jwt: String,
    client: reqwest::Client,
}

impl PinataClient {
    /// JWT is read from the environment variable named in the config
    pub fn from_config(config: &PinningConfig) -> Result<Self, PinError> {
        let jwt = std::env::var(&config.jwt_env)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| PinError::MissingCredentials(config.jwt_env.clone()))?;
        Self::new(&config.endpoint, jwt, config.timeout_secs)
    }

    pub fn new(endpoint: &str, jwt: String, timeout_secs: u64) -> Result<Self, PinError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| PinError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            jwt,
            client,
        })
    }
}

#[async_trait]
impl ContentPinner for PinataClient {
    async fn pin(&self, file_name: &str, bytes: Vec<u8>) -> Result<ContentId, PinError> {
        if bytes.is_empty() {
            return Err(PinError::EmptyFile);
        }
        let size = bytes.len();
        let form = Form::new().part("file", Part::bytes(bytes).file_name(file_name.to_string()));

        debug!(file_name, size, endpoint = %self.endpoint, "Uploading file");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.jwt)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PinError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| PinError::Transport(e.to_string()))?;

        let cid = parse_pin_response(status, &body)?;
        info!(file_name, cid = %cid, "File pinned");
        Ok(cid)
    }
}

/// Interpret a pinning API answer
pub(crate) fn parse_pin_response(status: u16, body: &str) -> Result<ContentId, PinError> {
    if !(200..300).contains(&status) {
        let message = match serde_json::from_str::<PinErrorBody>(body) {
            Ok(PinErrorBody {
                error: PinErrorDetail::Detailed { message, details },
            }) => match details {
                Some(details) => format!("{}: {}", message, details),
                None => message,
            },
            Ok(PinErrorBody {
                error: PinErrorDetail::Text(text),
            }) => text,
            Err(_) if body.trim().is_empty() => "Upload failed".to_string(),
            Err(_) => body.trim().to_string(),
        };
        return Err(PinError::Rejected { status, message });
    }

    let parsed: PinResponse =
        serde_json::from_str(body).map_err(|e| PinError::Decode(e.to_string()))?;
    debug!(pin_size = ?parsed.pin_size, "Pin response");
    ContentId::new(parsed.ipfs_hash).ok_or_else(|| PinError::Decode("empty IpfsHash".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_success() {
        let body = r#"{"IpfsHash":"QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG","PinSize":1024,"Timestamp":"2026-10-18T10:00:00.000Z"}"#;
        let cid = parse_pin_response(200, body).unwrap();
        assert_eq!(cid.as_str(), "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG");
    }

    #[test]
    fn test_parse_error_shapes() {
        let detailed = r#"{"error":{"reason":"INVALID_CREDENTIALS","details":"Invalid/expired credentials"}}"#;
        assert_eq!(
            parse_pin_response(401, detailed).unwrap_err(),
            PinError::Rejected {
                status: 401,
                message: "INVALID_CREDENTIALS: Invalid/expired credentials".into()
            }
        );

        let message = r#"{"error":{"message":"File too large"}}"#;
        assert!(matches!(
            parse_pin_response(413, message),
            Err(PinError::Rejected { message, .. }) if message == "File too large"
        ));

        let text = r#"{"error":"Not authorized"}"#;
        assert!(matches!(
            parse_pin_response(403, text),
            Err(PinError::Rejected { message, .. }) if message == "Not authorized"
        ));

        assert!(matches!(
            parse_pin_response(502, ""),
            Err(PinError::Rejected { message, .. }) if message == "Upload failed"
        ));
    }

    #[test]
    fn test_parse_missing_hash() {
        assert!(matches!(
            parse_pin_response(200, r#"{"IpfsHash":""}"#),
            Err(PinError::Decode(_))
        ));
        assert!(matches!(
            parse_pin_response(200, "not json"),
            Err(PinError::Decode(_))
        ));
    }

    #[test]
    fn test_missing_credentials() {
        let config = PinningConfig {
            endpoint: "https://api.pinata.cloud/pinning/pinFileToIPFS".into(),
            jwt_env: "SUPPLY_TRACE_TEST_UNSET_PINATA_JWT".into(),
            timeout_secs: 5,
        };
        assert_eq!(
            PinataClient::from_config(&config).err(),
            Some(PinError::MissingCredentials(
                "SUPPLY_TRACE_TEST_UNSET_PINATA_JWT".into()
            ))
        );
    }

    #[tokio::test]
    async fn test_empty_file_rejected_locally() {
        let client = PinataClient::new("http://127.0.0.1:9", "jwt".into(), 1).unwrap();
        assert_eq!(client.pin("a.pdf", vec![]).await, Err(PinError::EmptyFile));
    }

    #[test]
    fn test_content_id() {
        assert!(ContentId::new("  ").is_none());
        assert_eq!(ContentId::new(" Qm1 ").unwrap().to_string(), "Qm1");
    }
}
