use base64::Engine as _;
use ring::hmac;
use std::time::{SystemTime, UNIX_EPOCH};

/// HMAC-SHA256 request signing for the admin API.
pub struct RelaySigner {
    api_key: String,
    key: hmac::Key,
}

impl RelaySigner {
    pub fn new(api_key: String, secret: &str) -> Self {
        Self {
            api_key,
            key: hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes()),
        }
    }

    pub fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    /// Signature over `timestamp + METHOD + path + body`, base64-encoded.
    pub fn sign_at(&self, timestamp: &str, method: &str, path: &str, body: &str) -> String {
        // Query params are not part of the signed path
        let path_clean = path.split('?').next().unwrap_or(path);
        let message = format!("{}{}{}{}", timestamp, method, path_clean, body);
        let tag = hmac::sign(&self.key, message.as_bytes());
        base64::engine::general_purpose::STANDARD.encode(tag.as_ref())
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Build auth headers for a request.
    pub fn headers(&self, method: &str, path: &str, body: &str) -> Vec<(String, String)> {
        let timestamp = Self::timestamp_ms().to_string();
        let signature = self.sign_at(&timestamp, method, path, body);
        vec![
            ("X-RELAY-KEY".to_string(), self.api_key.clone()),
            ("X-RELAY-TIMESTAMP".to_string(), timestamp),
            ("X-RELAY-SIGNATURE".to_string(), signature),
        ]
    }
}
