//! Buyer registration-type lookup.
//!
//! FBR answers `{"REGISTRATION_TYPE": "Registered" | "unregistered" | ...}`
//! for a posted `{"Registration_No": "<ntn>"}`.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use iris_core::{RegistrationType, ValidationError};

use crate::config::IrisConfig;
use crate::error::{IrisError, IrisResult};
use crate::http::IrisTransport;

/// Checks whether a tax id is registered with FBR.
#[derive(Clone)]
pub struct RegistrationClient {
    transport: Arc<dyn IrisTransport>,
    url: String,
    token: String,
    timeout: Duration,
}

impl RegistrationClient {
    pub fn new(transport: Arc<dyn IrisTransport>, url: impl Into<String>, token: impl Into<String>) -> Self {
        RegistrationClient {
            transport,
            url: url.into(),
            token: token.into(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn from_config(transport: Arc<dyn IrisTransport>, config: &IrisConfig) -> Self {
        RegistrationClient::new(transport, &config.api.registration_url, &config.company.bearer_token)
            .timeout(config.lookup_timeout())
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Looks up `tax_id`. `Ok(None)` means FBR answered with a type we
    /// don't recognize.
    pub async fn check(&self, tax_id: &str) -> IrisResult<Option<RegistrationType>> {
        let tax_id = tax_id.trim();
        if tax_id.is_empty() {
            return Err(ValidationError::Required {
                field: "buyerNTNCNIC".to_string(),
            }
            .into());
        }

        let masked = mask_tax_id(tax_id);
        info!(tax_id = %masked, "Checking FBR registration type");

        let body = json!({ "Registration_No": tax_id });
        let reply = self.transport.post_json(&self.url, &self.token, &body, self.timeout).await?;

        if !reply.is_ok() {
            return Err(IrisError::ReferenceFetch {
                endpoint: self.url.clone(),
                message: format!("HTTP {}: {}", reply.status, reply.body),
            });
        }

        let raw = reply
            .json()
            .as_ref()
            .and_then(|json| json.get("REGISTRATION_TYPE"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_default();

        let kind = RegistrationType::from_authority(&raw);
        match kind {
            Some(kind) => info!(tax_id = %masked, registration_type = %kind, "Registration type resolved"),
            None => warn!(tax_id = %masked, value = %raw, "Unrecognized registration type"),
        }
        Ok(kind)
    }
}

/// Log form of a tax id: only the last three characters survive.
fn mask_tax_id(tax_id: &str) -> String {
    let chars: Vec<char> = tax_id.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 3..].iter().collect();
    format!("****{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::http::HttpReply;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedTransport {
        reply: HttpReply,
        last_body: Mutex<Option<Value>>,
    }

    #[async_trait]
    impl IrisTransport for FixedTransport {
        async fn post_json(
            &self,
            _url: &str,
            _token: &str,
            body: &Value,
            _timeout: Duration,
        ) -> Result<HttpReply, TransportError> {
            *self.last_body.lock().unwrap() = Some(body.clone());
            Ok(self.reply.clone())
        }

        async fn get_json(&self, _url: &str, _token: &str, _timeout: Duration) -> Result<HttpReply, TransportError> {
            Ok(self.reply.clone())
        }
    }

    fn make_client(status: u16, body: &str) -> (RegistrationClient, Arc<FixedTransport>) {
        let transport = Arc::new(FixedTransport {
            reply: HttpReply::new(status, body),
            last_body: Mutex::new(None),
        });
        (RegistrationClient::new(transport.clone(), "https://iris.test/reg", "t"), transport)
    }

    #[tokio::test]
    async fn test_registered_case_insensitive() {
        let (client, transport) = make_client(200, r#"{"REGISTRATION_TYPE":"REGISTERED"}"#);
        assert_eq!(client.check(" 1234567 ").await.unwrap(), Some(RegistrationType::Registered));

        let sent = transport.last_body.lock().unwrap().clone().unwrap();
        assert_eq!(sent["Registration_No"], "1234567");
    }

    #[tokio::test]
    async fn test_unregistered_and_unknown() {
        let (client, _) = make_client(200, r#"{"REGISTRATION_TYPE":"unregistered"}"#);
        assert_eq!(client.check("1").await.unwrap(), Some(RegistrationType::Unregistered));

        let (client, _) = make_client(200, r#"{"statuscode":"01"}"#);
        assert_eq!(client.check("1").await.unwrap(), None);
    }

    #[test]
    fn test_mask_tax_id() {
        assert_eq!(mask_tax_id("3520212345671"), "****671");
        assert_eq!(mask_tax_id("1234567"), "****567");
        assert_eq!(mask_tax_id("1234"), "****");
        assert_eq!(mask_tax_id(""), "****");
        assert!(!mask_tax_id("1234567").contains("1234"));
    }

    #[tokio::test]
    async fn test_errors() {
        let (client, _) = make_client(200, "{}");
        assert!(matches!(client.check("  ").await, Err(IrisError::Validation(_))));

        let (client, _) = make_client(401, "Unauthorized");
        assert!(matches!(client.check("1").await, Err(IrisError::ReferenceFetch { .. })));
    }
}
