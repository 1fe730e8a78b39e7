//! Twilio WhatsApp channel.
//!
//! Replies go out through the Twilio REST Messages API as a form POST
//! with basic auth. Inbound messages and delivery callbacks arrive at the
//! gateway; this module also verifies their `X-Twilio-Signature`.

use async_trait::async_trait;
use authorchat_config::TwilioConfig;
use authorchat_core::channel::{Channel, OutboundMessage};
use authorchat_core::error::ChannelError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha1::Sha1;
use tracing::{debug, warn};

const DEFAULT_API_URL: &str = "https://api.twilio.com/2010-04-01";
const WHATSAPP_PREFIX: &str = "whatsapp:";

type HmacSha1 = Hmac<Sha1>;

/// Sends WhatsApp messages through Twilio.
pub struct TwilioChannel {
    account_sid: String,
    auth_token: String,
    phone_number: String,
    api_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct MessageResource {
    sid: String,
}

impl TwilioChannel {
    pub fn new(
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        phone_number: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            phone_number: strip_whatsapp(&phone_number.into()).to_string(),
            api_url: DEFAULT_API_URL.into(),
            client,
        }
    }

    /// Build from the `[twilio]` config section.
    pub fn from_config(config: &TwilioConfig) -> Result<Self, ChannelError> {
        match (&config.account_sid, &config.auth_token, &config.phone_number) {
            (Some(sid), Some(token), Some(number)) => {
                let mut channel = Self::new(sid, token, number);
                if let Some(url) = &config.api_url {
                    channel = channel.with_api_url(url);
                }
                Ok(channel)
            }
            _ => Err(ChannelError::NotConfigured(
                "twilio.account_sid, twilio.auth_token and twilio.phone_number are required".into(),
            )),
        }
    }

    /// Point at a different REST base URL.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// The sender number, without the `whatsapp:` prefix.
    pub fn phone_number(&self) -> &str {
        &self.phone_number
    }

    /// Check a webhook's `X-Twilio-Signature` against this account's token.
    pub fn validate_signature(
        &self,
        url: &str,
        params: &[(String, String)],
        signature: &str,
    ) -> bool {
        validate_signature(&self.auth_token, url, params, signature)
    }
}

/// Drop a leading `whatsapp:` from a Twilio address.
pub fn strip_whatsapp(address: &str) -> &str {
    address.strip_prefix(WHATSAPP_PREFIX).unwrap_or(address)
}

fn whatsapp(address: &str) -> String {
    format!("{WHATSAPP_PREFIX}{}", strip_whatsapp(address))
}

fn signed_payload(url: &str, params: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort();
    let mut payload = url.to_string();
    for (key, value) in sorted {
        payload.push_str(key);
        payload.push_str(value);
    }
    payload
}

/// Compute the signature Twilio sends for a POST to `url` with `params`.
pub fn compute_signature(
    auth_token: &str,
    url: &str,
    params: &[(String, String)],
) -> Option<String> {
    let mut mac = HmacSha1::new_from_slice(auth_token.as_bytes()).ok()?;
    mac.update(signed_payload(url, params).as_bytes());
    Some(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Verify a base64 HMAC-SHA1 webhook signature in constant time.
pub fn validate_signature(
    auth_token: &str,
    url: &str,
    params: &[(String, String)],
    signature: &str,
) -> bool {
    let Ok(provided) = STANDARD.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha1::new_from_slice(auth_token.as_bytes()) else {
        return false;
    };
    mac.update(signed_payload(url, params).as_bytes());
    mac.verify_slice(&provided).is_ok()
}

#[async_trait]
impl Channel for TwilioChannel {
    fn name(&self) -> &str {
        "twilio"
    }

    async fn send(&self, message: &OutboundMessage) -> Result<String, ChannelError> {
        let url = format!("{}/Accounts/{}/Messages.json", self.api_url, self.account_sid);
        let from = whatsapp(if message.sender.is_empty() {
            &self.phone_number
        } else {
            &message.sender
        });
        let to = whatsapp(&message.recipient);

        debug!(to = %to, chars = message.text.chars().count(), "Sending WhatsApp message");

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("From", from.as_str()), ("To", to.as_str()), ("Body", message.text.as_str())])
            .send()
            .await
            .map_err(|e| ChannelError::ConnectionLost(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "Twilio rejected message");
            return Err(ChannelError::DeliveryFailed {
                channel: "twilio".into(),
                reason: format!("HTTP {}: {body}", status.as_u16()),
            });
        }

        let resource: MessageResource = response
            .json()
            .await
            .map_err(|e| ChannelError::InvalidPayload(e.to_string()))?;
        Ok(resource.sid)
    }

    async fn health_check(&self) -> Result<bool, ChannelError> {
        let url = format!("{}/Accounts/{}.json", self.api_url, self.account_sid);
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await
            .map_err(|e| ChannelError::ConnectionLost(e.to_string()))?;
        Ok(response.status().is_success())
    }
}
