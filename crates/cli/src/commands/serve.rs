//! `authorchat serve`: Start the webhook gateway.

use authorchat_channels::{MessagingService, TwilioChannel};
use authorchat_config::AppConfig;
use authorchat_gateway::GatewayState;
use std::sync::Arc;

use super::runtime;

pub async fn run(
    mut config: AppConfig,
    port_override: Option<u16>,
    host_override: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(port) = port_override {
        config.gateway.port = port;
    }
    if let Some(host) = host_override {
        config.gateway.host = host;
    }

    let channel = TwilioChannel::from_config(&config.twilio)
        .map_err(|e| format!("Twilio is required to serve: {e}"))?;
    let runtime = runtime::build(&config).await?;

    println!("authorchat gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Sender:    whatsapp:{}", channel.phone_number());
    println!("   Store:     {}", runtime.stores.conversations.name());

    let messaging = MessagingService::new(Arc::new(channel));
    authorchat_gateway::start(GatewayState::new(config, runtime.manager, messaging)).await
}
