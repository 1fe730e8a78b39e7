//! `authorchat chat`: Interactive conversation in the terminal.

use std::io::Write;
use std::sync::Arc;

use authorchat_channels::{ConsoleChannel, MessagingService};
use authorchat_config::AppConfig;
use authorchat_core::store::ContentSourceStore;

use super::runtime;

pub async fn run(
    config: AppConfig,
    author: Option<String>,
    user: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let author = runtime::author_or_default(&config, author)?;
    let runtime = runtime::build(&config).await?;
    let persona = runtime.manager.resolve_author(&author).await?;
    let books = runtime.stores.sources.list_sources(&persona.name).await?;

    println!();
    println!("  Talking with {}", persona.name);
    println!("  Books:     {}", books.len());
    println!("  Model:     {}", config.llm.model);
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let console = ConsoleChannel::new().with_speaker(&persona.name);
    let messaging = MessagingService::new(Arc::new(console));
    let mut rx = ConsoleChannel::listen(&user, &persona.name);

    print!("  You > ");
    std::io::stdout().flush()?;

    while let Some(result) = rx.recv().await {
        let inbound = match result {
            Ok(inbound) => inbound,
            Err(e) => {
                eprintln!("  [Channel Error] {e}");
                break;
            }
        };

        let message = messaging.incoming(&inbound.text, &inbound.sender, &inbound.recipient);
        eprint!("  ...");
        match runtime.manager.process_message(&message).await {
            Ok(reply) => {
                eprint!("\r     \r");
                messaging
                    .send(
                        &reply,
                        &message.sender_id,
                        &message.recipient_id,
                        &message.conversation_id,
                    )
                    .await?;
            }
            Err(e) => {
                eprint!("\r     \r");
                eprintln!("  [Error] {e}");
                if let Some(fallback) = &config.processing.fallback_reply {
                    println!("\n{}: {fallback}\n", persona.name);
                }
            }
        }

        print!("  You > ");
        std::io::stdout().flush()?;
    }

    println!();
    Ok(())
}
