//! `authorchat ask`: One question, one reply.

use authorchat_config::AppConfig;
use authorchat_core::message::Message;

use super::runtime;

pub async fn run(
    config: AppConfig,
    author: Option<String>,
    user: String,
    question: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let author = runtime::author_or_default(&config, author)?;
    let runtime = runtime::build(&config).await?;
    let persona = runtime.manager.resolve_author(&author).await?;

    let message = Message::user(question.trim(), &user, &persona.name);
    eprint!("  Thinking...");
    let reply = runtime.manager.process_message(&message).await;
    eprint!("\r              \r");

    println!("{}", reply?);
    Ok(())
}
