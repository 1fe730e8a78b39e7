//! `authorchat doctor`: Diagnose configuration and storage.

use std::path::Path;

use authorchat_config::AppConfig;

use super::config_cmd::resolve_path;

pub async fn run(
    path: Option<&Path>,
    config: Result<AppConfig, String>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("authorchat doctor");
    println!("=================\n");

    let mut issues = 0;

    let config_path = resolve_path(path);
    if config_path.exists() {
        println!("  ok    Config file found at {}", config_path.display());
    } else {
        println!("  warn  No config file at {}, using defaults", config_path.display());
    }

    let config = match config {
        Ok(config) => {
            println!("  ok    Config valid");
            config
        }
        Err(e) => {
            println!("  fail  {e}");
            println!("\n  1 issue found. Fix the config and run again.");
            return Ok(());
        }
    };

    match authorchat_providers::build_from_config(&config) {
        Ok(_) => println!("  ok    LLM provider '{}' ({})", config.llm.provider, config.llm.model),
        Err(e) => {
            println!("  fail  LLM provider: {e}");
            issues += 1;
        }
    }

    if config.twilio.is_configured() {
        println!("  ok    Twilio configured");
        if config.gateway.public_url.is_none() {
            println!("  warn  gateway.public_url unset; webhook signatures will not be checked");
        }
    } else {
        println!("  warn  Twilio not configured; `serve` will refuse to start");
    }

    match authorchat_store::open(&config.store).await {
        Ok(stores) => {
            println!("  ok    Store '{}' opened", stores.conversations.name());
            match stores.catalog.list_authors().await {
                Ok(authors) if authors.is_empty() => {
                    println!("  warn  No authors provisioned; run `authorchat provision author`");
                }
                Ok(authors) => {
                    for author in &authors {
                        let marker = if author.sources.is_empty() { "warn" } else { "ok  " };
                        println!("  {marker}  {}: {} book(s)", author.name, author.sources.len());
                    }
                    if let Some(default) = &config.processing.default_author {
                        if !authors.iter().any(|a| a.answers_to(default)) {
                            println!("  fail  Default author '{default}' is not provisioned");
                            issues += 1;
                        }
                    }
                }
                Err(e) => {
                    println!("  fail  Listing authors: {e}");
                    issues += 1;
                }
            }
        }
        Err(e) => {
            println!("  fail  Store: {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  All checks passed!");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }
    Ok(())
}
