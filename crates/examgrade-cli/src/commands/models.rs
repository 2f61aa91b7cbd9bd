//! The `examgrade models` command.

use std::path::PathBuf;

use anyhow::Result;

use examgrade_core::model::ModelSpec;
use examgrade_providers::ollama::OllamaClient;

pub async fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let config = examgrade_providers::load_config_from(config_path.as_deref())?;

    println!("Local (Ollama at {}):", config.ollama_url);
    let ollama = OllamaClient::new(
        ModelSpec::local(&config.default_model),
        &config.ollama_url,
        config.request_timeout_secs,
    );
    match ollama.list_models().await {
        Ok(names) if names.is_empty() => println!("  no models pulled"),
        Ok(names) => {
            for name in &names {
                let marker = if *name == config.default_model {
                    " (default)"
                } else {
                    ""
                };
                println!("  {name}{marker}");
            }
        }
        Err(e) => {
            println!("  {} (default)", config.default_model);
            eprintln!("  warning: {e}");
        }
    }

    println!();
    if config.models.is_empty() {
        println!("No external models configured. Run `examgrade init` to create a config file.");
    } else {
        println!("External:");
        for model in &config.models {
            println!(
                "  {} at {} (owner: {})",
                model.description, model.api_url, model.owner
            );
        }
    }

    Ok(())
}
