//! Tadawul context bot
//!
//! Reads one question per line from stdin and prints the validated JSON
//! response for each.
//!
//! # Usage
//!
//! ```bash
//! export OPENAI_API_BASE="http://localhost:1234/v1"
//! export OPENAI_MODEL="your-model-name"
//!
//! echo "How is Saudi Aramco doing today?" | cargo run --bin tadawul-bot -- --documents corpus/manifest.json
//! ```

use anyhow::Context as _;
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tadawul_context::api::YahooFinanceClient;
use tadawul_context::{
    ChatService, ContextConfig, DocumentLoader, DocumentStore, Gazetteer, Message,
};
use tadawul_llm::providers::{OpenAIConfig, OpenAIProvider};
use tadawul_utils::{AppConfig, init_tracing_with};

#[derive(Debug, Parser)]
#[command(name = "tadawul-bot", about = "Saudi-market question answering over live context")]
struct Args {
    /// Document manifest (JSON); overrides TADAWUL_DOCUMENTS
    #[arg(long)]
    documents: Option<PathBuf>,

    /// Gazetteer JSON replacing the built-in Tadawul list
    #[arg(long)]
    gazetteer: Option<PathBuf>,

    /// Conversation id used for every question of this session
    #[arg(long, default_value = "cli")]
    conversation: String,

    /// Print one JSON object per line instead of pretty output
    #[arg(long)]
    compact: bool,
}

fn provider_config() -> OpenAIConfig {
    OpenAIConfig::from_env().unwrap_or_else(|_| {
        let api_base = std::env::var("OPENAI_API_BASE")
            .unwrap_or_else(|_| "http://localhost:1234/v1".to_string());
        OpenAIConfig::new("not-needed").with_api_base(api_base)
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let app = AppConfig::from_env()?;
    init_tracing_with(app.log_format, &app.log_filter);

    let mut builder = ContextConfig::builder().with_env();
    if let Some(path) = &args.documents {
        builder = builder.document_manifest(path);
    }
    let config = builder.build()?;

    let gazetteer = match &args.gazetteer {
        Some(path) => Gazetteer::from_path(path)
            .with_context(|| format!("loading gazetteer {}", path.display()))?,
        None => Gazetteer::tadawul(),
    };

    let mut store = DocumentStore::new();
    if let Some(manifest) = &config.document_manifest {
        let loaded = DocumentLoader::new(manifest)
            .load_into(&mut store)
            .with_context(|| format!("loading documents from {}", manifest.display()))?;
        tracing::info!(documents = loaded, "document corpus loaded");
    }

    let market = Arc::new(YahooFinanceClient::new(&config)?);
    let llm = Arc::new(OpenAIProvider::with_config(provider_config())?);
    let service = ChatService::new(config, Arc::new(gazetteer), market, llm, store)?;

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut history: Vec<Message> = Vec::new();

    for line in stdin.lock().lines() {
        let line = line?;
        let question = line.trim();
        if question.is_empty() {
            continue;
        }

        history.push(Message::user(question));
        let outcome = service.handle(&args.conversation, history.clone()).await;
        if let Some(reply) = outcome.reply {
            history.push(reply);
        }

        let rendered = if args.compact {
            serde_json::to_string(&outcome.response)?
        } else {
            serde_json::to_string_pretty(&outcome.response)?
        };
        writeln!(stdout, "{rendered}")?;
        stdout.flush()?;
    }

    Ok(())
}
