use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use auris_tools::{
    app_state::AppState,
    config::{AwsConfig, AwsSettings},
    services::{
        codec,
        gemini::{GeminiClient, GenerationSettings},
        ocr::{PollPolicy, TextractHandler},
        word,
    },
};

#[derive(Parser)]
#[command(name = "auris", version, about = "S3, DynamoDB, Textract, Word and Gemini helpers")]
struct Cli {
    /// AWS region (AWS_DEFAULT_REGION takes precedence)
    #[arg(long, global = true)]
    region: Option<String>,

    /// AWS profile (AWS_PROFILE takes precedence)
    #[arg(long, global = true)]
    profile: Option<String>,

    /// Endpoint override, e.g. a local emulator (AWS_ENDPOINT_URL takes precedence)
    #[arg(long, global = true)]
    endpoint_url: Option<String>,

    /// DynamoDB table for item commands
    #[arg(long, global = true, env = "AURIS_TABLE", default_value = "auris")]
    table: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run text detection on an S3 document and print the recognized lines
    Ocr {
        bucket: String,
        key: String,
        /// Give up after this many status checks
        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// Fetch an item by key (plain or DynamoDB JSON)
    GetItem {
        key: String,
    },
    /// Insert an item (plain or DynamoDB JSON)
    PutItem {
        item: String,
    },
    /// Delete an item by key
    DeleteItem {
        key: String,
    },
    /// Upload a local file
    Upload {
        path: PathBuf,
        bucket: String,
        key: String,
    },
    /// Download an object to a local file
    Download {
        bucket: String,
        key: String,
        path: PathBuf,
    },
    /// List object keys
    List {
        bucket: String,
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Print the paragraph text of a Word document
    DocxText {
        bucket: String,
        key: String,
        /// Collapse blank lines and repeated whitespace
        #[arg(long)]
        clean: bool,
    },
    /// Replace a placeholder in a Word document and upload the result
    DocxReplace {
        bucket: String,
        key: String,
        placeholder: String,
        replacement: String,
        /// Stop after this many replacements
        #[arg(long)]
        max_count: Option<usize>,
        /// Destination key (defaults to overwriting the source)
        #[arg(long)]
        output_key: Option<String>,
    },
    /// Generate text with Gemini
    Generate {
        prompt: String,
        #[arg(long)]
        model: Option<String>,
        #[arg(long, default_value = "text/plain")]
        mime_type: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<bool, Box<dyn std::error::Error>> {
    let Cli {
        region,
        profile,
        endpoint_url,
        table,
        command,
    } = cli;

    if let Command::Generate {
        prompt,
        model,
        mime_type,
    } = command
    {
        return generate(&prompt, model, mime_type).await;
    }

    let config = AwsConfig::new(AwsSettings {
        region,
        profile,
        endpoint_url,
        ..Default::default()
    })?;
    let state = AppState::from_config(&config, &table).await?;
    run_aws(command, &state).await
}

async fn generate(
    prompt: &str,
    model: Option<String>,
    mime_type: String,
) -> Result<bool, Box<dyn std::error::Error>> {
    let mut settings = GenerationSettings {
        response_mime_type: mime_type,
        ..Default::default()
    };
    if let Some(model) = model {
        settings.model = model;
    }
    let client = GeminiClient::new(None, settings)?;
    let text = client.generate_output(prompt).await;
    println!("{text}");
    Ok(!text.is_empty())
}

async fn run_aws(command: Command, state: &AppState) -> Result<bool, Box<dyn std::error::Error>> {
    let table = state.database.table_name().to_string();

    match command {
        Command::Ocr {
            bucket,
            key,
            max_attempts,
        } => {
            let policy = PollPolicy {
                max_attempts,
                ..state.ocr.policy()
            };
            let ocr = TextractHandler::clone(&state.ocr).with_policy(policy);
            let text = ocr.extract_document_text(&bucket, &key).await?;
            println!("{text}");
            Ok(true)
        }
        Command::GetItem { key } => {
            let key: serde_json::Value = serde_json::from_str(&key)?;
            match state.database.get_item(&table, key).await? {
                Some(item) => {
                    println!("{}", serde_json::to_string_pretty(&codec::item_to_json(&item))?);
                    Ok(true)
                }
                None => {
                    tracing::warn!(table = %table, "Item not found");
                    Ok(false)
                }
            }
        }
        Command::PutItem { item } => {
            let item: serde_json::Value = serde_json::from_str(&item)?;
            let written = state.database.insert_item(&table, item).await?;
            println!("{}", serde_json::to_string(&written)?);
            Ok(true)
        }
        Command::DeleteItem { key } => {
            let key: serde_json::Value = serde_json::from_str(&key)?;
            Ok(state.database.delete_item(&table, key).await)
        }
        Command::Upload { path, bucket, key } => {
            Ok(state.storage.upload_file(&path, &bucket, &key).await)
        }
        Command::Download { bucket, key, path } => {
            Ok(state.storage.download_file(&bucket, &key, &path).await)
        }
        Command::List { bucket, prefix } => {
            for key in state.storage.list_files(&bucket, prefix.as_deref()).await {
                println!("{key}");
            }
            Ok(true)
        }
        Command::DocxText { bucket, key, clean } => {
            let text = state.word.read_document(&bucket, &key).await?.text();
            let text = if clean { word::clean_text(&text) } else { text };
            println!("{text}");
            Ok(true)
        }
        Command::DocxReplace {
            bucket,
            key,
            placeholder,
            replacement,
            max_count,
            output_key,
        } => {
            let mut document = state.word.read_document(&bucket, &key).await?;
            let replaced = document.replace_placeholder(&placeholder, &replacement, max_count);
            let output_key = output_key.unwrap_or(key);
            state.word.upload_docx(&document, &bucket, &output_key).await?;
            println!("{replaced}");
            Ok(replaced > 0)
        }
        Command::Generate {
            prompt,
            model,
            mime_type,
        } => generate(&prompt, model, mime_type).await,
    }
}
