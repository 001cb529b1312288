use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use rmp_assistant::client::{speaker, ChatClient, Conversation, ConversationEvent};
use rmp_assistant::config::{Config, IndexBackend};
use rmp_assistant::error::{Result, RmpError};
use rmp_assistant::ingest::{ingest_reviews, load_reviews, DEFAULT_BATCH_SIZE};
use rmp_assistant::providers::openai::OpenAiProvider;
use rmp_assistant::providers::pinecone::PineconeIndex;

#[derive(Parser, Debug)]
#[command(name = "rmp-assistant")]
#[command(about = "Rate My Professor assistant: terminal chat and review ingestion")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Chat with a running rmp-assistantd.
    Chat {
        #[arg(long, env = "RMP_SERVER", default_value = "http://127.0.0.1:3000")]
        server: String,
    },
    /// Embed a reviews file and upsert it into the Pinecone index.
    Ingest {
        file: PathBuf,

        #[arg(long, env = "RMP_CONFIG")]
        config: Option<PathBuf>,

        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    rmp_assistant::logging::init_tracing("rmp_assistant");
    let cli = Cli::parse();

    match cli.command {
        Command::Chat { server } => chat(&server).await,
        Command::Ingest {
            file,
            config,
            batch_size,
        } => ingest(&file, config.as_deref(), batch_size).await,
    }
}

async fn chat(server: &str) -> Result<()> {
    let client = ChatClient::new(server);
    let mut conversation = Conversation::with_greeting();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    for message in conversation.messages() {
        write_out(&mut stdout, &format!("{}: {}\n", speaker(message), message.content)).await?;
    }

    loop {
        write_out(&mut stdout, "you: ").await?;
        let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| RmpError::Runtime(e.to_string()))?
        else {
            break;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text == "/quit" {
            break;
        }

        let payload = conversation.begin_exchange(text)?;
        write_out(&mut stdout, "assistant: ").await?;
        let mut events = client.spawn_reply(payload);
        while let Some(event) = events.recv().await {
            conversation.apply(&event);
            match &event {
                ConversationEvent::Delta(fragment) => write_out(&mut stdout, fragment).await?,
                ConversationEvent::Completed => write_out(&mut stdout, "\n").await?,
                ConversationEvent::Failed(reason) => {
                    write_out(&mut stdout, &format!("\n[reply failed: {reason}]\n")).await?
                }
            }
        }
    }
    Ok(())
}

async fn write_out(stdout: &mut tokio::io::Stdout, text: &str) -> Result<()> {
    stdout
        .write_all(text.as_bytes())
        .await
        .map_err(|e| RmpError::Runtime(e.to_string()))?;
    stdout
        .flush()
        .await
        .map_err(|e| RmpError::Runtime(e.to_string()))
}

async fn ingest(file: &std::path::Path, config: Option<&std::path::Path>, batch_size: usize) -> Result<()> {
    let config = Config::load(config)?;
    if config.index.backend == IndexBackend::Memory {
        return Err(RmpError::Config(
            "ingest writes to pinecone; the memory backend is seeded by rmp-assistantd from index.seed_file"
                .to_string(),
        ));
    }
    config.validate()?;

    let reviews = load_reviews(file)?;
    let openai = OpenAiProvider::from_config(&config.openai)?;
    let index = PineconeIndex::from_config(&config.index)?;
    let model = openai.embedding_model().to_string();
    let count = ingest_reviews(&openai, &index, &reviews, Some(&model), batch_size).await?;
    println!("Upserted {count} of {} reviews into {}", reviews.len(), config.index.index_name);
    Ok(())
}
