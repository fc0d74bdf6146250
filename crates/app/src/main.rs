use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use pdf_chat_core::{
    chunk_document, parse, ChatOptions, ChatSession, ChunkingConfig, ElevenLabsSynthesizer,
    GeminiModel, PromptKind, ResponseCache, SegmentAudio,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-chat", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", default_value = "", hide_env_values = true)]
    gemini_api_key: String,

    /// ElevenLabs API key, required only for narration.
    #[arg(long, env = "ELEVENLABS_API_KEY", default_value = "", hide_env_values = true)]
    elevenlabs_api_key: String,
}

#[derive(Subcommand)]
enum Command {
    /// Upload a PDF and ask it one question.
    Ask {
        /// Path to the paper PDF.
        #[arg(long)]
        pdf: PathBuf,
        /// The question to ask.
        #[arg(long)]
        query: String,
        /// Number of passages to ground the answer on.
        #[arg(long, default_value = "6")]
        top_k: usize,
        /// Prompt flavor for the collaborator.
        #[arg(long, value_enum, default_value = "answer")]
        mode: AskMode,
        /// Also narrate the answer.
        #[arg(long, default_value_t = false)]
        narrate: bool,
        /// Directory for narrated segment files.
        #[arg(long, default_value = "narration")]
        out: PathBuf,
    },
    /// Parse and chunk a PDF and print what the pipeline would index.
    Inspect {
        /// Path to the paper PDF.
        #[arg(long)]
        pdf: PathBuf,
    },
}

/// CLI names for the prompt templates.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum AskMode {
    /// Answer the question from the cited excerpts.
    Answer,
    /// Short executive summary of the retrieved material.
    Summary,
    /// Research design, data collection and analysis techniques.
    Methodology,
    /// Principal findings and their significance.
    Findings,
}

impl From<AskMode> for PromptKind {
    fn from(mode: AskMode) -> Self {
        match mode {
            AskMode::Answer => PromptKind::GroundedAnswer,
            AskMode::Summary => PromptKind::QuickSummary,
            AskMode::Methodology => PromptKind::MethodologyAnalysis,
            AskMode::Findings => PromptKind::KeyFindings,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(started_at = %Utc::now().to_rfc3339(), "pdf-chat boot");

    match cli.command {
        Command::Ask {
            pdf,
            query,
            top_k,
            mode,
            narrate,
            out,
        } => {
            if cli.gemini_api_key.is_empty() {
                anyhow::bail!("a Gemini API key is required (--gemini-api-key or GEMINI_API_KEY)");
            }

            let options = ChatOptions {
                top_k,
                prompt_kind: mode.into(),
                ..ChatOptions::default()
            };
            let cache = Arc::new(ResponseCache::new(options.cache_ttl, options.cache_capacity));
            let model = Arc::new(GeminiModel::new(cli.gemini_api_key.clone()));

            let synthesizer = if narrate {
                if cli.elevenlabs_api_key.is_empty() {
                    anyhow::bail!(
                        "narration needs an ElevenLabs API key \
                         (--elevenlabs-api-key or ELEVENLABS_API_KEY)"
                    );
                }
                Some(Arc::new(ElevenLabsSynthesizer::new(
                    cli.elevenlabs_api_key.clone(),
                )) as Arc<dyn pdf_chat_core::SpeechSynthesizer>)
            } else {
                None
            };

            let bytes = tokio::fs::read(&pdf).await?;
            let mut session = ChatSession::upload(&bytes, model, synthesizer, cache, options)
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            info!(document_id = %session.document_id(), "document uploaded");

            if narrate {
                let (answer, segments) = session
                    .ask_narrated(&query)
                    .await
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?;

                print_answer(&answer.text, &answer.cited_chunk_ids, answer.from_cache);

                tokio::fs::create_dir_all(&out).await?;
                for segment in segments {
                    match segment.audio {
                        SegmentAudio::Bytes(bytes) => {
                            let path = out.join(format!("segment-{:02}.mp3", segment.index));
                            tokio::fs::write(&path, &bytes).await?;
                            println!("wrote {} ({} bytes)", path.display(), bytes.len());
                        }
                        SegmentAudio::Skipped => {
                            warn!(index = segment.index, "segment skipped");
                            println!("segment {} skipped", segment.index);
                        }
                    }
                }
            } else {
                let answer = session
                    .ask(&query)
                    .await
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?;
                print_answer(&answer.text, &answer.cited_chunk_ids, answer.from_cache);
            }
        }
        Command::Inspect { pdf } => {
            let bytes = tokio::fs::read(&pdf).await?;
            let document =
                parse(&bytes).map_err(|error| anyhow::anyhow!(error.to_string()))?;
            let chunks = chunk_document(&document, ChunkingConfig::from(&ChatOptions::default()));

            println!("document_id: {}", document.document_id);
            println!("pages: {}", document.pages.len());
            let low = document
                .pages
                .iter()
                .filter(|page| page.low_confidence)
                .count();
            if low > 0 {
                println!("low_confidence_pages: {low}");
            }
            println!("chunks: {}", chunks.len());
            for chunk in &chunks {
                println!(
                    "[{}] page={} tokens={} overlap={}",
                    chunk.chunk_id,
                    chunk.page_start + 1,
                    chunk.token_estimate,
                    chunk.overlap_with_previous
                );
            }
        }
    }

    Ok(())
}

fn print_answer(text: &str, cited: &[String], from_cache: bool) {
    println!("answer{}:", if from_cache { " (cached)" } else { "" });
    println!("{text}");
    if !cited.is_empty() {
        println!("cited: {}", cited.join(", "));
    }
}
