use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use career_coach::config::{EngineConfig, StoreConfig};
use career_coach::engine::Engine;
use career_coach::generators::LlmGenerator;
use career_coach::llm::{LlmConfig, create_provider};
use career_coach::session::{SessionContext, SessionKind};
use career_coach::store::LibSqlBackend;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // File logging when CAREER_COACH_LOG_DIR is set, stderr otherwise
    let _log_guard = init_tracing();

    let kind: SessionKind = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "interview".to_string())
        .parse()
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    let owner_id = std::env::var("CAREER_COACH_OWNER").unwrap_or_else(|_| "local".to_string());

    let engine_config = EngineConfig::from_env()?;
    let store_config = StoreConfig::from_env();
    let llm_config = LlmConfig::from_env().context("an API key is required, export OPENAI_API_KEY")?;

    eprintln!("🎯 Career Coach v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", llm_config.model);
    eprintln!("   Endpoint: {}", llm_config.base_url);
    eprintln!("   Database: {}", store_config.db_path.display());
    eprintln!("   Session: {kind}\n");

    let llm = create_provider(&llm_config)?;
    let generator = Arc::new(LlmGenerator::new(llm).with_temperature(llm_config.temperature));
    let store = Arc::new(
        LibSqlBackend::new_local(&store_config.db_path)
            .await
            .with_context(|| format!("failed to open database at {}", store_config.db_path.display()))?,
    );
    let engine = Engine::new(store, generator, engine_config)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let context = match kind {
        SessionKind::Interview => {
            let role = ask(&mut lines, "Role you are interviewing for").await?;
            let company = ask(&mut lines, "Company").await?;
            SessionContext::interview(role, company)
        }
        SessionKind::Assessment => {
            let background = ask(&mut lines, "Short background (optional)").await?;
            if background.is_empty() {
                SessionContext::default()
            } else {
                SessionContext::default().with_background(serde_json::json!({ "summary": background }))
            }
        }
    };

    let started = engine.start_session(kind, &owner_id, context).await?;
    eprintln!("\nSession {}\n", started.session_id);

    for prompt in &started.prompts {
        println!("Q{}. {}", prompt.ordinal, prompt.text);
        for (i, option) in prompt.options.iter().enumerate() {
            println!("    {}) {}", i + 1, option.label);
        }
        let answer = loop {
            let line = ask(&mut lines, ">").await?;
            if !line.is_empty() {
                break line;
            }
        };

        let outcome = engine
            .submit_answer(&started.session_id, prompt.ordinal, &answer)
            .await?;
        if outcome.completed {
            let view = engine.get_session_state(&started.session_id).await?;
            for fb in &view.feedback {
                println!("\n[{}] score {}/10\n{}", fb.ordinal, fb.score, fb.text);
            }
            if let Some(score) = outcome.aggregate_score {
                println!("\nAggregate score: {score:.1}");
            }
            if let Some(summary) = outcome.summary {
                println!("\n{summary}");
            }
        }
    }

    Ok(())
}

async fn ask<R>(lines: &mut tokio::io::Lines<R>, label: &str) -> anyhow::Result<String>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut stdout = tokio::io::stdout();
    stdout.write_all(format!("{label} ").as_bytes()).await?;
    stdout.flush().await?;
    let line = lines.next_line().await?.context("stdin closed")?;
    Ok(line.trim().to_string())
}

fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match std::env::var("CAREER_COACH_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "career-coach.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer)
                .init();
            Some(guard)
        }
        Err(_) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
            None
        }
    }
}
