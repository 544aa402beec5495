use std::{
    io::{self, Write},
    path::PathBuf,
    time::Duration,
};

use anyhow::Context;
use clap::Parser;
use tracing::{debug, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use article_relay::{
    Article, ClientError, RelayClient, RevealPipeline, RevealStatus, SessionManager, Viewport,
};

#[derive(Parser)]
#[command(name = "article")]
#[command(version, about = "Stream an article through the relay and reveal it word by word")]
struct Cli {
    /// Base URL of the relay
    #[arg(long, env = "ARTICLE_RELAY_URL", default_value = "http://127.0.0.1:3000")]
    relay_url: String,

    /// Pause between revealed words, in milliseconds
    #[arg(long, env = "ARTICLE_DELAY_MS", default_value_t = 18)]
    delay_ms: u64,

    /// Also save the finished article (defaults to article.txt)
    #[arg(long, num_args = 0..=1, default_missing_value = "article.txt")]
    output: Option<PathBuf>,

    /// Topic or prompt to generate from
    #[arg(required = true)]
    prompt: Vec<String>,
}

/// Renders into the terminal. Output only grows, so each frame prints the
/// suffix that has not been written yet.
struct TerminalViewport<W: Write> {
    out: W,
    written: usize,
}

impl<W: Write> TerminalViewport<W> {
    fn new(out: W) -> Self {
        Self { out, written: 0 }
    }
}

impl<W: Write> Viewport for TerminalViewport<W> {
    fn set_loading(&mut self, loading: bool) {
        if loading {
            self.written = 0;
            eprintln!("generating...");
        } else if self.written > 0 {
            if let Err(err) = writeln!(self.out) {
                warn!(%err, "failed to finish article output");
            }
        }
    }

    fn render(&mut self, article: &Article) {
        let text = article.as_str();
        if let Some(fresh) = text.get(self.written..) {
            match write!(self.out, "{fresh}") {
                Ok(()) => self.written = text.len(),
                Err(err) => warn!(%err, "failed to write article output"),
            }
        }
    }

    fn scroll_to_bottom(&mut self) {
        if let Err(err) = self.out.flush() {
            debug!(%err, "failed to flush article output");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let prompt = cli.prompt.join(" ");
    let client = RelayClient::new(&cli.relay_url);
    let chunks = match client.generate(&prompt) {
        Ok(chunks) => chunks,
        Err(ClientError::EmptyPrompt) => {
            eprintln!("nothing to generate: prompt is blank");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    let sessions = SessionManager::new();
    let session = sessions.begin();
    {
        let sessions = sessions.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                sessions.cancel_active();
            }
        });
    }

    let pipeline = RevealPipeline::new(Duration::from_millis(cli.delay_ms));
    let mut viewport = TerminalViewport::new(io::stdout());
    let outcome = pipeline.run(chunks, &mut viewport, session.token()).await;
    sessions.finish(&session);

    let article = outcome.article;
    eprintln!(
        "{} words, {} min read",
        article.word_count(),
        article.read_time_minutes()
    );

    if let Some(path) = cli.output {
        std::fs::write(&path, article.as_str())
            .with_context(|| format!("failed to write {}", path.display()))?;
        eprintln!("saved to {}", path.display());
    }

    match outcome.status {
        RevealStatus::Completed => Ok(()),
        RevealStatus::Cancelled => {
            eprintln!("cancelled");
            Ok(())
        }
        RevealStatus::Failed => anyhow::bail!("generation failed"),
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "warn".into());
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
