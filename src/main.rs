use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use twinchat::dispatch::ImageAttachment;
use twinchat::{Backend, Config, Mode, Outcome, Session};

#[derive(Parser, Debug)]
#[command(name = "twinchat")]
#[command(author, version, about = "Ask a local and a cloud model the same question")]
struct Cli {
    /// Prompt text; several words are joined with spaces
    #[arg(required = true)]
    prompt: Vec<String>,

    /// Wait for complete answers instead of streaming
    #[arg(long)]
    single_shot: bool,

    /// Attach an image (sent to the image backend only)
    #[arg(long, value_name = "PATH")]
    image: Option<PathBuf>,

    /// Gateway URL, e.g. http://localhost:8080
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Path to a TOML config file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(url) = cli.base_url {
        config.base_url = url;
    }
    if cli.single_shot {
        config.mode = Mode::SingleShot;
    }
    info!(base_url = %config.base_url, mode = ?config.mode, "starting");

    let mut session = Session::new(config.dispatcher()?);
    session.set_mode(config.mode);
    session.set_prompt(cli.prompt.join(" "));
    if let Some(path) = &cli.image {
        let image = ImageAttachment::from_path(path)
            .await
            .with_context(|| format!("reading image {}", path.display()))?;
        session.attach_image(image);
    }

    let stop = session.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("ctrl-c received");
            stop.stop();
        }
    });

    let done = CancellationToken::new();
    let renderer = tokio::spawn(render(
        [
            (Backend::Ollama, session.buffer(Backend::Ollama).subscribe()),
            (Backend::Gemini, session.buffer(Backend::Gemini).subscribe()),
        ],
        done.clone(),
    ));

    let report = session.submit().await;
    done.cancel();
    let mut tails = renderer.await.context("renderer task panicked")?;
    for (tail, backend) in tails.iter_mut().zip(Backend::ALL) {
        tail.emit(&session.buffer(backend).text(), true);
    }

    for backend in Backend::ALL {
        let status = match report.get(backend) {
            Outcome::Completed => "done".green(),
            Outcome::Stopped => "stopped".yellow(),
            Outcome::Failed(_) => "failed".red(),
            Outcome::Skipped => "skipped".dimmed(),
        };
        eprintln!("{} {}", label(backend), status);
    }

    Ok(())
}

/// Prints complete lines of both buffers as they grow.
async fn render(
    receivers: [(Backend, watch::Receiver<String>); 2],
    done: CancellationToken,
) -> [Tail; 2] {
    let [(a, mut rx_a), (b, mut rx_b)] = receivers;
    let mut tails = [Tail::new(a), Tail::new(b)];

    loop {
        tokio::select! {
            _ = done.cancelled() => break,
            Ok(()) = rx_a.changed() => {
                let text = rx_a.borrow_and_update().clone();
                tails[0].emit(&text, false);
            }
            Ok(()) = rx_b.changed() => {
                let text = rx_b.borrow_and_update().clone();
                tails[1].emit(&text, false);
            }
        }
    }
    tails
}

fn label(backend: Backend) -> colored::ColoredString {
    let tag = format!("[{backend}]");
    match backend {
        Backend::Ollama => tag.cyan().bold(),
        Backend::Gemini => tag.magenta().bold(),
    }
}

/// What has been printed of one buffer so far.
struct Tail {
    backend: Backend,
    printed: String,
}

impl Tail {
    fn new(backend: Backend) -> Self {
        Self {
            backend,
            printed: String::new(),
        }
    }

    /// Prints the part of `text` not yet shown. Only whole lines unless `flush`.
    fn emit(&mut self, text: &str, flush: bool) {
        // Replaced (error, "Stopped.", single-shot body): start over.
        if !text.starts_with(&self.printed) {
            self.printed.clear();
        }
        let fresh = &text[self.printed.len()..];
        let upto = if flush {
            fresh.len()
        } else {
            fresh.rfind('\n').map_or(0, |i| i + 1)
        };
        for line in fresh[..upto].lines() {
            println!("{} {}", label(self.backend), line);
        }
        self.printed.push_str(&fresh[..upto]);
    }
}
