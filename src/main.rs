use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();
    verselex::logging::init().context("init logging")?;
    match dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
        Err(err) if err.not_found() => {}
        Err(err) => return Err(err).context("load .env"),
    }

    let cli = verselex::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");
    let config = verselex::config::Config::load(cli.config.as_deref()).context("load config")?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received; stopping at the next step");
                cancel.cancel();
            }
        }
    });

    match cli.command {
        verselex::cli::Command::Lexicon(args) => {
            verselex::lexicon::run(args, config, cancel)
                .await
                .context("lexicon")?;
        }
        verselex::cli::Command::Verses(args) => {
            verselex::verses::run(args, config, cancel)
                .await
                .context("verses")?;
        }
        verselex::cli::Command::Ingest(args) => {
            verselex::ingest::run(args, config).await.context("ingest")?;
        }
        verselex::cli::Command::Query(args) => {
            verselex::query::run(args, config).await.context("query")?;
        }
    }

    Ok(())
}
