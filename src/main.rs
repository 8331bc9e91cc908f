use clap::Parser;
use colored::Colorize;
use quizforge::cli::{dispatch, Cli};
use quizforge::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    println!("{}", "QuizForge — French grammar quiz generation and dispatch service".cyan().bold());

    let cli = Cli::parse();
    let config = AppConfig::load()?;

    if let Err(error) = dispatch(cli, config).await {
        eprintln!("{} {error:#}", "error:".red().bold());
        std::process::exit(1);
    }

    Ok(())
}
