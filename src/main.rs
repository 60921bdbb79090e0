use clap::Parser;
use lead_copilot::cli::Cli;
use lead_copilot::config::Config;
use lead_copilot::fingerprint::FingerprintStore;
use lead_copilot::llm::AnthropicClient;
use lead_copilot::notify::SlackNotifier;
use lead_copilot::notion::NotionClient;
use lead_copilot::pipeline::{Pipeline, RunOptions, RunSummary};
use lead_copilot::setup::{self, Prompter};
use lead_copilot::store::{MemoryStore, RecordStore};
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn run_with_store<S: RecordStore>(
    config: Config,
    client: AnthropicClient,
    store: S,
    options: &RunOptions,
) -> anyhow::Result<RunSummary> {
    let mut fingerprints = FingerprintStore::load(&config.state_file)?;
    tracing::info!(
        "Loaded {} fingerprint(s) from {}",
        fingerprints.len(),
        fingerprints.path().display()
    );

    let pipeline = Pipeline::new(config, client, store);
    let summary = pipeline.run(&mut fingerprints, options).await?;
    Ok(summary)
}

/// Saves credentials to `.env`, checks Notion access and optionally creates
/// the output columns.
async fn run_setup() -> anyhow::Result<()> {
    let path = Path::new(setup::ENV_FILE);
    let existing = setup::read_env_file(path)?;

    let answers = {
        let stdin = std::io::stdin();
        let mut prompter = Prompter::new(stdin.lock(), std::io::stdout());
        setup::collect(&mut prompter, &existing)?
    };
    let Some(answers) = answers else {
        println!("Setup cancelled.");
        return Ok(());
    };

    setup::save_env_file(path, &answers.values)?;
    dotenvy::from_path_override(path)?;

    let config = Config::from_env()?;
    let notion = NotionClient::from_config(&config)?;
    notion.validate_database().await?;

    if answers.bootstrap_schema {
        let created = notion.ensure_schema_columns().await?;
        if created.is_empty() {
            tracing::info!("Database already has every output column");
        } else {
            tracing::info!("Created output columns: {}", created.join(", "));
        }
    }

    println!("Setup complete. Next step: lead-copilot --dry-run");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lead_copilot=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    if cli.setup {
        return run_setup().await;
    }

    let config = Config::from_env()?;

    let client = AnthropicClient::new(
        config.claude_base_url.clone(),
        config.claude_api_key.clone(),
        config.claude_model.clone(),
        config.llm_timeout,
    )?;

    let options = RunOptions {
        dry_run: cli.is_dry_run(),
        full_refresh: cli.full_refresh,
        limit: cli.limit,
        status: cli.status.clone(),
        ..RunOptions::default()
    };

    let slack_webhook = config.slack_webhook_url.clone();
    let summary = if cli.sample {
        tracing::info!("Using built-in sample leads");
        run_with_store(config, client, MemoryStore::sample(), &options).await?
    } else {
        let notion = NotionClient::from_config(&config)?;
        run_with_store(config, client, notion, &options).await?
    };

    if cli.slack {
        match slack_webhook.map(SlackNotifier::new) {
            Some(Ok(notifier)) => {
                if let Err(e) = notifier.send_summary(&summary).await {
                    tracing::warn!("Slack notification failed: {}", e);
                }
            }
            Some(Err(e)) => tracing::warn!("Slack notification skipped: {}", e),
            None => tracing::warn!("--slack given but SLACK_WEBHOOK_URL is not set"),
        }
    }

    println!("{}", summary.headline());
    Ok(())
}
