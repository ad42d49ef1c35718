//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use revsum_core::config::{SyncConfig, load_config};
use revsum_core::error::SyncStep;
use revsum_core::pipeline::{BatchReport, ReviewCollector, ReviewSyncPipeline, SyncOutcome};
use revsum_core::platform::HttpPlatform;
use revsum_core::summarizer::OpenAiSummarizer;
use revsum_core::types::{EntryWithReviews, LinkedSummary};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const NO_UPDATES: &str = "No new update on product reviews.";

/// Paths resolved from global flags.
pub struct Context {
    pub workspace: PathBuf,
    pub config_path: Option<PathBuf>,
}

impl Context {
    fn load_config(&self) -> anyhow::Result<SyncConfig> {
        load_config(Some(&self.workspace), self.config_path.as_deref())
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    fn load_valid_config(&self) -> anyhow::Result<SyncConfig> {
        let config = self.load_config()?;
        config.validate()?;
        Ok(config)
    }
}

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, ctx: &Context) -> anyhow::Result<()> {
    match command {
        Commands::Collect { output } => handle_collect(output.as_deref(), ctx).await,
        Commands::Process { input } => handle_process(&input, ctx).await,
        Commands::Sync => handle_sync(ctx).await,
        Commands::Config { action } => handle_config(action, ctx).await,
    }
}

async fn handle_collect(output: Option<&Path>, ctx: &Context) -> anyhow::Result<()> {
    let config = ctx.load_valid_config()?;
    let platform = Arc::new(HttpPlatform::new(&config.platform, &config.write)?);
    let collector = ReviewCollector::new(platform, &config)?;
    let outcome = collector.collect_updates().await?;

    match (render_outcome(&outcome)?, output) {
        (None, _) => println!("{}", NO_UPDATES),
        (Some(json), Some(path)) => {
            std::fs::write(path, json)?;
            if let SyncOutcome::Updates { pages, entries } = &outcome {
                println!(
                    "Wrote {} entries in {} page(s) to {}",
                    entries,
                    pages.len(),
                    path.display()
                );
            }
        }
        (Some(json), None) => println!("{}", json),
    }
    Ok(())
}

async fn handle_process(input: &Path, ctx: &Context) -> anyhow::Result<()> {
    let entries = read_entries(input)?;
    if entries.is_empty() {
        println!("{}", NO_UPDATES);
        return Ok(());
    }
    let config = ctx.load_valid_config()?;
    let pipeline = build_pipeline(&config)?;
    let report = pipeline.process_batch(entries).await;
    finish(&report)
}

async fn handle_sync(ctx: &Context) -> anyhow::Result<()> {
    let config = ctx.load_valid_config()?;
    let pipeline = build_pipeline(&config)?;
    match pipeline.run().await? {
        None => {
            println!("{}", NO_UPDATES);
            Ok(())
        }
        Some(report) => finish(&report),
    }
}

async fn handle_config(action: ConfigAction, ctx: &Context) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = ctx.workspace.join(".revsum");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = toml::to_string_pretty(&SyncConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = ctx.load_config()?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        ConfigAction::Validate => {
            let config = ctx.load_config()?;
            config.validate()?;
            println!("Configuration is valid.");
            Ok(())
        }
    }
}

fn build_pipeline(
    config: &SyncConfig,
) -> anyhow::Result<ReviewSyncPipeline<HttpPlatform, OpenAiSummarizer>> {
    let platform = Arc::new(HttpPlatform::new(&config.platform, &config.write)?);
    let summarizer = Arc::new(OpenAiSummarizer::new(&config.summarizer)?);
    Ok(ReviewSyncPipeline::new(platform, summarizer, config)?)
}

/// Collected pages as pretty JSON, or `None` when there is nothing to update.
fn render_outcome(outcome: &SyncOutcome) -> anyhow::Result<Option<String>> {
    match outcome {
        SyncOutcome::NoUpdates => Ok(None),
        SyncOutcome::Updates { pages, .. } => Ok(Some(serde_json::to_string_pretty(pages)?)),
    }
}

/// `collect` output is paged; hand-written inputs are often a flat list.
#[derive(Deserialize)]
#[serde(untagged)]
enum EntriesInput {
    Paged(Vec<Vec<EntryWithReviews>>),
    Flat(Vec<EntryWithReviews>),
}

fn read_entries(path: &Path) -> anyhow::Result<Vec<EntryWithReviews>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    let input: EntriesInput = serde_json::from_str(&text).map_err(|_| {
        anyhow::anyhow!(
            "{} is neither a list of entries nor a list of pages of entries",
            path.display()
        )
    })?;
    Ok(match input {
        EntriesInput::Paged(pages) => pages.into_iter().flatten().collect(),
        EntriesInput::Flat(entries) => entries,
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FailureView<'a> {
    entry_id: &'a str,
    step: SyncStep,
    error: String,
}

#[derive(Serialize)]
struct ReportView<'a> {
    succeeded: &'a [LinkedSummary],
    failed: Vec<FailureView<'a>>,
}

fn render_report(report: &BatchReport) -> anyhow::Result<String> {
    let view = ReportView {
        succeeded: &report.succeeded,
        failed: report
            .failed
            .iter()
            .map(|e| FailureView {
                entry_id: &e.entry_id,
                step: e.step,
                error: e.source.to_string(),
            })
            .collect(),
    };
    Ok(serde_json::to_string_pretty(&view)?)
}

fn finish(report: &BatchReport) -> anyhow::Result<()> {
    println!("{}", render_report(report)?);
    if !report.is_success() {
        anyhow::bail!(
            "{} of {} entries failed to sync",
            report.failed.len(),
            report.total()
        );
    }
    Ok(())
}
