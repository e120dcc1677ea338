//! Subcommand handlers for the Diligence CLI.

use crate::{Commands, ConfigAction, OutputFormat};
use anyhow::Context;
use diligence_core::{
    DiligenceEngine, DiligenceOutcome, DiligenceRequest, FactSet, ResearchCallback, SectionResult,
    TopicCatalog, render_markdown,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Prints one line per finished section to stderr.
struct ProgressPrinter;

impl ResearchCallback for ProgressPrinter {
    fn on_section_complete(&self, result: &SectionResult, completed: usize, total: usize) {
        eprintln!(
            "  [{completed}/{total}] {} ({}, confidence {})",
            result.topic_id, result.status, result.confidence
        );
    }
}

pub(crate) async fn handle_command(
    command: Commands,
    workspace: &Path,
    quiet: bool,
) -> anyhow::Result<()> {
    match command {
        Commands::Research {
            entity,
            facts,
            topics,
            format,
            output,
        } => {
            handle_research(
                workspace,
                ResearchArgs {
                    entity,
                    facts,
                    topics,
                    format,
                    output,
                    quiet,
                },
            )
            .await
        }
        Commands::Topics => {
            let catalog = TopicCatalog::builtin();
            println!("Built-in topics ({}):", catalog.len());
            for topic in catalog.iter() {
                println!("  {:<20} {}", topic.id, topic.title);
            }
            Ok(())
        }
        Commands::Config { action } => handle_config(action, workspace),
    }
}

struct ResearchArgs {
    entity: String,
    facts: Option<PathBuf>,
    topics: Vec<String>,
    format: OutputFormat,
    output: Option<PathBuf>,
    quiet: bool,
}

async fn handle_research(workspace: &Path, args: ResearchArgs) -> anyhow::Result<()> {
    let mut config = diligence_core::config::load_config(Some(workspace), None)
        .context("Failed to load configuration")?;
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }
    if !args.topics.is_empty() {
        config.research.topics = Some(args.topics);
    }

    let facts = args.facts.as_deref().map(load_facts).transpose()?;

    let mut engine = DiligenceEngine::from_config(&config)?;
    if !args.quiet {
        engine = engine.with_callback(Arc::new(ProgressPrinter));
        eprintln!(
            "Researching '{}' across {} topics...",
            args.entity,
            engine.catalog().len()
        );
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; finishing with partial results");
            on_interrupt.cancel();
        }
    });

    let mut request = DiligenceRequest::new(args.entity);
    if let Some(facts) = facts {
        request = request.with_facts(facts);
    }
    let outcome = engine.run(request, cancel).await?;

    let rendered = render(&outcome, args.format)?;
    match args.output {
        Some(path) => {
            std::fs::write(&path, rendered)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            if !args.quiet {
                eprintln!("Report written to {}", path.display());
            }
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

fn load_facts(path: &Path) -> anyhow::Result<FactSet> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read facts file {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Invalid facts JSON in {}", path.display()))?;
    if !value.is_object() {
        anyhow::bail!("Facts file {} must contain a JSON object", path.display());
    }
    Ok(FactSet::from_value(value))
}

fn render(outcome: &DiligenceOutcome, format: OutputFormat) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(outcome)?,
        OutputFormat::Markdown => render_markdown(outcome),
    })
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".diligence");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let default_config = diligence_core::DiligenceConfig::default();
            let toml_str = toml::to_string_pretty(&default_config)?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = diligence_core::config::load_config(Some(workspace), None)
                .context("Failed to load configuration")?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            for warning in config.validate() {
                eprintln!("warning: {}", warning);
            }
            Ok(())
        }
    }
}
