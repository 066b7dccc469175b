//! CLI interface for ace-playbook

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::delta::{parse_delta, ApplyPolicy, DeltaBatch};
use crate::learning::{extract_citations, Curator, LearningLoop, Reflector, TaskOutcome};
use crate::llm::{credentials, OpenRouterClient, ProviderConfig};
use crate::playbook::{wrap_for_external_agent, PlaybookStore, RenderFilter};
use crate::types::AgentOutput;

#[derive(Parser)]
#[command(name = "ace-playbook")]
#[command(about = "Self-curating strategy playbook for LLM agents", long_about = None)]
#[command(version)]
struct Cli {
    /// Playbook file (overrides the configured path)
    #[arg(long, global = true, env = "ACE_PLAYBOOK")]
    playbook: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the playbook
    Show {
        /// Only these sections (repeatable)
        #[arg(short, long)]
        section: Vec<String>,
        /// Hide bullets with more harmful than helpful votes
        #[arg(long)]
        skip_harmful: bool,
        /// Maximum bullets per section
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Print the context block for an external agent's prompt
    Context,
    /// Show playbook statistics
    Stats,
    /// Apply a delta document (file path, inline JSON, or "-" for stdin)
    Apply {
        delta: String,
        /// Apply valid operations even if some are rejected
        #[arg(long)]
        lenient: bool,
    },
    /// List bullet citations found in text
    Cite { text: String },
    /// Learn from one task outcome (reflect, curate, apply, save)
    Learn {
        #[arg(short, long)]
        question: String,
        /// The agent's final answer
        #[arg(short, long)]
        output: String,
        /// What happened, in your own words
        #[arg(short, long)]
        feedback: String,
        /// The task succeeded
        #[arg(long, conflicts_with = "failed")]
        success: bool,
        /// The task failed
        #[arg(long)]
        failed: bool,
        /// The agent's reasoning (scanned for citations)
        #[arg(long, default_value = "")]
        reasoning: String,
        #[arg(long)]
        ground_truth: Option<String>,
        /// Task description for the curator
        #[arg(long, default_value = "")]
        context: String,
        #[arg(long, default_value = "")]
        progress: String,
        #[arg(long)]
        lenient: bool,
    },
    /// Configure ace-playbook
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
        /// Overwrite the config file with defaults
        #[arg(long)]
        reset: bool,
        /// Store the OpenRouter API key
        #[arg(long, conflicts_with = "delete_api_key")]
        set_api_key: Option<String>,
        /// Remove the stored OpenRouter API key
        #[arg(long)]
        delete_api_key: bool,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;
    let store = match &cli.playbook {
        Some(path) => PlaybookStore::new(path),
        None => PlaybookStore::new(config.playbook.resolved_path()?),
    };

    match cli.command {
        Commands::Show { section, skip_harmful, limit } => {
            let playbook = store.load()?;
            let filter = RenderFilter {
                sections: if section.is_empty() { None } else { Some(section) },
                skip_harmful,
                max_per_section: limit,
            };
            let rendered = playbook.render(Some(&filter));
            if rendered.is_empty() {
                println!("Playbook is empty ({})", store.path().display());
            } else {
                println!("{}", rendered);
            }
        }
        Commands::Context => {
            print!("{}", wrap_for_external_agent(&store.load()?));
        }
        Commands::Stats => {
            let playbook = store.load()?;
            let stats = playbook.stats();
            println!("Playbook: {}", store.path().display());
            println!("Revision: {}", stats.revision);
            println!("Sections: {}", stats.sections);
            println!("Bullets:  {}", stats.bullets);
            println!("Helpful:  {}", stats.helpful);
            println!("Harmful:  {}", stats.harmful);
            for section in playbook.sections() {
                println!("  {:<24} {:>4} bullets (next id {})", section.name(), section.bullets().len(), section.high_water().saturating_add(1));
            }
        }
        Commands::Apply { delta, lenient } => {
            let text = read_delta_arg(&delta)?;
            let parsed = parse_delta(&text).context("Failed to parse delta")?;
            if let Some((index, failure)) = parsed.invalid.first() {
                bail!("Operation #{} is malformed: {}", index, failure);
            }
            let batch: DeltaBatch = DeltaBatch {
                reasoning: parsed.reasoning,
                operations: parsed.candidates.into_iter().map(|c| c.operation).collect(),
            };

            let policy = if lenient { ApplyPolicy::Lenient } else { config.playbook.apply_policy };
            let mut playbook = store.load()?;
            let base = playbook.revision();
            let report = playbook.apply(&batch, policy)?;
            for rejected in &report.rejected {
                eprintln!("Rejected {}", rejected);
            }
            if report.changed() {
                store.save_checked(&playbook, base)?;
            }
            println!("{}", report);
            for id in &report.added {
                println!("  + {}", id);
            }
        }
        Commands::Cite { text } => {
            for id in extract_citations(&text) {
                println!("{}", id);
            }
        }
        Commands::Learn {
            question,
            output,
            feedback,
            success,
            failed,
            reasoning,
            ground_truth,
            context,
            progress,
            lenient,
        } => {
            let (reflector, curator) = build_roles(&config)?;
            let policy = if lenient { ApplyPolicy::Lenient } else { config.playbook.apply_policy };
            let learning = LearningLoop::open(store, reflector, curator)?
                .with_policy(policy)
                .with_autosave(config.playbook.autosave);

            let flag = match (success, failed) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            let mut agent_output = AgentOutput::external(output, flag);
            agent_output.reasoning = reasoning;
            agent_output.bullet_ids = extract_citations(&agent_output.reasoning);

            let mut task = TaskOutcome::new(question, agent_output, feedback)
                .with_context(context)
                .with_progress(progress);
            task.ground_truth = ground_truth;

            let report = learning.learn(&task).await?;
            println!("Outcome:  {} (confidence {:.2})", report.reflection.outcome, report.reflection.confidence);
            if report.reflection.degraded {
                println!("Reflection degraded; see logs (RUST_LOG=warn)");
            }
            if !report.reflection.key_insight.is_empty() {
                println!("Insight:  {}", report.reflection.key_insight);
            }
            for op in &report.delta.operations {
                println!("  {}", op);
            }
            println!("{}", report.apply);
            if report.saved {
                println!("Saved.");
            }
        }
        Commands::Config { show, reset, set_api_key, delete_api_key } => {
            if let Some(key) = set_api_key {
                credentials::set_api_key(&key)?;
                println!("OpenRouter API key stored.");
            } else if delete_api_key {
                credentials::delete_api_key()?;
                println!("OpenRouter API key removed.");
            } else if reset {
                let path = crate::config::config_path()?;
                Config::default().save_to(&path)?;
                println!("Wrote default config to {}", path.display());
            } else if show {
                crate::config::show_config(&config)?;
            } else {
                println!("Configuration options:");
                println!("  --show                 Display current configuration");
                println!("  --reset                Overwrite the config file with defaults");
                println!("  --set-api-key <key>    Store your OpenRouter API key");
                println!("  --delete-api-key       Remove the stored API key");
                println!();
                println!("Config file: {}", crate::config::config_path()?.display());
                println!("\n{}", crate::config::default_config_toml());
            }
        }
    }

    Ok(())
}

fn read_delta_arg(arg: &str) -> Result<String> {
    let trimmed = arg.trim_start();
    if arg == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).context("Failed to read delta from stdin")?;
        Ok(buf)
    } else if trimmed.starts_with('{') || trimmed.starts_with('[') {
        Ok(arg.to_string())
    } else {
        std::fs::read_to_string(arg).with_context(|| format!("Failed to read delta file {}", arg))
    }
}

/// Reflector and curator wired to the configured provider
fn build_roles(config: &Config) -> Result<(Reflector, Curator)> {
    let api_key = credentials::get_api_key()?;
    let provider = ProviderConfig::from_settings(&config.provider, api_key);
    let client = OpenRouterClient::new(provider, config.reflector_model()).context("Failed to build HTTP client")?;

    let reflector = Reflector::new(Arc::new(client.clone()), config.reflector.clone());
    let curator = Curator::new(Arc::new(client.with_model(config.curator_model())), config.curator.clone());
    Ok((reflector, curator))
}
