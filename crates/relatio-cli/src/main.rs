use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use relatio_core::assemble::AssemblyContext;
use relatio_core::config_file::load_config;
use relatio_core::model::{ConsensusModel, GeminiModel};
use relatio_core::{
    ConsensusConfig, MergeOutcome, MergePath, ValidationStatus, assemble_final_output,
    merge_tracks, merge_with_rules, records_from_value,
};

mod output;

use output::{ColorMode, StageStatus, format_duration, print_banner, print_status, print_step, print_table};

/// Relatio - consensus merge of regulatory cross-reference extractions
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Merge two extraction track outputs into one validated reference list
    Merge {
        /// Path to the Track A (global extraction) JSON output
        #[arg(long)]
        track_a: PathBuf,

        /// Path to the Track B (agentic extraction) JSON output
        #[arg(long)]
        track_b: PathBuf,

        /// Path to the converted source document text (markdown)
        #[arg(long)]
        source: PathBuf,

        /// Original document name recorded in the output (defaults to the
        /// source file name)
        #[arg(long)]
        name: Option<String>,

        /// Directory for the final JSON (default: output)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Gemini API key
        #[arg(long)]
        api_key: Option<String>,

        /// Consensus model name
        #[arg(long)]
        model: Option<String>,

        /// Skip the model call and use the rule-based merge only
        #[arg(long)]
        offline: bool,

        /// Write compact JSON instead of pretty-printed
        #[arg(long)]
        compact: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Merge {
            track_a,
            track_b,
            source,
            name,
            output_dir,
            api_key,
            model,
            offline,
            compact,
            no_color,
        } => {
            merge(
                track_a, track_b, source, name, output_dir, api_key, model, offline, compact,
                no_color,
            )
            .await
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn merge(
    track_a_path: PathBuf,
    track_b_path: PathBuf,
    source_path: PathBuf,
    name: Option<String>,
    output_dir: Option<PathBuf>,
    api_key: Option<String>,
    model: Option<String>,
    offline: bool,
    compact: bool,
    no_color: bool,
) -> anyhow::Result<()> {
    let config = load_config();

    // Resolve configuration: CLI flags > env vars > config file > defaults
    let api_key = api_key
        .or_else(|| std::env::var("GEMINI_API_KEY").ok())
        .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
        .or_else(|| config.api.as_ref().and_then(|a| a.gemini_api_key.clone()));
    let model_name = model
        .or_else(|| std::env::var("CONSENSUS_MODEL").ok())
        .or_else(|| config.api.as_ref().and_then(|a| a.consensus_model.clone()))
        .unwrap_or_else(|| "gemini-2.0-flash".to_string());
    let output_dir = output_dir
        .or_else(|| {
            config
                .output
                .as_ref()
                .and_then(|o| o.output_dir.clone())
                .map(PathBuf::from)
        })
        .unwrap_or_else(|| PathBuf::from("output"));
    let pretty = !compact
        && config
            .output
            .as_ref()
            .and_then(|o| o.pretty_json)
            .unwrap_or(true);

    let color = ColorMode(!no_color);
    let mut out: Box<dyn Write> = Box::new(std::io::stdout());
    let w = out.as_mut();

    let source_name = name.unwrap_or_else(|| {
        source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string())
    });

    print_banner(w, "Relatio: consensus merge")?;
    writeln!(w, "  SOURCE:      {}", source_path.display())?;
    writeln!(w, "  OUTPUT DIR:  {}\n", output_dir.display())?;

    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    let mut results: Vec<Vec<String>> = Vec::new();

    // Stage 1: inputs. The source text and Track A are required; Track B is
    // the optional secondary track and degrades to empty.
    print_step(w, 1, 3, "Loading inputs")?;
    let stage = Instant::now();

    let source_text = std::fs::read_to_string(&source_path)
        .with_context(|| format!("cannot read source text {}", source_path.display()))?;

    let track_a = load_track(&track_a_path)
        .with_context(|| format!("cannot read Track A output {}", track_a_path.display()))?;
    print_status(w, "Track A", &format!("{} references", track_a.len()), StageStatus::Done, color)?;

    let track_b = match load_track(&track_b_path) {
        Ok(refs) => {
            print_status(w, "Track B", &format!("{} references", refs.len()), StageStatus::Done, color)?;
            refs
        }
        Err(err) => {
            print_status(w, "Track B", "unavailable, continuing without it", StageStatus::Skip, color)?;
            warnings.push(format!("track B output unavailable: {err}"));
            Vec::new()
        }
    };
    results.push(stage_row("1. Inputs", stage, StageStatus::Done));

    // Stage 2: consensus merge.
    print_step(w, 2, 3, "Consensus merge")?;
    let stage = Instant::now();
    let outcome = run_merge(&track_a, &track_b, &source_text, api_key, &model_name, offline).await;
    match outcome.path {
        MergePath::Model => {
            print_status(
                w,
                "Consensus",
                &format!("{} merged entries ({})", outcome.references.len(), model_name),
                StageStatus::Done,
                color,
            )?;
        }
        MergePath::Rules => {
            let note = if offline {
                "rule-based merge (offline)"
            } else {
                "rule-based merge (model unavailable)"
            };
            if !offline {
                warnings.push("consensus model unavailable, used rule-based merge".to_string());
            }
            print_status(w, "Consensus", note, StageStatus::Warn, color)?;
        }
    }
    results.push(stage_row("2. Consensus", stage, StageStatus::Done));

    // Stage 3: final assembly and write-out.
    print_step(w, 3, 3, "Final assembly")?;
    let stage = Instant::now();
    let validation_status = if warnings.is_empty() {
        ValidationStatus::Completed
    } else {
        ValidationStatus::Partial
    };
    let final_output = assemble_final_output(
        &outcome.references,
        outcome.stats,
        AssemblyContext {
            source_text: &source_text,
            source_name: &source_name,
            consensus_model: &model_name,
            processing_time_seconds: start.elapsed().as_secs(),
            track_a_count: track_a.len(),
            track_b_count: track_b.len(),
            validation_status,
            warnings: warnings.clone(),
        },
    );

    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("cannot create output directory {}", output_dir.display()))?;
    let stem = Path::new(&source_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| source_name.clone());
    let out_path = output_dir.join(format!("{stem}_final.json"));
    let json = if pretty {
        serde_json::to_string_pretty(&final_output)?
    } else {
        serde_json::to_string(&final_output)?
    };
    std::fs::write(&out_path, json)
        .with_context(|| format!("cannot write {}", out_path.display()))?;
    print_status(w, "Final Output", &out_path.display().to_string(), StageStatus::Done, color)?;
    results.push(stage_row("3. Assembly", stage, StageStatus::Done));

    print_banner(w, "Execution summary")?;
    print_table(w, &["STAGE", "DURATION", "STATUS"], &results)?;
    writeln!(
        w,
        "      [ TOTAL TIME ]   : {}",
        format_duration(start.elapsed().as_secs())
    )?;
    writeln!(
        w,
        "      [ REFERENCES ]   : {}",
        final_output.references.len()
    )?;
    writeln!(w, "      [ FINAL JSON ]   : {}\n", out_path.display())?;

    Ok(())
}

/// Read one track's JSON payload and normalize it to candidate records.
fn load_track(path: &Path) -> anyhow::Result<Vec<relatio_core::CandidateRef>> {
    let raw = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&raw)?;
    Ok(records_from_value(&value))
}

async fn run_merge(
    track_a: &[relatio_core::CandidateRef],
    track_b: &[relatio_core::CandidateRef],
    source_text: &str,
    api_key: Option<String>,
    model_name: &str,
    offline: bool,
) -> MergeOutcome {
    if offline {
        return merge_with_rules(track_a, track_b, source_text);
    }
    let Some(api_key) = api_key else {
        tracing::warn!("no API key configured, falling back to rule-based merge");
        return merge_with_rules(track_a, track_b, source_text);
    };
    let model = GeminiModel::new(reqwest::Client::new(), api_key, model_name.to_string());
    merge_tracks(
        &model as &dyn ConsensusModel,
        track_a,
        track_b,
        source_text,
        &ConsensusConfig::default(),
    )
    .await
}

fn stage_row(name: &str, started: Instant, status: StageStatus) -> Vec<String> {
    let tag = match status {
        StageStatus::Done => "DONE",
        StageStatus::Skip => "SKIP",
        StageStatus::Warn => "WARN",
    };
    vec![
        name.to_string(),
        format!("{:.2}s", started.elapsed().as_secs_f64()),
        tag.to_string(),
    ]
}
