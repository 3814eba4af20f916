use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use flashgate::bench::{default_prompts, run_batch, HttpGenerationEngine, SamplingParams};
use flashgate::gate::{global, GateConfig};
use flashgate::logging;
use flashgate::tokenizer::dump_fast_tokenizer;
use flashgate::AllowList;

#[derive(Parser, Debug)]
#[command(name = "flashgate-cli", version)]
#[command(about = "Probe flash-attention support and drive the serving collaborators", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Probe the flash-attention backend; exits non-zero when it is unavailable
    Probe {
        /// Override the architecture allow-list, e.g. "8.x,9.0"
        #[arg(long)]
        allowed_archs: Option<String>,
        /// Device ordinal to probe
        #[arg(long)]
        device: Option<i32>,
        /// Backend library to try first
        #[arg(long)]
        backend_lib: Option<String>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Save a fast tokenizer as tokenizer.json
    DumpTokenizer {
        /// Hub identifier or local path of the tokenizer
        #[arg(long)]
        tokenizer_name: String,
        /// Output directory
        #[arg(long)]
        output: PathBuf,
        /// Hub revision
        #[arg(long)]
        revision: Option<String>,
    },
    /// Time one batch of generations against a running server
    Bench {
        /// Base URL of the text-generation server
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        host: String,
        /// Prompt to generate from (repeatable)
        #[arg(short, long)]
        prompt: Vec<String>,
        #[arg(long, default_value_t = 0.8)]
        temperature: f32,
        #[arg(long, default_value_t = 0.95)]
        top_p: f32,
        #[arg(long, default_value_t = 64)]
        max_new_tokens: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    logging::init_logging_default();
    let cli = Cli::parse();
    match cli.command {
        Commands::Probe {
            allowed_archs,
            device,
            backend_lib,
            json,
        } => probe(allowed_archs, device, backend_lib, json),
        Commands::DumpTokenizer {
            tokenizer_name,
            output,
            revision,
        } => {
            let path = dump_fast_tokenizer(&tokenizer_name, &output, revision.as_deref())?;
            println!("{}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Bench {
            host,
            prompt,
            temperature,
            top_p,
            max_new_tokens,
        } => {
            let prompts = if prompt.is_empty() {
                default_prompts()
            } else {
                prompt
            };
            let params = SamplingParams {
                temperature,
                top_p,
                max_new_tokens,
            };
            let engine = HttpGenerationEngine::new(&host)?;
            let report = run_batch(&engine, &prompts, &params).await?;
            println!("{}", report);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn probe(
    allowed_archs: Option<String>,
    device: Option<i32>,
    backend_lib: Option<String>,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let mut config = GateConfig::from_env()?;
    if let Some(archs) = allowed_archs {
        config = config.with_allow_list(archs.parse::<AllowList>()?);
    }
    if let Some(device) = device {
        config = config.with_device_ordinal(device);
    }
    if let Some(lib) = backend_lib {
        config.backend_libraries.insert(0, lib);
    }

    let result = global::init_with_config(config);
    let gate = global::gate()?;
    let report = gate.report();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("availability: {}", report.state);
        if let Some(hardware) = report.hardware {
            println!("hardware:     {}", hardware.sm_tag());
        }
    }

    match result {
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            eprintln!("ERROR: {}", e);
            if let Some(hint) = e.remediation() {
                eprintln!("hint: {}", hint);
            }
            Ok(ExitCode::FAILURE)
        }
    }
}
