use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use auramed_core::embeddings::{download::ensure_minilm_model, load_default};
use auramed_core::generation::instructions::{clinical_plan_payload, soap_note_payload};
use auramed_core::types::patient_documents;
use auramed_core::{
    AuraConfig, ClinicSession, ClinicalInstruction, GenerationClient, PatientRecord,
    RetrievalIndex,
};

const NO_MATCHES_MESSAGE: &str = "Nenhum paciente encontrado com esses critérios.";

#[derive(Parser)]
#[command(name = "auramed", about = "Semantic patient search and clinical note assistant")]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rank patients by similarity to a free-text query
    Search {
        query: String,
        /// JSON array of patient records (defaults to the demo clinic)
        #[arg(long)]
        patients: Option<PathBuf>,
    },
    /// Ask a quick clinical question
    Consult { question: String },
    /// Symptom triage for a patient message
    Triage { message: String },
    /// Turn raw consultation notes into a SOAP note ("-" reads stdin)
    Soap { notes: PathBuf },
    /// Clinical plan for one patient
    Plan {
        patient_id: u64,
        #[arg(long)]
        patients: Option<PathBuf>,
    },
    /// Fetch all-MiniLM-L6-v2 into the configured model directory
    DownloadModel,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Search { query, patients } => {
            let patients = load_patients(patients.as_deref())?;
            search(&config, &query, &patients)?;
        }
        Command::Consult { question } => {
            let client = GenerationClient::from_config(config.generation)?;
            let text = client
                .generate_for(ClinicalInstruction::QuickConsult, &question)
                .await;
            println!("{}", text);
        }
        Command::Triage { message } => {
            let client = GenerationClient::from_config(config.generation)?;
            println!("{}", client.generate_for(ClinicalInstruction::Triage, &message).await);
        }
        Command::Soap { notes } => {
            let raw_notes = read_notes(&notes)?;
            let client = GenerationClient::from_config(config.generation)?;
            let text = client
                .generate_for(ClinicalInstruction::SoapNote, &soap_note_payload(&raw_notes))
                .await;
            println!("{}", text);
        }
        Command::Plan {
            patient_id,
            patients,
        } => {
            let patients = load_patients(patients.as_deref())?;
            let patient = patients
                .iter()
                .find(|p| p.id == patient_id)
                .with_context(|| format!("No patient with id {}", patient_id))?;
            let client = GenerationClient::from_config(config.generation)?;
            let text = client
                .generate_for(
                    ClinicalInstruction::ClinicalPlan,
                    &clinical_plan_payload(patient),
                )
                .await;
            println!("{}", text);
        }
        Command::DownloadModel => {
            let dir = ensure_minilm_model(&config.embedding.model_dir).await?;
            println!("Model ready at {}", dir.display());
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<AuraConfig> {
    let config = match path {
        Some(path) => AuraConfig::from_file(path).map_err(anyhow::Error::msg)?,
        None => AuraConfig::default(),
    };
    let config = config.with_env_overrides();
    config.validate().map_err(anyhow::Error::msg)?;
    Ok(config)
}

fn load_patients(path: Option<&Path>) -> Result<Vec<PatientRecord>> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read patients file {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse patients file {}", path.display()))
        }
        None => Ok(ClinicSession::demo().patients().to_vec()),
    }
}

fn read_notes(source: &Path) -> Result<String> {
    if source == Path::new("-") {
        let mut notes = String::new();
        std::io::stdin()
            .read_to_string(&mut notes)
            .context("Failed to read notes from stdin")?;
        Ok(notes)
    } else {
        std::fs::read_to_string(source)
            .with_context(|| format!("Failed to read notes file {}", source.display()))
    }
}

fn search(config: &AuraConfig, query: &str, patients: &[PatientRecord]) -> Result<()> {
    let index = match load_default(&config.embedding) {
        Ok(model) => RetrievalIndex::new(model, config.search.clone()),
        Err(e) => {
            tracing::warn!(error = %e, "Embedding model not loaded");
            RetrievalIndex::unloaded(config.search.clone())
        }
    };

    let results = index.search_scored(query, &patient_documents(patients))?;
    if results.is_empty() {
        println!("{}", NO_MATCHES_MESSAGE);
        return Ok(());
    }
    for result in results {
        println!("{} ({:.3})", result.document.name, result.score);
    }
    Ok(())
}
