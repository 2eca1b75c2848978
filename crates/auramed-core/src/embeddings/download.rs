//! Fetch the sentence encoder from HuggingFace on first run.
//!
//! sentence-transformers/all-MiniLM-L6-v2 (onnx/model.onnx, ~90 MB, Apache 2.0)

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

const HF_BASE: &str = "https://huggingface.co";

pub const MINILM_REPO: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const MINILM_DIR: &str = "all-MiniLM-L6-v2";

/// Model file descriptor: (relative_url_path, local_filename, expected_min_bytes)
struct ModelFile {
    url_path: &'static str,
    local_name: &'static str,
    min_bytes: u64,
}

const MINILM_FILES: &[ModelFile] = &[
    ModelFile {
        url_path: "onnx/model.onnx",
        local_name: "model.onnx",
        min_bytes: 10_000_000,
    },
    ModelFile {
        url_path: "tokenizer.json",
        local_name: "tokenizer.json",
        min_bytes: 1_000,
    },
];

/// Ensure the MiniLM encoder is present under `model_dir`, downloading what is missing.
/// Returns the model directory path.
pub async fn ensure_minilm_model(model_dir: &Path) -> Result<PathBuf> {
    let target_dir = model_dir.join(MINILM_DIR);
    ensure_model_files(&target_dir, MINILM_REPO, MINILM_FILES, HF_BASE).await?;
    Ok(target_dir)
}

/// Files that are absent or smaller than their expected size (corrupt download).
fn missing_files<'a>(target_dir: &Path, files: &'a [ModelFile]) -> Vec<&'a ModelFile> {
    files
        .iter()
        .filter(|f| match target_dir.join(f.local_name).metadata() {
            Ok(meta) => meta.len() < f.min_bytes,
            Err(_) => true,
        })
        .collect()
}

async fn ensure_model_files(
    target_dir: &Path,
    repo: &str,
    files: &[ModelFile],
    base_url: &str,
) -> Result<()> {
    let missing = missing_files(target_dir, files);
    if missing.is_empty() {
        return Ok(());
    }

    tracing::info!(
        repo,
        missing_files = missing.len(),
        dir = %target_dir.display(),
        "Downloading embedding model files"
    );

    tokio::fs::create_dir_all(target_dir).await.map_err(|e| {
        anyhow!(
            "Failed to create model directory {}: {}",
            target_dir.display(),
            e
        )
    })?;

    let client = reqwest::Client::builder()
        .user_agent("auramed/0.1")
        .timeout(Duration::from_secs(600))
        .connect_timeout(Duration::from_secs(30))
        .build()
        .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

    for file in &missing {
        let url = format!("{}/{}/resolve/main/{}", base_url, repo, file.url_path);
        let dest = target_dir.join(file.local_name);
        download_with_retry(&client, &url, &dest, file.local_name).await?;
    }

    tracing::info!(repo, "All model files downloaded");
    Ok(())
}

async fn download_with_retry(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    filename: &str,
) -> Result<()> {
    let max_retries = 3u32;
    let mut last_error = None;

    for attempt in 1..=max_retries {
        match download_streaming(client, url, dest, filename).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                last_error = Some(e);
                if attempt < max_retries {
                    let backoff = Duration::from_secs(2u64.pow(attempt));
                    tracing::warn!(
                        file = filename,
                        attempt,
                        "Download failed, retrying in {:?}",
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    let _ = tokio::fs::remove_file(dest.with_extension("downloading")).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow!("Download failed after {} retries", max_retries)))
}

/// Stream to `<dest>.downloading`, then rename into place.
async fn download_streaming(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    filename: &str,
) -> Result<()> {
    use futures_util::StreamExt;
    use tokio::io::AsyncWriteExt;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| anyhow!("HTTP request failed for {}: {}", filename, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(anyhow!("HTTP {} downloading {} from {}", status, filename, url));
    }

    let total_size = response.content_length().unwrap_or(0);
    tracing::info!(
        file = filename,
        size_mb = format!("{:.1}", total_size as f64 / 1_048_576.0),
        "Downloading"
    );

    let tmp_dest = dest.with_extension("downloading");
    let mut file = tokio::fs::File::create(&tmp_dest)
        .await
        .map_err(|e| anyhow!("Failed to create {}: {}", tmp_dest.display(), e))?;

    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;
    let mut last_log_pct: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| anyhow!("Stream error downloading {}: {}", filename, e))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| anyhow!("Write error for {}: {}", filename, e))?;
        downloaded += chunk.len() as u64;

        if total_size > 0 {
            let pct = (downloaded * 100) / total_size;
            if pct >= last_log_pct + 25 {
                last_log_pct = pct - (pct % 25);
                tracing::info!(
                    file = filename,
                    progress = format!("{}%", last_log_pct),
                    "Download progress"
                );
            }
        }
    }

    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp_dest, dest)
        .await
        .map_err(|e| anyhow!("Failed to finalize {}: {}", filename, e))?;

    tracing::info!(
        file = filename,
        size_mb = format!("{:.1}", downloaded as f64 / 1_048_576.0),
        "Download complete"
    );
    Ok(())
}
