use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::SourceConfig;

const USER_AGENT: &str = concat!("idle-update/", env!("CARGO_PKG_VERSION"));

/// File name the artifact is saved under
pub fn artifact_name(source: &SourceConfig) -> Result<String> {
    if let Some(name) = &source.artifact_name {
        return Ok(name.clone());
    }

    let url = reqwest::Url::parse(&source.url)
        .with_context(|| format!("Invalid source url: {}", source.url))?;

    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Cannot derive artifact name from {}", source.url))
}

/// Download the artifact into `dest_dir`, retrying any failure up to
/// `source.retries` more times with the same URL.
pub fn fetch(source: &SourceConfig, dest_dir: &Path) -> Result<PathBuf> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(source.timeout_secs))
        .build()?;

    let dest = dest_dir.join(artifact_name(source)?);
    let attempts = source.retries.saturating_add(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match download_once(&client, &source.url, &dest) {
            Ok(bytes) => {
                log::info!("Downloaded {} ({} bytes)", dest.display(), bytes);
                return Ok(dest);
            }
            Err(e) => {
                log::warn!("Download attempt {}/{} failed: {:#}", attempt, attempts, e);
                last_error = Some(e);
                if attempt < attempts {
                    std::thread::sleep(Duration::from_secs(source.retry_delay_secs));
                }
            }
        }
    }

    let err = last_error.unwrap_or_else(|| anyhow!("no download attempt was made"));
    Err(err.context(format!(
        "Failed to download {} after {} attempts",
        source.url, attempts
    )))
}

fn download_once(client: &Client, url: &str, dest: &Path) -> Result<u64> {
    let mut response = client.get(url).send().context("Request failed")?;

    if !response.status().is_success() {
        return Err(anyhow!("Download failed: {}", response.status()));
    }

    let pb = match response.content_length() {
        Some(total) => {
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")?
                    .progress_chars("#>-"),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let mut file = File::create(dest)
        .with_context(|| format!("Failed to create {}", dest.display()))?;
    let mut downloaded: u64 = 0;
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = response.read(&mut buffer).context("Connection interrupted")?;
        if bytes_read == 0 {
            break;
        }
        file.write_all(&buffer[..bytes_read])?;
        downloaded += bytes_read as u64;
        pb.set_position(downloaded);
    }

    file.flush()?;
    pb.finish_and_clear();
    Ok(downloaded)
}
