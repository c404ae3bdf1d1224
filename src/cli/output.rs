//! Output formatting and progress display

use crate::cli::args::VerbosityLevel;
use crate::core::video_info::{LiveEndpoint, PlayableEntry, Resolution, VideoInfo};
use crate::platform::formats::{lookup, select};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Output formatter for ytresolve
pub struct OutputFormatter {
    verbosity: VerbosityLevel,
    spinner: Option<ProgressBar>,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            spinner: None,
        }
    }

    /// Show a spinner while a video resolves
    pub fn start_spinner(&mut self, message: &str) {
        if self.verbosity != VerbosityLevel::Normal {
            return;
        }

        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));
        self.spinner = Some(spinner);
    }

    /// Clear the spinner, if any
    pub fn finish_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    /// Print error message
    pub fn error(&self, message: &str) {
        eprintln!("❌ {}", message);
    }

    /// Print the full catalog, marking the default selection
    pub fn print_listing(&self, video: &VideoInfo) {
        let default_id = select(&video.catalog, None).ok().map(|entry| entry.id.clone());

        println!("📹 {} [{}]", video.title.bold(), video.id);
        if !video.catalog.progressive.is_empty() {
            println!("{}", "Progressive streams:".bold());
            for entry in &video.catalog.progressive {
                self.print_entry(entry, default_id.as_deref());
            }
        }
        if !video.catalog.adaptive.is_empty() {
            println!("{}", "Adaptive streams:".bold());
            for entry in &video.catalog.adaptive {
                self.print_entry(entry, default_id.as_deref());
            }
        }
        if !video.captions.is_empty() {
            let languages: Vec<&str> = video
                .captions
                .iter()
                .map(|c| c.language_code.as_str())
                .collect();
            println!("💬 Captions: {}", languages.join(", "));
        }
    }

    fn print_entry(&self, entry: &PlayableEntry, default_id: Option<&str>) {
        let line = entry_line(entry);
        if default_id == Some(entry.id.as_str()) {
            println!("  {} {}", line.green().bold(), "(default)".dimmed());
        } else {
            println!("  {}", line);
        }
    }

    /// Print the selected entry and its request URLs
    pub fn print_selection(&self, video: &VideoInfo, entry: &PlayableEntry) {
        if self.verbosity != VerbosityLevel::Quiet {
            println!("📹 {}", video.title.bold());
            println!("🎯 {}", entry_line(entry));
            println!("🔗 {} request(s)", entry.request_count());
        }
        self.print_urls(entry);
    }

    /// Print every request URL of an entry, one per line
    pub fn print_urls(&self, entry: &PlayableEntry) {
        for url in entry.urls() {
            println!("{}", url);
        }
    }

    /// Print a live endpoint
    pub fn print_live(&self, endpoint: &LiveEndpoint, url_only: bool) {
        if !url_only && self.verbosity != VerbosityLevel::Quiet {
            println!("🔴 {} is live", endpoint.title.bold());
        }
        println!("{}", endpoint.url);
    }

    /// Print a resolution as pretty JSON
    pub fn print_json(&self, resolution: &Resolution) -> Result<(), serde_json::Error> {
        println!("{}", serde_json::to_string_pretty(resolution)?);
        Ok(())
    }
}

/// One-line summary of an entry: id, container, quality, size
pub fn entry_line(entry: &PlayableEntry) -> String {
    let quality = if entry.quality.is_empty() {
        lookup(&entry.id).map(|t| t.resolution).unwrap_or("-").to_string()
    } else {
        entry.quality.clone()
    };
    let size = entry
        .size
        .map(format_bytes)
        .unwrap_or_else(|| "unknown size".to_string());
    format!("itag={:<4} | {:<5} | {} | {}", entry.id, entry.container, quality, size)
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f64 = bytes as f64;
    let exp = (bytes_f64.ln() / THRESHOLD.ln()).floor() as usize;
    let exp = exp.min(UNITS.len() - 1);

    let value = bytes_f64 / THRESHOLD.powi(exp as i32);

    if exp == 0 {
        format!("{} {}", bytes, UNITS[exp])
    } else {
        format!("{:.1} {}", value, UNITS[exp])
    }
}
