// Streamkeep - offline playback core for mobile video clients
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use streamkeep_core::api::ApiClient;
use streamkeep_core::config::RewriterConfig;
use streamkeep_core::manifest::playlist::{rewrite_master, subtitle_playlist};
use streamkeep_core::manifest::scheme::path_extension;
use streamkeep_core::manifest::{LoaderResponse, ManifestRewriter, SchemeMapper};
use streamkeep_core::models::{ContentId, MediaDescriptor, Subtitle};
use streamkeep_core::storage::OfflineCatalog;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "streamkeep-cli")]
#[command(about = "Streamkeep CLI - Desktop testing tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inject subtitle tracks into a local master playlist
    Rewrite {
        /// Master playlist file
        playlist: PathBuf,
        /// Subtitle track as LANG=URL (repeatable)
        #[arg(short, long = "subtitle")]
        subtitles: Vec<String>,
    },
    /// Fetch a master playlist the way the player would see it
    Fetch {
        /// Real (https) URL of the master playlist
        url: String,
        /// Subtitle track as LANG=URL (repeatable)
        #[arg(short, long = "subtitle")]
        subtitles: Vec<String>,
    },
    /// Print the synthesized playlist for a subtitle file
    SubtitlePlaylist {
        /// Subtitle file URL
        url: String,
        /// Asset duration in seconds
        #[arg(short, long)]
        duration: f64,
    },
    /// List a catalog snapshot
    Catalog {
        /// Catalog JSON file
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Rewrite { playlist, subtitles } => {
            let text = tokio::fs::read_to_string(&playlist)
                .await
                .with_context(|| format!("Failed to read {}", playlist.display()))?;
            let subtitles = parse_subtitles(&subtitles)?;
            let mapper = SchemeMapper::new(RewriterConfig::default());
            print!("{}", rewrite_master(&text, &subtitles, &mapper)?);
        }
        Commands::Fetch { url, subtitles } => {
            let media = MediaDescriptor::new(ContentId(0), "cli", 0.0, url).with_subtitles(parse_subtitles(&subtitles)?);
            let client = Arc::new(ApiClient::new()?);
            let rewriter = ManifestRewriter::new(RewriterConfig::default(), client);

            let player_url = rewriter.player_url(&media)?;
            eprintln!("Player URL: {}", player_url);
            match rewriter.handle(&player_url, &media).await? {
                LoaderResponse::Data { body, .. } => print!("{}", String::from_utf8_lossy(&body)),
                LoaderResponse::Redirect { status, location } => println!("{} -> {}", status, location),
            }
        }
        Commands::SubtitlePlaylist { url, duration } => {
            if duration < 0.0 {
                bail!("Duration must not be negative");
            }
            print!("{}", subtitle_playlist(&url, duration));
        }
        Commands::Catalog { path } => {
            let catalog = OfflineCatalog::open(&path).await;
            if catalog.is_empty() {
                println!("No downloads recorded in {}", path.display());
            }
            for entry in catalog.entries() {
                println!(
                    "{:>10}  {:<8}  {:>3} episodes  {}  {}",
                    entry.id,
                    format!("{:?}", entry.kind).to_lowercase(),
                    entry.episode_ids.len(),
                    entry.created_at.format("%Y-%m-%d %H:%M"),
                    entry.title
                );
            }
        }
    }

    Ok(())
}

/// Parse `LANG=URL` pairs; the format comes from the URL's extension
fn parse_subtitles(args: &[String]) -> anyhow::Result<Vec<Subtitle>> {
    args.iter()
        .map(|arg| {
            let (language, url) = arg
                .split_once('=')
                .with_context(|| format!("Expected LANG=URL, got {}", arg))?;
            let format = path_extension(url).with_context(|| format!("No file extension in {}", url))?;
            Ok(Subtitle::new(language, format, url))
        })
        .collect()
}
