//! # aitag
//!
//! Command-line front end for the `aitag` library. The default command tags
//! one image and prints the tag string; subcommands download models, list
//! local models, extract dominant colors and read generation metadata.
//!
//! Results go to stdout. On failure a single `Error: <message>` line is
//! printed to stdout and the process exits with status 1.

mod args;
mod logging;

use std::{path::PathBuf, process::ExitCode};

use aitag::{
    colors,
    config::{TaggingConfig, DEFAULT_MODEL},
    download::ModelDownloader,
    file::{self, ModelFiles},
    metadata,
    pipeline::TaggingPipeline,
    tagger::Backend,
};
use anyhow::{bail, Context, Result};
use args::{Args, Commands, TagArgs};
use clap::{error::ErrorKind, Parser};
use itertools::Itertools;

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            println!("Error: {}", usage_error(&e));
            return ExitCode::FAILURE;
        }
    };
    logging::init(args.verbose);

    match run(args).await {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            println!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// First line of a clap error, without its `error: ` prefix.
fn usage_error(e: &clap::Error) -> String {
    let rendered = e.render().to_string();
    let first = rendered.lines().next().unwrap_or_default().trim();
    first.strip_prefix("error: ").unwrap_or(first).to_string()
}

async fn run(args: Args) -> Result<String> {
    match args.command {
        None => run_tag(args.tag).await,
        Some(Commands::Download {
            model,
            dir,
            base_url,
        }) => run_download(model, dir, base_url).await,
        Some(Commands::Colors { image, count }) => {
            let colors = colors::dominant_colors_from_path(&image, count)?;
            Ok(serde_json::to_string_pretty(&colors)?)
        }
        Some(Commands::Metadata { image }) => {
            let metadata = metadata::read_generation_metadata(&image)?;
            Ok(serde_json::to_string_pretty(&metadata)?)
        }
        Some(Commands::Models { dir }) => {
            let models = file::available_models(&dir)
                .with_context(|| format!("cannot list models in {}", dir.display()))?;
            Ok(models.join("\n"))
        }
    }
}

/// Builds the tagging options: config file first, then flags on top.
fn tagging_config(args: &TagArgs) -> Result<TaggingConfig> {
    let mut config = match &args.config {
        Some(path) => TaggingConfig::load(path)?,
        None => TaggingConfig::default(),
    };
    if let Some(model) = &args.model {
        config = config.with_model(model.as_str());
    }
    let general_threshold = args.threshold.unwrap_or(config.general_threshold);
    let character_threshold = args
        .character_threshold
        .unwrap_or(config.character_threshold);
    config = config.with_thresholds(general_threshold, character_threshold);
    if let Some(exclude) = &args.exclude {
        config = config.with_exclusions(exclude);
    }
    if args.replace_underscore {
        config = config.with_replace_underscore(true);
    }
    if args.trailing_comma {
        config = config.with_trailing_comma(true);
    }
    config.validate()?;
    Ok(config)
}

async fn run_tag(args: TagArgs) -> Result<String> {
    let Some(image) = args.image.clone() else {
        bail!("no image given, see `aitag --help`");
    };
    let config = tagging_config(&args)?;
    let backends = if args.backend.is_empty() {
        Backend::default_preferences()
    } else {
        args.backend.clone()
    };
    tracing::debug!(?config, backends = %backends.iter().join(","), "tagging");

    let models_dir = args.models_dir();
    let json = args.json;
    // Session creation and inference are blocking.
    let result = tokio::task::spawn_blocking(move || {
        let mut pipeline = TaggingPipeline::load(&models_dir, config, &backends)?;
        tracing::info!(backend = %pipeline.model.backend(), "model loaded");
        pipeline.predict_path(&image)
    })
    .await??;

    if json {
        Ok(serde_json::to_string_pretty(&result)?)
    } else {
        Ok(result.text)
    }
}

async fn run_download(
    model: Option<String>,
    dir: PathBuf,
    base_url: Option<String>,
) -> Result<String> {
    let dir = file::ensure_dir(&dir)?;
    let model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let downloader = match base_url {
        Some(url) => ModelDownloader::new(&url)?,
        None => ModelDownloader::for_current_region().await?,
    }
    .with_progress(true);
    tracing::info!(%model, source = downloader.base_url(), "downloading");

    let paths = downloader
        .download_model(&ModelFiles::new(&dir, &model))
        .await
        .with_context(|| format!("failed to download model '{}'", model))?;
    Ok(paths.iter().map(|p| p.display()).join("\n"))
}
