//! `hlscube process`: fetch, reproject and merge scenes for an ROI.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use hlscube::orchestrator::ProgressCallback;
use hlscube::{ConfigFile, FailurePolicy, FetchProgress, HlsProcessor, MergedDataset};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use super::common::{read_records, read_roi};
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct ProcessArgs {
    /// GeoJSON Polygon (geometry or Feature) describing the ROI
    #[arg(long, value_name = "PATH")]
    pub roi: PathBuf,

    /// JSON array of scene records
    #[arg(long, value_name = "PATH")]
    pub scenes: PathBuf,

    /// Concurrent downloads
    #[arg(long)]
    pub workers: Option<usize>,

    /// Abort on the first tile that cannot be produced
    #[arg(long)]
    pub strict: bool,

    /// Limit for the whole fetch phase in seconds (0 disables)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Earthdata Login bearer token (defaults to $EDL_TOKEN)
    #[arg(long)]
    pub token: Option<String>,
}

pub async fn run(args: ProcessArgs, config: ConfigFile) -> Result<(), CliError> {
    let mut pipeline = config.pipeline;
    if let Some(workers) = args.workers {
        pipeline = pipeline.with_workers(workers);
    }
    if args.strict {
        pipeline = pipeline.with_failure_policy(FailurePolicy::Strict);
    }
    if let Some(secs) = args.timeout {
        pipeline = pipeline.with_run_timeout((secs > 0).then(|| Duration::from_secs(secs)));
    }

    let roi = read_roi(&args.roi, pipeline.max_area_km2)?;
    let records = read_records(&args.scenes)?;
    println!(
        "ROI {} in {} ({:.2} km²), {} records, {} workers, {}",
        roi.id(),
        roi.crs(),
        roi.area_km2(),
        records.len(),
        pipeline.workers,
        pipeline.failure_policy
    );

    let processor = HlsProcessor::new(roi, args.token, pipeline)?;

    let bar = progress_bar(records.len());
    let callback: ProgressCallback = {
        let bar = bar.clone();
        Arc::new(move |p: FetchProgress| {
            bar.set_position(p.finished() as u64);
            bar.set_message(format!("{} ok, {} failed, {} skipped", p.completed, p.failed, p.skipped));
        })
    };

    let result = processor.process(&records, Some(callback)).await;
    bar.finish_and_clear();

    match result? {
        Some(dataset) => print_summary(&dataset),
        None => println!("No tile could be fetched; nothing to merge."),
    }
    Ok(())
}

fn progress_bar(total: usize) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    if let Ok(style) = ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} tiles {msg}") {
        bar.set_style(style.progress_chars("=> "));
    }
    bar
}

fn print_summary(dataset: &MergedDataset) {
    let (steps, height, width) = dataset.shape();
    let bands: Vec<String> = dataset.bands.keys().map(|b| b.to_string()).collect();

    info!(time_steps = steps, height, width, "Dataset ready");
    println!("Merged dataset");
    println!("  Bands:      {}", bands.join(", "));
    match (dataset.time.first(), dataset.time.last()) {
        (Some(first), Some(last)) => println!(
            "  Time steps: {} ({} .. {})",
            steps,
            first.format("%Y-%m-%d"),
            last.format("%Y-%m-%d")
        ),
        _ => println!("  Time steps: 0"),
    }
    println!(
        "  Grid:       {} x {} at {} m",
        width, height, dataset.pixel_size.x
    );
    println!("  CRS:        {}", dataset.crs);
    if let Some(legend) = dataset.attrs.get("sat_ids") {
        println!("  Satellites: {}", legend);
    } else if let Some(satellite) = dataset.attrs.get("satellite") {
        println!("  Satellite:  {}", satellite);
    }
}
