//! ticketscan - Receipt capture and amount extraction pipeline
//!
//! Detects receipt-like documents in image frames, deskews them, hands the
//! result to a text recognizer and extracts the monetary amounts, with the
//! likely total ranked first.

mod capture;
mod config;
mod detect;
mod error;
mod extract;
mod geometry;
mod recognize;
mod rectify;
mod session;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use image::Rgba;
use imageproc::drawing::draw_line_segment_mut;
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::capture::{decode_constrained, CameraConstraints, FileSource};
use crate::config::{default_config_path, load_or_create_config, AppConfig};
use crate::detect::build_detector;
use crate::error::ScanError;
use crate::extract::{AmountAnalysis, AmountExtractor};
use crate::geometry::Quadrilateral;
use crate::recognize::build_recognizer;
use crate::rectify::Rectifier;
use crate::session::{ScanEvent, ScanSession};

/// ticketscan - Receipt capture and amount extraction
#[derive(Parser, Debug)]
#[command(name = "ticketscan")]
#[command(about = "Detects receipts in images and extracts the amounts on them")]
struct Args {
    /// Image file(s) to scan
    #[arg(short, long)]
    image: Vec<PathBuf>,

    /// Skip the vision pipeline and extract amounts from this text
    #[arg(long)]
    text: Option<String>,

    /// Recognizer confidence assumed for --text input (0.0 - 1.0)
    #[arg(long, default_value = "0.9")]
    base_confidence: f32,

    /// Write a detection preview (first image with the boundary drawn)
    #[arg(long)]
    preview: Option<PathBuf>,

    /// Config file path (defaults to the per-user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Serialize)]
struct CaptureReport {
    image: String,
    capture_id: Option<String>,
    detected: bool,
    detection_confidence: f32,
    rectified: bool,
    recognition_failed: bool,
    analysis: Option<AmountAnalysis>,
}

fn main() -> Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => default_config_path()?,
    };
    let config = load_or_create_config(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    // Text-only mode: amount extraction without the vision pipeline.
    if let Some(text) = &args.text {
        let extractor = AmountExtractor::new(config.extractor.clone());
        let analysis = extractor.analyze(text, args.base_confidence.clamp(0.0, 1.0));
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        return Ok(());
    }

    if args.image.is_empty() {
        bail!("no input: pass at least one --image, or use --text");
    }

    run_scan(&args, &config)
}

fn run_scan(args: &Args, config: &AppConfig) -> Result<()> {
    let mut session = ScanSession::new(
        Box::new(FileSource::new(args.image.clone())),
        build_detector(&config.detector),
        Rectifier::new(config.rectifier.clone()),
        build_recognizer(&config.recognizer)?,
        AmountExtractor::new(config.extractor.clone()),
        config.camera.clone(),
        config.session.clone(),
    );
    let events = session.events();

    session.start()?;

    let mut reports = Vec::with_capacity(args.image.len());
    let mut preview_quad: Option<Quadrilateral> = None;

    // One tick and capture attempt per input image; the file source
    // advances on every frame pull.
    for path in &args.image {
        let detection = session.tick()?;
        if preview_quad.is_none() {
            preview_quad = detection.quad;
        }

        if !detection.found {
            info!("No document found in {}", path.display());
            reports.push(CaptureReport {
                image: path.display().to_string(),
                capture_id: None,
                detected: false,
                detection_confidence: detection.confidence,
                rectified: false,
                recognition_failed: false,
                analysis: None,
            });
            continue;
        }

        match session.capture() {
            Ok(outcome) => {
                reports.push(CaptureReport {
                    image: path.display().to_string(),
                    capture_id: Some(outcome.capture_id.to_string()),
                    detected: true,
                    detection_confidence: detection.confidence,
                    rectified: outcome.rectified.rectified,
                    recognition_failed: outcome.recognition_failed,
                    analysis: Some(outcome.analysis),
                });
            }
            Err(ScanError::NoDocumentDetected) => {
                warn!("Capture refused for {}: detection went stale", path.display());
                reports.push(CaptureReport {
                    image: path.display().to_string(),
                    capture_id: None,
                    detected: true,
                    detection_confidence: detection.confidence,
                    rectified: false,
                    recognition_failed: false,
                    analysis: None,
                });
            }
            Err(e) => return Err(e.into()),
        }
    }

    session.stop();

    for event in events.try_iter() {
        debug!("Session event: {event:?}");
        if let ScanEvent::HelpPrompt = event {
            info!("Hint: fill more of the frame with the receipt and avoid glare");
        }
    }

    if let Some(preview_path) = &args.preview {
        match preview_quad {
            Some(quad) => {
                write_preview(&args.image[0], &quad, preview_path, &config.camera)?;
                info!("Preview written to {}", preview_path.display());
            }
            None => warn!("No detection to preview"),
        }
    }

    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}

/// Draw the detected boundary on the source image. The image is decoded
/// with the same constraints as the scan so the coordinates line up.
fn write_preview(
    image_path: &PathBuf,
    quad: &Quadrilateral,
    out: &PathBuf,
    constraints: &CameraConstraints,
) -> Result<()> {
    let mut canvas = decode_constrained(image_path, constraints)?;

    let corners = quad.ordered().corners;
    for i in 0..4 {
        let a = corners[i];
        let b = corners[(i + 1) % 4];
        draw_line_segment_mut(&mut canvas, (a.x, a.y), (b.x, b.y), Rgba([0, 255, 0, 255]));
    }

    canvas
        .save(out)
        .with_context(|| format!("failed to write {}", out.display()))?;
    Ok(())
}
