//! rdtscan CLI — grade and read rapid diagnostic test strips in still images.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use rdtscan::{
    builtin_template, synthetic, Frame, FrameProcessor, PipelineOutcome, ReferenceTemplate,
    ScanConfig, StripGeometry, TemplateBuildConfig,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "rdtscan")]
#[command(about = "Locate, quality-gate and read rapid diagnostic test strips in images")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the per-frame pipeline on one image.
    Scan(CliScanArgs),

    /// Build a reference template from a canonical strip image.
    BuildTemplate(CliBuildTemplateArgs),

    /// Print a template summary.
    TemplateInfo {
        /// Template JSON; the built-in template when omitted.
        #[arg(long)]
        template: Option<PathBuf>,
    },

    /// Print or write the default scan configuration.
    DefaultConfig {
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Render a synthetic frame containing the built-in strip.
    Synth(CliSynthArgs),
}

#[derive(Debug, Clone, Args)]
struct CliScanArgs {
    /// Path to the input image.
    #[arg(long)]
    image: PathBuf,

    /// Template JSON; the built-in template when omitted.
    #[arg(long)]
    template: Option<PathBuf>,

    /// Scan configuration JSON; missing fields keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to write the outcome record (JSON). Printed to stdout when omitted.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Write the rectified strip (PNG) when the frame is decoded.
    #[arg(long)]
    rectified: Option<PathBuf>,

    /// Write the rectified result window (PNG) when the frame is decoded.
    #[arg(long)]
    window: Option<PathBuf>,

    /// Embed PNG-encoded rectified images in the JSON record.
    #[arg(long)]
    embed_images: bool,

    /// Platform brightness reading to attach to the frame.
    #[arg(long)]
    brightness_hint: Option<f32>,
}

#[derive(Debug, Clone, Args)]
struct CliBuildTemplateArgs {
    /// Canonical strip image; its size must match the geometry.
    #[arg(long)]
    image: PathBuf,

    /// Strip geometry JSON; the default geometry when omitted.
    #[arg(long)]
    geometry: Option<PathBuf>,

    /// Template name stored in the file.
    #[arg(long, default_value = "custom")]
    name: String,

    /// Path to write the template (JSON).
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Clone, Args)]
struct CliSynthArgs {
    /// Path to write the frame (PNG).
    #[arg(long)]
    out: PathBuf,

    #[arg(long, default_value = "640")]
    width: u32,

    #[arg(long, default_value = "480")]
    height: u32,

    /// Strip scale relative to its canonical size.
    #[arg(long, default_value = "1.0")]
    scale: f64,

    /// Strip rotation in degrees, positive clockwise.
    #[arg(long, default_value = "0.0")]
    angle: f64,

    /// Visible lines as three characters (control, test A, test B), e.g. "101".
    #[arg(long, default_value = "100")]
    lines: String,
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Scan(args) => run_scan(&args),
        Commands::BuildTemplate(args) => run_build_template(&args),
        Commands::TemplateInfo { template } => run_template_info(template.as_deref()),
        Commands::DefaultConfig { out } => run_default_config(out.as_deref()),
        Commands::Synth(args) => run_synth(&args),
    }
}

fn load_template(path: Option<&Path>) -> CliResult<ReferenceTemplate> {
    match path {
        Some(p) => {
            tracing::info!("Loading template: {}", p.display());
            ReferenceTemplate::from_json_file(p).map_err(|e| -> CliError {
                format!("Failed to load template {}: {}", p.display(), e).into()
            })
        }
        None => Ok(builtin_template()?),
    }
}

// ── template-info ──────────────────────────────────────────────────────

fn run_template_info(path: Option<&Path>) -> CliResult<()> {
    let t = load_template(path)?;
    let g = t.geometry();

    println!("rdtscan reference template");
    println!("  name:           {}", t.name());
    println!("  strip size:     {}x{} px", g.width, g.height);
    println!(
        "  result window:  x={} y={} {}x{}",
        g.result_window.x, g.result_window.y, g.result_window.width, g.result_window.height
    );
    for (label, line) in ["control", "test A", "test B"].iter().zip(g.lines()) {
        println!(
            "  {:<15} x={:.1} ±{:.1}  y=[{:.1}, {:.1}]",
            format!("{label}:"),
            line.center_x,
            line.half_width,
            line.y_span[0],
            line.y_span[1]
        );
    }
    println!("  scales:         {:?}", t.scales());
    println!("  keypoints:      {}", t.n_keypoints());

    Ok(())
}

// ── default-config ─────────────────────────────────────────────────────

fn run_default_config(out: Option<&Path>) -> CliResult<()> {
    let cfg = ScanConfig::default();
    match out {
        Some(p) => {
            cfg.to_json_file(p)?;
            tracing::info!("Default config written to {}", p.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&cfg)?),
    }
    Ok(())
}

// ── build-template ─────────────────────────────────────────────────────

fn run_build_template(args: &CliBuildTemplateArgs) -> CliResult<()> {
    let geometry = match &args.geometry {
        Some(p) => {
            let data = std::fs::read_to_string(p)?;
            serde_json::from_str::<StripGeometry>(&data).map_err(|e| -> CliError {
                format!("Invalid geometry {}: {}", p.display(), e).into()
            })?
        }
        None => StripGeometry::default(),
    };

    let img = image::open(&args.image).map_err(|e| -> CliError {
        format!("Failed to open image {}: {}", args.image.display(), e).into()
    })?;
    let gray = img.to_luma8();

    let template =
        ReferenceTemplate::build(&args.name, &gray, geometry, &TemplateBuildConfig::default())?;
    template.to_json_file(&args.out)?;

    tracing::info!(
        "Template '{}' with {} keypoints written to {}",
        template.name(),
        template.n_keypoints(),
        args.out.display()
    );
    Ok(())
}

// ── synth ──────────────────────────────────────────────────────────────

fn parse_lines(s: &str) -> CliResult<[bool; 3]> {
    let bits: Vec<bool> = s
        .chars()
        .map(|c| match c {
            '1' => Ok(true),
            '0' => Ok(false),
            other => Err(format!("invalid line flag '{other}', expected 0 or 1")),
        })
        .collect::<Result<_, _>>()?;
    match bits.as_slice() {
        &[c, a, b] => Ok([c, a, b]),
        _ => Err(format!("expected three line flags, got {}", bits.len()).into()),
    }
}

fn run_synth(args: &CliSynthArgs) -> CliResult<()> {
    let lines = parse_lines(&args.lines)?;
    let g = StripGeometry::default();
    let center = [args.width as f64 * 0.5, args.height as f64 * 0.5];
    let h = synthetic::similarity(&g, args.scale, args.angle, center);
    let img = synthetic::render_frame(&g, lines, &h, args.width, args.height);
    img.save(&args.out)?;

    let corners = synthetic::ground_truth_corners(&g, &h);
    tracing::info!("Synthetic frame written to {}", args.out.display());
    println!("{}", serde_json::to_string(&corners)?);
    Ok(())
}

// ── scan ───────────────────────────────────────────────────────────────

fn run_scan(args: &CliScanArgs) -> CliResult<()> {
    tracing::info!("Loading image: {}", args.image.display());

    let img = image::open(&args.image).map_err(|e| -> CliError {
        format!("Failed to open image {}: {}", args.image.display(), e).into()
    })?;
    let gray = img.to_luma8();
    let (w, h) = gray.dimensions();
    tracing::info!("Image size: {}x{}", w, h);

    let config = match &args.config {
        Some(p) => ScanConfig::from_json_file(p)?,
        None => ScanConfig::default(),
    };
    let template = Arc::new(load_template(args.template.as_deref())?);
    let mut processor = FrameProcessor::new(template, config);

    let mut frame = Frame::from_gray(gray);
    if let Some(hint) = args.brightness_hint {
        frame = frame.with_brightness_hint(hint);
    }
    let outcome = processor.process(&frame);

    match &outcome {
        PipelineOutcome::Detection(d) => {
            tracing::info!(
                "Decoded: control={} test_a={} test_b={} ({:.1} ms)",
                d.reading.control,
                d.reading.test_a,
                d.reading.test_b,
                d.timing.total.as_secs_f64() * 1e3
            );
            if let Some(p) = &args.rectified {
                d.strip.image.save(p)?;
                tracing::info!("Rectified strip written to {}", p.display());
            }
            if let Some(p) = &args.window {
                d.strip.window.save(p)?;
                tracing::info!("Result window written to {}", p.display());
            }
        }
        PipelineOutcome::QualityFeedback(f) => {
            tracing::info!(
                "Quality gate failed: {:?} -> {}",
                f.report.failing_axes(),
                f.instruction.message()
            );
            if args.rectified.is_some() || args.window.is_some() {
                tracing::warn!("No detection; rectified images not written");
            }
        }
    }

    let record = outcome.to_host_record(args.embed_images)?;
    let json = serde_json::to_string_pretty(&record)?;
    match &args.out {
        Some(p) => {
            std::fs::write(p, json)?;
            tracing::info!("Results written to {}", p.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
