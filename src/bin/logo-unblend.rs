use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use logo_unblend::{
    default_output_path, Mode, ProcessOptions, ProcessResult, Region, WatermarkEngine,
    WatermarkSize,
};

#[derive(Parser)]
#[command(
    name = "logo-unblend",
    about = "Detect and remove semi-transparent logo watermarks via reverse alpha blending",
    version,
    after_help = "Simple usage: logo-unblend <image>  (auto-detect and remove, writes <name>_cleaned.<ext>)\n\n\
                  NOTE: Only the VISIBLE logo overlay is removed. Invisible watermarks embedded\n\
                  by the image generator are not touched."
)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Input image file or directory
    input: String,

    /// Output file or directory (default: {name}_cleaned.{ext})
    #[arg(short, long)]
    output: Option<String>,

    /// Skip watermark detection, process unconditionally
    #[arg(short, long)]
    force: bool,

    /// Detection confidence threshold (0.0-1.0)
    #[arg(short, long, default_value = "0.25", value_parser = parse_threshold)]
    threshold: f32,

    /// Force 48x48 watermark size (for images <= 1024px)
    #[arg(long, conflicts_with = "force_large")]
    force_small: bool,

    /// Force 96x96 watermark size (for images > 1024px)
    #[arg(long)]
    force_large: bool,

    /// Add the watermark instead of removing it
    #[arg(long)]
    add: bool,

    /// Logo brightness (0-255)
    #[arg(long, default_value = "255", value_parser = parse_logo_value)]
    logo_value: f32,

    /// Process this region instead of the standard corner (X,Y,WIDTH,HEIGHT)
    #[arg(long, value_name = "X,Y,W,H")]
    region: Option<Region>,

    /// Refine --region by searching around it for the logo
    #[arg(long, requires = "region")]
    snap: bool,

    /// Reference capture for the 48x48 logo (logo over black)
    #[arg(long, requires = "capture_large")]
    capture_small: Option<PathBuf>,

    /// Reference capture for the 96x96 logo (logo over black)
    #[arg(long, requires = "capture_small")]
    capture_large: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long)]
    quiet: bool,
}

fn parse_threshold(s: &str) -> Result<f32, String> {
    let value: f32 = s.parse().map_err(|e| format!("{e}"))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err("threshold must be between 0.0 and 1.0".to_string())
    }
}

fn parse_logo_value(s: &str) -> Result<f32, String> {
    let value: f32 = s.parse().map_err(|e| format!("{e}"))?;
    if (0.0..=255.0).contains(&value) {
        Ok(value)
    } else {
        Err("logo value must be between 0 and 255".to_string())
    }
}

fn init_logging(cli: &Cli) {
    let default_level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    let force_size = if cli.force_small {
        Some(WatermarkSize::Small)
    } else if cli.force_large {
        Some(WatermarkSize::Large)
    } else {
        None
    };

    let opts = ProcessOptions {
        mode: if cli.add { Mode::Add } else { Mode::Remove },
        force: cli.force,
        threshold: cli.threshold,
        force_size,
        region: cli.region,
        snap: cli.snap,
    };

    let engine = match (&cli.capture_small, &cli.capture_large) {
        (Some(small), Some(large)) => WatermarkEngine::from_paths(small, large),
        _ => WatermarkEngine::new(),
    };
    let engine = match engine {
        Ok(e) => e.with_logo_value(cli.logo_value),
        Err(e) => {
            eprintln!("Fatal: Failed to initialize engine: {e}");
            process::exit(1);
        }
    };

    let input_path = Path::new(&cli.input);
    if !input_path.exists() {
        eprintln!("Error: Input path does not exist: {}", cli.input);
        process::exit(1);
    }

    if !cli.quiet {
        if opts.mode == Mode::Add {
            eprintln!("Add mode - compositing the logo onto every image");
        } else if opts.force || opts.region.is_some() {
            eprintln!("WARNING: Force mode - processing ALL images without detection!");
        } else {
            eprintln!(
                "Auto-detection enabled (threshold: {:.0}%)",
                opts.threshold * 100.0
            );
        }
        eprintln!();
    }

    let results = if input_path.is_dir() {
        let output_dir = if let Some(o) = &cli.output {
            PathBuf::from(o)
        } else {
            eprintln!("Error: Output directory is required for batch processing");
            eprintln!("Usage: logo-unblend <input_dir> -o <output_dir>");
            process::exit(1);
        };
        engine.process_directory(input_path, &output_dir, &opts)
    } else {
        let output_path = match &cli.output {
            Some(o) => PathBuf::from(o),
            None => default_output_path(input_path),
        };
        vec![engine.process_file(input_path, &output_path, &opts)]
    };

    let mut success_count = 0u32;
    let mut skip_count = 0u32;
    let mut fail_count = 0u32;

    for r in &results {
        print_result(r, &cli);
        if r.skipped {
            skip_count += 1;
        } else if r.success {
            success_count += 1;
        } else {
            fail_count += 1;
        }
    }

    if results.len() > 1 && !cli.quiet {
        eprintln!();
        eprint!("[Summary] Processed: {success_count}");
        if skip_count > 0 {
            eprint!(", Skipped: {skip_count}");
        }
        if fail_count > 0 {
            eprint!(", Failed: {fail_count}");
        }
        eprintln!(" (Total: {})", results.len());
    }

    if fail_count > 0 {
        process::exit(1);
    }
}

fn print_result(result: &ProcessResult, cli: &Cli) {
    if cli.quiet && result.success {
        return;
    }

    let filename = result.path.file_name().map_or_else(
        || result.path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    );

    if result.skipped {
        eprintln!("[SKIP] {filename}: {}", result.message);
    } else if result.success {
        if result.confidence > 0.0 {
            eprintln!(
                "[OK] {filename} ({:.0}% confidence)",
                result.confidence * 100.0
            );
        } else {
            eprintln!("[OK] {filename}");
        }
    } else {
        eprintln!("[FAIL] {filename}: {}", result.message);
    }

    if cli.verbose && !result.message.is_empty() {
        eprintln!("  -> {}", result.message);
    }
}
