//! Non-interactive stamping front end: inspect a PDF or burn a signature
//! image into a page and write the flattened copy.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use serde_json::json;
use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

use inkmark::diag::DiagBuffer;
use inkmark::export;
use inkmark::images;
use inkmark::stamps::{StampSet, RESIZE_ASPECT};
use inkmark::{PageGeometry, PdfEditor};

#[derive(Parser)]
#[command(name = "inkmark", about = "PDF signature stamping tool", version)]
struct Cli {
    /// Verbose logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print page count and page sizes as JSON
    Info {
        /// Input PDF
        pdf: PathBuf,
    },

    /// Stamp an image onto a page and export the flattened PDF
    Stamp {
        /// Input PDF
        pdf: PathBuf,

        /// Signature or stamp image (PNG/JPEG/GIF/WEBP)
        #[arg(long)]
        image: PathBuf,

        /// Target page (0-indexed)
        #[arg(long, default_value_t = 0)]
        page: usize,

        /// Left edge, in page units from the top-left corner
        #[arg(long)]
        x: f32,

        /// Top edge, in page units from the top-left corner
        #[arg(long)]
        y: f32,

        /// Stamp width in page units
        #[arg(long, default_value_t = 160.0)]
        width: f32,

        /// Stamp height; defaults to the image's natural aspect ratio
        #[arg(long)]
        height: Option<f32>,

        /// Output path
        #[arg(long, short)]
        out: PathBuf,

        /// Overwrite the output file if it exists
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    let diagnostics = DiagBuffer::new(64, LevelFilter::Warn);
    let loggers: Vec<Box<dyn simplelog::SharedLogger>> = vec![
        TermLogger::new(
            level,
            Config::default(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        ),
        Box::new(diagnostics.clone()),
    ];
    let _ = CombinedLogger::init(loggers);

    let result = match cli.command {
        Command::Info { pdf } => cmd_info(&pdf),
        Command::Stamp {
            pdf,
            image,
            page,
            x,
            y,
            width,
            height,
            out,
            force,
        } => cmd_stamp(&pdf, &image, page, x, y, width, height, &out, force),
    };

    if result.is_err() {
        for entry in diagnostics.entries() {
            eprintln!("[{}] {}", entry.level, entry.message);
        }
    }
    result
}

fn cmd_info(pdf: &Path) -> Result<()> {
    let bytes = fs::read(pdf).with_context(|| format!("reading {}", pdf.display()))?;
    export::validate_pdf(&bytes).map_err(|msg| anyhow::anyhow!("{}: {msg}", pdf.display()))?;

    let sizes = PdfEditor::page_sizes(&bytes)?;
    let pages: Vec<_> = sizes
        .iter()
        .map(|(w, h)| json!({ "width": w, "height": h }))
        .collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "pageCount": sizes.len(),
            "pages": pages,
        }))?
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_stamp(
    pdf: &Path,
    image: &Path,
    page: usize,
    x: f32,
    y: f32,
    width: f32,
    height: Option<f32>,
    out: &Path,
    force: bool,
) -> Result<()> {
    let bytes = fs::read(pdf).with_context(|| format!("reading {}", pdf.display()))?;
    export::validate_pdf(&bytes).map_err(|msg| anyhow::anyhow!("{}: {msg}", pdf.display()))?;

    let image_bytes = fs::read(image).with_context(|| format!("reading {}", image.display()))?;
    let Some(format) = images::sniff_format(&image_bytes) else {
        bail!("{}: not a recognizable stamp image", image.display());
    };
    log::debug!("stamp image detected as {}", format.mime());

    let sizes = PdfEditor::page_sizes(&bytes)?;
    if page >= sizes.len() {
        bail!("page {page} out of range (document has {} pages)", sizes.len());
    }

    // Page units equal CSS pixels at zoom 1.0, so geometry maps directly.
    let geometry: Vec<PageGeometry> = sizes
        .iter()
        .map(|(w, h)| PageGeometry {
            width_px: *w as f32,
            height_px: *h as f32,
            scale: 1.0,
        })
        .collect();

    let height = height.unwrap_or_else(|| {
        images::natural_size(&image_bytes)
            .filter(|(w, _)| *w > 0)
            .map_or(width * RESIZE_ASPECT, |(w, h)| width * h as f32 / w as f32)
    });

    let mut stamps = StampSet::new();
    stamps.add(page, x, y, width, height, image_bytes, &geometry[page]);

    let output = export::export(&bytes, &geometry, stamps.all(), &PdfEditor::new())?;
    let written = write_atomic(out, &output, force)?;

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "path": out.display().to_string(),
            "bytesWritten": written,
        }))?
    );
    Ok(())
}

/// Write via a temp file in the target directory, then rename into place
fn write_atomic(path: &Path, data: &[u8], force: bool) -> Result<usize> {
    if !force && path.exists() {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("creating temp file in {}", dir.display()))?;
    tmp.as_file_mut()
        .write_all(data)
        .and_then(|()| tmp.as_file_mut().sync_all())
        .context("writing output")?;

    if force && path.exists() {
        fs::remove_file(path).with_context(|| format!("replacing {}", path.display()))?;
    }
    tmp.persist(path)
        .with_context(|| format!("moving output into {}", path.display()))?;
    Ok(data.len())
}
