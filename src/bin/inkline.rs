use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "inkline", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a document to a PNG, JPEG or SVG file.
    Export(ExportArgs),
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Input document JSON. Image blob refs resolve relative to its directory.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output file path.
    #[arg(long)]
    out: PathBuf,

    /// Output format. Defaults to the output file extension.
    #[arg(long, value_enum)]
    format: Option<FormatChoice>,

    /// Canvas width in pixels before scaling.
    #[arg(long, default_value_t = 1024)]
    width: u32,

    /// Canvas height in pixels before scaling.
    #[arg(long, default_value_t = 768)]
    height: u32,

    /// Resolution multiplier.
    #[arg(long, default_value_t = 1.0)]
    scale: f64,

    /// JPEG quality (1-100).
    #[arg(long, default_value_t = 85)]
    quality: u8,

    /// Omit the background (PNG/SVG only).
    #[arg(long)]
    transparent: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatChoice {
    Png,
    Jpg,
    Svg,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Export(args) => cmd_export(args),
    }
}

fn read_document(path: &Path) -> anyhow::Result<inkline::Document> {
    let f = File::open(path).with_context(|| format!("open document '{}'", path.display()))?;
    let r = BufReader::new(f);
    let doc: inkline::Document =
        serde_json::from_reader(r).with_context(|| "parse document JSON")?;
    Ok(doc)
}

fn format_for(args: &ExportArgs) -> anyhow::Result<FormatChoice> {
    if let Some(fmt) = args.format {
        return Ok(fmt);
    }
    match args
        .out
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => Ok(FormatChoice::Png),
        Some("jpg") | Some("jpeg") => Ok(FormatChoice::Jpg),
        Some("svg") => Ok(FormatChoice::Svg),
        other => anyhow::bail!(
            "cannot infer format from extension {:?}; pass --format",
            other
        ),
    }
}

fn cmd_export(args: ExportArgs) -> anyhow::Result<()> {
    let doc = read_document(&args.in_path)?;
    doc.validate()?;

    let format = format_for(&args)?;
    let blobs_root = args.in_path.parent().unwrap_or_else(|| Path::new("."));
    let store = inkline::FsImageStore::new(blobs_root);

    let settings = inkline::ExportSettings {
        scale: args.scale,
        quality: args.quality,
        transparent_background: args.transparent,
    };

    let url = match format {
        FormatChoice::Png => inkline::export_png(
            &doc.layers,
            doc.background,
            args.width,
            args.height,
            &settings,
            &store,
        )?,
        FormatChoice::Jpg => inkline::export_jpg(
            &doc.layers,
            doc.background,
            args.width,
            args.height,
            &settings,
            &store,
        )?,
        FormatChoice::Svg => inkline::export_svg(
            &doc.layers,
            doc.background,
            args.width,
            args.height,
            &settings,
            &store,
        )?,
    };

    if let Some(parent) = args.out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    inkline::write_data_url(&url, &args.out)?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}
