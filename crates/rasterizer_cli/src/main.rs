use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use image::{Rgb, RgbImage};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use rasterizer_board::glyph;
use rasterizer_board::preview::render::Scene;
use rasterizer_board::{
    BoardConfig, Downsampler, ExportFormat, FileStore, GlyphLibrary, PreviewGrid, PreviewOptions,
    SamplePolicy, Session, Snapshot, SnapshotLibrary, GRID_HEIGHT, GRID_WIDTH,
};
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(author, version, about = "Render, preview and manage 64x32 matrix board snapshots")]
struct Cli {
    /// Directory holding the board and glyph libraries
    #[arg(long, global = true, default_value = ".rasterizer")]
    store: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Export a board file's pixels as plain text or a C array
    Render(RenderArgs),
    /// Print the quantized low-resolution preview of a board file
    Preview(PreviewArgs),
    /// Validate a board file and add it to the library
    Import {
        /// Board file (`.board.json`)
        input: PathBuf,
    },
    /// List saved boards, most recent first
    List,
    /// Write a saved board back out as a board file
    Load {
        /// Library id as shown by `list`
        id: String,
        /// Output path; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Manage the glyph library
    #[command(subcommand)]
    Glyph(GlyphCommand),
    /// Export every board file in a directory
    Export(BatchArgs),
}

#[derive(Subcommand, Debug)]
enum GlyphCommand {
    /// Add a glyph from a definition file
    Add {
        /// Character line followed by `{0x.., ..}` rows
        input: PathBuf,
    },
    /// List stored glyphs
    List,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Board file (`.board.json`)
    input: PathBuf,
    /// Output path; stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,
    #[arg(long, value_enum, default_value = "plain")]
    format: FormatChoice,
}

#[derive(Parser, Debug)]
struct PreviewArgs {
    /// Board file (`.board.json`)
    input: PathBuf,
    /// Intermediate raster pixels per cell (at least 1)
    #[arg(long, default_value_t = 4.0)]
    scale: f32,
    #[arg(long, value_enum, default_value = "area")]
    sampling: SamplingChoice,
    /// Also write the preview as a PNG with this many pixels per cell
    #[arg(long, requires = "png")]
    cell_pixels: Option<u32>,
    /// PNG output path
    #[arg(long)]
    png: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct BatchArgs {
    /// Directory searched recursively for `.json` board files
    input: PathBuf,
    /// Directory receiving the exports
    #[arg(short, long)]
    out_dir: PathBuf,
    #[arg(long, value_enum, default_value = "plain")]
    format: FormatChoice,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum FormatChoice {
    Plain,
    CArray,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum SamplingChoice {
    Area,
    Center,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Render(args) => render(&cli.store, args),
        Commands::Preview(args) => preview(&cli.store, args),
        Commands::Import { input } => import(&cli.store, &input),
        Commands::List => list(&cli.store),
        Commands::Load { id, output } => load(&cli.store, &id, output.as_deref()),
        Commands::Glyph(GlyphCommand::Add { input }) => add_glyph(&cli.store, &input),
        Commands::Glyph(GlyphCommand::List) => list_glyphs(&cli.store),
        Commands::Export(args) => export_batch(&cli.store, args),
    }
}

fn open_store(path: &Path) -> Result<FileStore> {
    FileStore::open(path).with_context(|| format!("failed to open store {:?}", path))
}

fn read_board(path: &Path) -> Result<Snapshot> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {:?}", path))?;
    Snapshot::from_json(&text, GRID_WIDTH, GRID_HEIGHT)
        .with_context(|| format!("invalid board file {:?}", path))
}

/// Session holding `path`'s board, with text elements resolved against the glyph library.
fn board_session(store: &Path, path: &Path) -> Result<Session<FileStore>> {
    let snapshot = read_board(path)?;
    let mut session = Session::new(BoardConfig::default(), open_store(store)?);
    session.apply_snapshot(&snapshot)?;
    Ok(session)
}

fn write_output(output: Option<&Path>, contents: &str) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, contents).with_context(|| format!("failed to write {:?}", path))?;
            info!("wrote {:?}", path);
        },
        None => print!("{contents}"),
    }
    Ok(())
}

fn render(store: &Path, args: RenderArgs) -> Result<()> {
    let session = board_session(store, &args.input)?;
    let (_, contents) = session.export(args.format.to_format(), Utc::now());
    write_output(args.output.as_deref(), &contents)
}

fn preview(store: &Path, args: PreviewArgs) -> Result<()> {
    let snapshot = read_board(&args.input)?;
    let glyphs = GlyphLibrary::open(open_store(store)?);

    let options = PreviewOptions {
        scale: args.scale,
        sampling: args.sampling.to_policy(),
        ..PreviewOptions::default()
    };
    let scene = Scene { elements: &snapshot.elements, glyphs: &glyphs };
    let output = Downsampler::new(options).downsample(scene, GRID_WIDTH, GRID_HEIGHT);
    if output.used_fallback() {
        warn!("preview used direct rasterization");
    }

    for row in output.grid.rows() {
        println!("{}", row);
    }

    if let Some(path) = &args.png {
        let image = preview_image(&output.grid, args.cell_pixels.unwrap_or(8).max(1))?;
        image.save(path).with_context(|| format!("failed to write {:?}", path))?;
        info!("wrote {:?}", path);
    }

    Ok(())
}

fn import(store: &Path, input: &Path) -> Result<()> {
    let text = fs::read_to_string(input).with_context(|| format!("failed to read {:?}", input))?;
    let mut session = Session::new(BoardConfig::default(), open_store(store)?);
    match session
        .import_snapshot(&text, Utc::now())
        .with_context(|| format!("failed to import {:?}", input))?
    {
        Some(id) => println!("{id}"),
        None => anyhow::bail!("board is valid but the library could not be written"),
    }
    Ok(())
}

fn list(store: &Path) -> Result<()> {
    let library = SnapshotLibrary::new(open_store(store)?);
    for entry in library.list()? {
        let when = entry.recency().map(|time| time.to_rfc3339()).unwrap_or_default();
        println!("{}\t{}\t{}", entry.id, entry.name, when);
    }
    Ok(())
}

fn load(store: &Path, id: &str, output: Option<&Path>) -> Result<()> {
    let library = SnapshotLibrary::new(open_store(store)?);
    let snapshot = library
        .load(id, GRID_WIDTH, GRID_HEIGHT)
        .with_context(|| format!("failed to load board {id}"))?;
    write_output(output, &snapshot.to_json_pretty()?)
}

fn add_glyph(store: &Path, input: &Path) -> Result<()> {
    let text = fs::read_to_string(input).with_context(|| format!("failed to read {:?}", input))?;
    let glyph = glyph::parse(&text).with_context(|| format!("invalid glyph definition {:?}", input))?;

    let mut library = GlyphLibrary::open(open_store(store)?);
    let id = library.add(glyph, Utc::now())?;
    println!("{id}");
    Ok(())
}

fn list_glyphs(store: &Path) -> Result<()> {
    let library = GlyphLibrary::open(open_store(store)?);
    for record in library.records() {
        println!(
            "{}\t{}\t{}x{}",
            record.id,
            record.glyph.character,
            record.glyph.width(),
            record.glyph.height()
        );
    }
    Ok(())
}

fn export_batch(store: &Path, args: BatchArgs) -> Result<()> {
    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("failed to create output directory {:?}", args.out_dir))?;

    let mut entries: Vec<PathBuf> = WalkDir::new(&args.input)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.path().to_path_buf())
        .filter(|path| path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")))
        .collect();
    entries.sort();
    if entries.is_empty() {
        anyhow::bail!("no board files found in {:?}", args.input);
    }

    let format = args.format.to_format();
    let progress = ProgressBar::new(entries.len() as u64);
    progress.set_style(
        ProgressStyle::with_template(
            "{spinner} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} boards",
        )
        .context("invalid progress template")?
        .progress_chars("=> "),
    );

    let mut failed = 0;
    for entry in &entries {
        let session = match board_session(store, entry) {
            Ok(session) => session,
            Err(err) => {
                progress.suspend(|| warn!("skipping {:?}: {err:#}", entry));
                failed += 1;
                progress.inc(1);
                continue;
            },
        };

        let (_, contents) = session.export(format, Utc::now());
        let out_path = args.out_dir.join(format!("{}.{}", board_stem(entry), format.extension()));
        fs::write(&out_path, contents).with_context(|| format!("failed to write {:?}", out_path))?;
        progress.inc(1);
    }

    progress.finish_with_message(format!(
        "{} of {} boards written to {:?}",
        entries.len() - failed,
        entries.len(),
        args.out_dir
    ));
    Ok(())
}

/// `sign.board.json` -> `sign`.
fn board_stem(path: &Path) -> String {
    let name = path.file_name().and_then(|name| name.to_str()).unwrap_or("board");
    let stem = name.strip_suffix(".json").unwrap_or(name);
    let stem = stem.strip_suffix(".board").unwrap_or(stem);
    rasterizer_board::export::sanitize_file_name(stem)
        .unwrap_or_else(|| rasterizer_board::export::DEFAULT_EXPORT_NAME.to_string())
}

fn preview_image(grid: &PreviewGrid, cell_pixels: u32) -> Result<RgbImage> {
    let width = u32::from(grid.width)
        .checked_mul(cell_pixels)
        .with_context(|| format!("--cell-pixels {cell_pixels} is too large"))?;
    let height = u32::from(grid.height)
        .checked_mul(cell_pixels)
        .with_context(|| format!("--cell-pixels {cell_pixels} is too large"))?;
    Ok(RgbImage::from_fn(width, height, |x, y| {
        let cell = grid
            .get((x / cell_pixels) as u16, (y / cell_pixels) as u16)
            .map(|cell| cell.display_color())
            .unwrap_or_default();
        Rgb(cell.rgb())
    }))
}

impl FormatChoice {
    fn to_format(self) -> ExportFormat {
        match self {
            FormatChoice::Plain => ExportFormat::Plain,
            FormatChoice::CArray => ExportFormat::SourceArray,
        }
    }
}

impl SamplingChoice {
    fn to_policy(self) -> SamplePolicy {
        match self {
            SamplingChoice::Area => SamplePolicy::Area,
            SamplingChoice::Center => SamplePolicy::Center,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_image_scales_cells() {
        let grid = PreviewGrid::blank(4, 2);
        let image = preview_image(&grid, 3).unwrap();
        assert_eq!(image.dimensions(), (12, 6));
    }

    #[test]
    fn preview_image_rejects_overflowing_scale() {
        let grid = PreviewGrid::blank(GRID_WIDTH, GRID_HEIGHT);
        assert!(preview_image(&grid, u32::MAX).is_err());
    }

    #[test]
    fn board_stem_strips_board_extension() {
        assert_eq!(board_stem(Path::new("boards/sign.board.json")), "sign");
        assert_eq!(board_stem(Path::new("plain.json")), "plain");
    }
}
