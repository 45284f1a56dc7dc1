use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use pico_args::Arguments;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use walkdir::WalkDir;

use chromatile::collage::{self, ImageDimensions};
use chromatile::compose::{self, TileOptions, TileSpec};
use chromatile::palette::{Metric, Palette, PaletteExtractor};
use chromatile::posterize::Posterizer;
use chromatile::provider::{ImageProvider, OutputFormat, QualityProfile, Scaling, StdImageProvider};
use chromatile::{BitDepth, Color, PixelBuffer};

const HELP: &str = "chromatile: palette quantization and collage engine

USAGE:
    chromatile <input> [OPTIONS]

<input> is an image file, a directory of images, or a .txt file listing
image paths, one per line.

OPTIONS:
    -h, --help            print this message
    -o, --output <path>   output image path (required except --show-colors)
    -k, --colors <N>      palette size [default: 16]
    -m, --metric <name>   color | brightness | hue | saturation | gradient [default: color]
    -p, --posterize <N>   posterize each channel to N levels instead of using a palette
    -g, --greyscale       convert to greyscale before any other transform
    --show-colors         print the extracted palette instead of writing an image
    --collage <1|2>       build a collage from every image under <input> (method 1: uniform grid, method 2: fixed columns)
    --aspect <w:h>        target aspect ratio, e.g. 16:9 [default: 1:1]
    --long-edge <px>      cap the longer output dimension
    --columns <N>         column count for --collage 2 [default: 3]
    --spacing <px>        pixel spacing between tiles for --collage 2 [default: 6]
    --randomize           shuffle each column's vertical order for --collage 2
    --no-spaced           do not distribute slack evenly when --randomize is set
    --fill <0xRRGGBB>      background fill color [default: 0x000000]
    --quality <low|high>  jpeg quality profile [default: high]
    --seed <N>            seed the RNG used for sampling/clustering/shuffling
    --bpp48                use 48-bit-per-pixel processing instead of 24
";

fn parse_fill(s: &str) -> Result<Color> {
    let s = s.trim_start_matches("0x").trim_start_matches("0X");
    let word = u32::from_str_radix(s, 16).context("--fill must be a hex RGB value like 0xRRGGBB")?;
    Ok(Color::from_rgb(
        ((word >> 16) & 0xff) as u8,
        ((word >> 8) & 0xff) as u8,
        (word & 0xff) as u8,
    ))
}

fn parse_aspect(s: &str) -> Result<f64> {
    if let Some((w, h)) = s.split_once([':', 'x', 'X']) {
        let w: f64 = w.parse().context("invalid aspect width")?;
        let h: f64 = h.parse().context("invalid aspect height")?;
        if h == 0.0 {
            bail!("aspect height cannot be zero");
        }
        Ok(w / h)
    } else {
        s.parse().context("aspect must be W:H or a decimal ratio")
    }
}

fn parse_metric(s: &str) -> Result<Metric> {
    match s {
        "color" => Ok(Metric::Color),
        "brightness" => Ok(Metric::Brightness),
        "hue" => Ok(Metric::Hue),
        "saturation" => Ok(Metric::Saturation),
        "gradient" => Ok(Metric::Gradient),
        other => bail!("unknown metric '{other}', expected color|brightness|hue|saturation|gradient"),
    }
}

const IMAGE_EXTENSIONS: &[&str] = &["bmp", "gif", "jpeg", "jpg", "png", "tif", "tiff"];

fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Resolve the positional `<input>` argument into a concrete list of image
/// paths: a single file, every image under a directory, or every line of
/// a `.txt` manifest.
fn collect_inputs(input: &Path) -> Result<Vec<PathBuf>> {
    if input.extension().is_some_and(|ext| ext == "txt") {
        let text = fs::read_to_string(input)
            .with_context(|| format!("reading input list {}", input.display()))?;
        return Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .collect());
    }

    if input.is_dir() {
        let mut paths = Vec::new();
        for entry in WalkDir::new(input) {
            let entry = entry?;
            if entry.file_type().is_file() && is_image_path(entry.path()) {
                paths.push(entry.into_path());
            }
        }
        paths.sort();
        return Ok(paths);
    }

    if !input.is_file() {
        bail!("input path {} does not exist", input.display());
    }
    Ok(vec![input.to_path_buf()])
}

fn output_format_for(path: &Path) -> Result<OutputFormat> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    Ok(match ext.as_str() {
        "bmp" => OutputFormat::Bmp,
        "gif" => OutputFormat::Gif,
        "jpg" | "jpeg" => OutputFormat::Jpeg,
        "png" => OutputFormat::Png,
        "tif" | "tiff" => OutputFormat::Tiff,
        other => bail!("unrecognized output extension '{other}'"),
    })
}

fn run() -> Result<()> {
    let mut args = Arguments::from_env();

    if args.contains(["-h", "--help"]) {
        print!("{HELP}");
        return Ok(());
    }

    let output: Option<PathBuf> = args.opt_value_from_str(["-o", "--output"])?;
    let k: usize = args.opt_value_from_str(["-k", "--colors"])?.unwrap_or(16);
    let metric_str: String = args
        .opt_value_from_str(["-m", "--metric"])?
        .unwrap_or_else(|| "color".to_string());
    let posterize_levels: Option<u32> = args.opt_value_from_str(["-p", "--posterize"])?;
    let greyscale = args.contains(["-g", "--greyscale"]);
    let show_colors = args.contains("--show-colors");
    let collage_method: Option<u32> = args.opt_value_from_str("--collage")?;
    let aspect_str: Option<String> = args.opt_value_from_str("--aspect")?;
    let long_edge: Option<u32> = args.opt_value_from_str("--long-edge")?;
    let columns: u32 = args.opt_value_from_str("--columns")?.unwrap_or(3);
    let spacing: u32 = args.opt_value_from_str("--spacing")?.unwrap_or(6);
    let randomize = args.contains("--randomize");
    let no_spaced = args.contains("--no-spaced");
    let fill_str: Option<String> = args.opt_value_from_str("--fill")?;
    let quality_str: String = args
        .opt_value_from_str("--quality")?
        .unwrap_or_else(|| "high".to_string());
    let seed: Option<u64> = args.opt_value_from_str("--seed")?;
    let bpp48 = args.contains("--bpp48");

    let free: Vec<String> = args.free()?;
    let Some(input) = free.first() else {
        bail!("missing required <input> argument; see --help");
    };
    let input = PathBuf::from(input);

    let metric = parse_metric(&metric_str)?;
    let fill = match fill_str {
        Some(s) => parse_fill(&s)?,
        None => Color::from_rgb(0, 0, 0),
    };
    let quality = match quality_str.as_str() {
        "low" => QualityProfile::Low,
        "high" => QualityProfile::High,
        other => bail!("unknown quality profile '{other}', expected low|high"),
    };
    let depth = if bpp48 { BitDepth::Bpp48 } else { BitDepth::Bpp24 };

    let mut rng = match seed {
        Some(s) => ChaCha8Rng::seed_from_u64(s),
        None => ChaCha8Rng::from_entropy(),
    };

    let provider = StdImageProvider;

    if let Some(method) = collage_method {
        let output = output.context("--output is required for --collage")?;
        let paths = collect_inputs(&input)?;
        if paths.is_empty() {
            bail!("no input images found under {}", input.display());
        }

        let handles: Vec<_> = paths
            .iter()
            .map(|p| provider.open(p).with_context(|| format!("opening {}", p.display())))
            .collect::<Result<_>>()?;
        let dims: Vec<ImageDimensions> = handles
            .iter()
            .map(|h| {
                let (w, hgt) = provider.dimensions(h);
                ImageDimensions { width: w, height: hgt }
            })
            .collect();

        let caption_lock = Mutex::new(());
        let options = TileOptions {
            greyscale,
            colorizer: None,
            posterizer: None,
            caption_lock: Some(&caption_lock),
        };

        let mut dest;
        let tiles: Vec<(TileSpec, PixelBuffer)>;

        match method {
            1 => {
                let aspect = match &aspect_str {
                    Some(s) => parse_aspect(s)?,
                    None => 1.0,
                };
                let plan = collage::plan_grid(&dims, aspect, long_edge)?;
                dest = PixelBuffer::new(plan.canvas_width, plan.canvas_height, depth);
                tiles = handles
                    .iter()
                    .zip(plan.placements.iter())
                    .map(|(handle, spec)| -> Result<_> {
                        let pixels =
                            provider.read_pixels(handle, depth, spec.width, spec.height, Scaling::HighQualityCubic)?;
                        Ok((*spec, pixels))
                    })
                    .collect::<Result<_>>()?;
            }
            2 => {
                let target_width = long_edge.unwrap_or(4096);
                let plan = collage::plan_waterfall(
                    &dims,
                    columns,
                    target_width,
                    spacing,
                    randomize,
                    !no_spaced,
                    &mut rng,
                )?;
                dest = PixelBuffer::new(plan.canvas_width, plan.canvas_height, depth);
                tiles = handles
                    .iter()
                    .zip(plan.placements.iter())
                    .map(|(handle, spec)| -> Result<_> {
                        let pixels =
                            provider.read_pixels(handle, depth, spec.width, spec.height, Scaling::HighQualityCubic)?;
                        Ok((*spec, pixels))
                    })
                    .collect::<Result<_>>()?;
            }
            other => bail!("--collage must be 1 or 2, got {other}"),
        }

        compose::compose(&mut dest, fill, &tiles, &options)?;
        let format = output_format_for(&output)?;
        provider.write(&dest, &output, format, quality)?;
        log::info!("wrote collage to {}", output.display());
        return Ok(());
    }

    let paths = collect_inputs(&input)?;
    let Some(first) = paths.first() else {
        bail!("no input image found at {}", input.display());
    };
    let handle = provider.open(first).with_context(|| format!("opening {}", first.display()))?;
    let (width, height) = provider.dimensions(&handle);
    let source = provider.read_pixels(&handle, depth, width, height, Scaling::HighQualityCubic)?;

    if show_colors {
        let extraction_input = if greyscale {
            let mut g = source.clone();
            for y in 0..g.height() {
                for x in 0..g.width() {
                    let c = compose::greyscale(g.get(x, y));
                    g.set(x, y, c);
                }
            }
            g
        } else {
            source.clone()
        };
        let (palette_colors, report) = PaletteExtractor::extract(&extraction_input, k, &mut rng)?;
        for c in &palette_colors {
            println!("{:#08x}", c.packed());
        }
        log::info!(
            "mean intra-cluster distance: {:.4}",
            report.mean_intra_cluster_distance
        );
        return Ok(());
    }

    let output = output.context("--output is required")?;

    // Single-image convert mode routes through the same TileComposer the
    // collage modes use, rather than mutating `source` in place, so there is
    // one code path for "flood fill, then draw transformed tiles".
    let posterizer = posterize_levels.map(Posterizer::new).transpose()?;
    let palette = if posterizer.is_none() {
        let (palette_colors, _report) = PaletteExtractor::extract(&source, k, &mut rng)?;
        Some(Palette::build(&palette_colors, metric)?)
    } else {
        None
    };

    let mut dest = PixelBuffer::new(width, height, depth);
    let spec = TileSpec {
        offset_x: 0,
        offset_y: 0,
        width,
        height,
    };
    let options = TileOptions {
        greyscale,
        colorizer: palette.as_ref(),
        posterizer: posterizer.as_ref(),
        caption_lock: None,
    };
    compose::compose(&mut dest, fill, &[(spec, source)], &options)?;

    let format = output_format_for(&output)?;
    provider.write(&dest, &output, format, quality)?;
    log::info!("wrote {}", output.display());

    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    if let Err(err) = run() {
        eprintln!("chromatile: {err:#}");
        std::process::exit(1);
    }
    Ok(())
}
