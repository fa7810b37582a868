use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::Parser;
use image::Rgba;
use tracing_subscriber::EnvFilter;

use awit_watermark::color::parse_color;
use awit_watermark::{
    loader, Anchor, Compositor, FontBook, FontFamily, FontWeight, LoadLimits, Plan, Session,
    Shadow, Stroke, TextAlign, Tiling, WatermarkKind, WatermarkSpec, PLANS,
};

#[derive(Parser)]
#[command(
    name = "awit",
    about = "Stamp a text or image watermark onto a photo and export it as PNG",
    version,
    after_help = "Simple usage: awit <photo> --text \"(c) Me\"  (writes awit_watermarked_<time>.png next to the photo)\n\n\
                  Without --plan a small AWiT mark is added to the bottom-right corner."
)]
struct Cli {
    /// Photo to watermark (JPEG, PNG, GIF or WebP, up to 10 MB)
    input: PathBuf,

    /// Output directory (default: the photo's directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Watermark text
    #[arg(long, conflicts_with = "image")]
    text: Option<String>,

    /// Use this logo as the watermark instead of text (up to 5 MB)
    #[arg(long)]
    image: Option<PathBuf>,

    /// Logo edge length in pixels (the logo is stretched to a square)
    #[arg(long)]
    image_size: Option<u32>,

    /// Placement preset, e.g. bottom-right or center
    #[arg(long)]
    anchor: Option<Anchor>,

    /// Horizontal anchor position in percent of the width
    #[arg(long)]
    x: Option<f32>,

    /// Vertical anchor position in percent of the height
    #[arg(long)]
    y: Option<f32>,

    /// Rotation in degrees
    #[arg(long, allow_hyphen_values = true)]
    rotation: Option<f32>,

    /// Watermark opacity (0.0-1.0)
    #[arg(long)]
    opacity: Option<f32>,

    /// Font size in pixels
    #[arg(long)]
    font_size: Option<f32>,

    /// Font family, e.g. "Courier New"
    #[arg(long)]
    font_family: Option<FontFamily>,

    /// Font weight: normal, bold or lighter
    #[arg(long)]
    font_weight: Option<FontWeight>,

    /// Text alignment relative to the anchor: left, center or right
    #[arg(long)]
    align: Option<TextAlign>,

    /// Text colour, e.g. #FFFFFF or white
    #[arg(long, value_parser = parse_color)]
    color: Option<Rgba<u8>>,

    /// Outline width in pixels
    #[arg(long)]
    stroke_width: Option<f32>,

    /// Outline colour
    #[arg(long, value_parser = parse_color, default_value = "#000000")]
    stroke_color: Rgba<u8>,

    /// Shadow blur radius in pixels
    #[arg(long)]
    shadow_blur: Option<f32>,

    /// Shadow colour
    #[arg(long, value_parser = parse_color, default_value = "#000000")]
    shadow_color: Rgba<u8>,

    /// Shadow horizontal offset in pixels
    #[arg(long, allow_hyphen_values = true, default_value = "0")]
    shadow_offset_x: f32,

    /// Shadow vertical offset in pixels
    #[arg(long, allow_hyphen_values = true, default_value = "0")]
    shadow_offset_y: f32,

    /// Tile the watermark across the whole photo
    #[arg(long)]
    pattern: bool,

    /// Pattern cell size in pixels
    #[arg(long, default_value = "150")]
    spacing: u32,

    /// Activate a plan (pro_monthly or pro_yearly) to drop the branding mark
    #[arg(long)]
    plan: Option<String>,

    /// Directory of TrueType fonts (e.g. arial.ttf, arialbd.ttf, LiberationSerif-Regular.ttf)
    #[arg(long)]
    font_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    let plan = cli.plan.as_deref().map(|id| {
        Plan::by_id(id).unwrap_or_else(|| {
            let known: Vec<_> = PLANS.iter().map(|p| p.id).collect();
            fail(&format!("unknown plan `{id}` (expected one of: {})", known.join(", ")))
        })
    });

    let fonts = match &cli.font_dir {
        Some(dir) => FontBook::load_dir(dir).unwrap_or_else(|e| fail(&e.to_string())),
        None => FontBook::builtin(),
    };
    let mut session = Session::new(Compositor::with_fonts(fonts));

    match loader::load_path(&cli.input, &LoadLimits::BASE_IMAGE) {
        Ok(photo) => {
            if cli.verbose {
                eprintln!(
                    "  -> {}x{}, {}, {}",
                    photo.info.width, photo.info.height, photo.info.byte_size, photo.info.mime
                );
            }
            session.set_image(photo);
        }
        Err(e) => fail(&format!("{}: {e}", display_name(&cli.input))),
    }

    let mut spec = build_spec(&cli);
    if let Some(path) = &cli.image {
        match loader::load_path(path, &LoadLimits::WATERMARK_IMAGE) {
            Ok(logo) => spec.image.bitmap = Some(Arc::new(logo.bitmap)),
            Err(e) => fail(&format!("{}: {e}", display_name(path))),
        }
    }
    if let Err(e) = spec.validate() {
        fail(&e.to_string());
    }
    session.set_spec(spec);

    if let Some(plan) = plan {
        session.subscribe(plan, chrono::Utc::now());
        if !cli.quiet {
            eprintln!("Subscription active: {plan}");
        }
    }

    let output_dir = cli.output.clone().unwrap_or_else(|| {
        cli.input
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
    });

    let saved = session
        .export(chrono::Utc::now())
        .and_then(|png| png.save_to_dir(&output_dir));
    match saved {
        Ok(path) => {
            if !cli.quiet {
                eprintln!("[OK] {} -> {}", display_name(&cli.input), path.display());
            }
        }
        Err(e) => fail(&format!("{}: {e}", display_name(&cli.input))),
    }
}

fn build_spec(cli: &Cli) -> WatermarkSpec {
    let mut spec = WatermarkSpec::default();
    if let Some(anchor) = cli.anchor {
        spec = spec.with_anchor(anchor);
    }

    if cli.image.is_some() {
        spec.kind = WatermarkKind::Image;
    }
    if let Some(size) = cli.image_size {
        spec.image.size = size;
    }
    if let Some(x) = cli.x {
        spec.geometry.x = x;
    }
    if let Some(y) = cli.y {
        spec.geometry.y = y;
    }
    if let Some(rotation) = cli.rotation {
        spec.geometry.rotation = rotation;
    }
    if let Some(opacity) = cli.opacity {
        spec.opacity = opacity;
    }
    if cli.pattern {
        spec.tiling = Tiling::Pattern {
            spacing: cli.spacing,
        };
    }

    let text = &mut spec.text;
    if let Some(content) = &cli.text {
        text.content.clone_from(content);
    }
    if let Some(size) = cli.font_size {
        text.size = size;
    }
    if let Some(family) = cli.font_family {
        text.family = family;
    }
    if let Some(weight) = cli.font_weight {
        text.weight = weight;
    }
    if let Some(align) = cli.align {
        text.align = align;
    }
    if let Some(color) = cli.color {
        text.color = color;
    }
    if let Some(width) = cli.stroke_width {
        text.stroke = Some(Stroke {
            width,
            color: cli.stroke_color,
        });
    }
    if let Some(blur) = cli.shadow_blur {
        text.shadow = Some(Shadow {
            blur,
            color: cli.shadow_color,
            offset_x: cli.shadow_offset_x,
            offset_y: cli.shadow_offset_y,
        });
    }

    spec
}

fn init_tracing(cli: &Cli) {
    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    )
}

fn fail(message: &str) -> ! {
    eprintln!("[FAIL] {message}");
    process::exit(1);
}
