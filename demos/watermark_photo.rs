//! Stamp a tiled text watermark onto a single photo.
//!
//! Usage:
//! ```sh
//! cargo run --example watermark_photo -- photo.jpg out_dir "(c) Studio"
//! ```

use std::env;
use std::process;

use awit_watermark::{loader, Anchor, LoadLimits, Session, Tiling, WatermarkSpec};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <photo> <out_dir> [text]", args[0]);
        process::exit(1);
    }

    let text = args.get(3).map_or("Sample Watermark", String::as_str);
    let photo = loader::load_path(args[1].as_ref(), &LoadLimits::BASE_IMAGE)
        .expect("failed to load photo");

    let mut session = Session::default();
    session.set_image(photo);

    let mut spec = WatermarkSpec::text(text).with_anchor(Anchor::Center);
    spec.geometry.rotation = -30.0;
    spec.tiling = Tiling::Pattern { spacing: 200 };
    session.set_spec(spec);

    let png = session
        .export(chrono::Utc::now())
        .expect("failed to encode PNG");
    match png.save_to_dir(args[2].as_ref()) {
        Ok(path) => println!("Done: {}", path.display()),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
