use std::io::Cursor;
use std::sync::Arc;

use awit_watermark::{
    loader, Anchor, Bitmap, Compositor, ExportError, LoadError, LoadLimits, PatternGrid, RenderFlags,
    Session, Shadow, Stroke, SubscriptionState, Tiling, WatermarkKind, WatermarkSpec, PRO_MONTHLY,
};
use chrono::{TimeZone, Utc};
use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgba, RgbaImage};

fn solid(width: u32, height: u32, px: [u8; 4]) -> Bitmap {
    Bitmap::new(RgbaImage::from_pixel(width, height, Rgba(px))).unwrap()
}

fn png_bytes(img: DynamicImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
    bytes
}

fn pro() -> SubscriptionState {
    let mut sub = SubscriptionState::free();
    sub.activate(PRO_MONTHLY, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    sub
}

fn changed_pixels(a: &Bitmap, b: &Bitmap) -> Vec<(u32, u32)> {
    a.pixels()
        .enumerate_pixels()
        .filter(|(x, y, px)| *px != b.pixels().get_pixel(*x, *y))
        .map(|(x, y, _)| (x, y))
        .collect()
}

/// Intensity-weighted centre of the red channel inside a window, using pixel
/// centres.
fn ink_centroid(img: &Bitmap, x0: u32, y0: u32, x1: u32, y1: u32) -> (f64, f64) {
    let (mut sum, mut sx, mut sy) = (0.0, 0.0, 0.0);
    for y in y0..y1 {
        for x in x0..x1 {
            let v = f64::from(img.pixels().get_pixel(x, y)[0]);
            sum += v;
            sx += v * (f64::from(x) + 0.5);
            sy += v * (f64::from(y) + 0.5);
        }
    }
    assert!(sum > 0.0, "no ink in {x0}..{x1} x {y0}..{y1}");
    (sx / sum, sy / sum)
}

fn styled_text() -> WatermarkSpec {
    let mut spec = WatermarkSpec::text("Proof");
    spec.text.stroke = Some(Stroke {
        width: 4.0,
        color: Rgba([0, 0, 0, 255]),
    });
    spec.text.shadow = Some(Shadow {
        blur: 6.0,
        color: Rgba([0, 0, 0, 255]),
        offset_x: 3.0,
        offset_y: 3.0,
    });
    spec
}

#[test]
fn preview_off_returns_base_unchanged() {
    let compositor = Compositor::new();
    let base = solid(240, 180, [40, 80, 120, 255]);
    let logo = Arc::new(solid(30, 30, [255, 0, 0, 255]));

    let mut pattern = styled_text();
    pattern.tiling = Tiling::Pattern { spacing: 60 };
    let specs = [
        WatermarkSpec::default(),
        styled_text(),
        pattern,
        WatermarkSpec::image(logo, 80),
    ];

    for spec in &specs {
        for sub in [SubscriptionState::free(), pro()] {
            let out = compositor.render(&base, spec, &sub, RenderFlags::original());
            assert_eq!(out, base);
        }
    }
}

#[test]
fn output_always_matches_base_size() {
    let compositor = Compositor::new();
    let base = solid(37, 211, [0, 0, 0, 255]);
    let mut spec = styled_text();
    spec.tiling = Tiling::Pattern { spacing: 50 };
    spec.geometry.rotation = 33.0;
    let out = compositor.render(&base, &spec, &SubscriptionState::free(), RenderFlags::default());
    assert_eq!((out.width(), out.height()), (37, 211));
}

#[test]
fn branding_only_without_pro() {
    let compositor = Compositor::new();
    let base = solid(200, 150, [255, 255, 255, 255]);
    let empty = WatermarkSpec::text("");

    let with_pro = compositor.render(&base, &empty, &pro(), RenderFlags::default());
    assert_eq!(with_pro, base);

    let free = compositor.render(&base, &empty, &SubscriptionState::free(), RenderFlags::default());
    let changed = changed_pixels(&free, &base);
    assert!(!changed.is_empty());
    for (x, y) in changed {
        assert!((154..190).contains(&x) && (128..140).contains(&y), "({x}, {y})");
    }
}

#[test]
fn branding_is_drawn_over_the_watermark() {
    let compositor = Compositor::new();
    let base = solid(200, 150, [255, 255, 255, 255]);
    let logo = Arc::new(solid(100, 100, [255, 0, 0, 255]));
    let mut spec = WatermarkSpec::image(logo, 500);
    spec.opacity = 1.0;
    spec.geometry.x = 50.0;
    spec.geometry.y = 50.0;

    let covered = compositor.render(&base, &spec, &pro(), RenderFlags::default());
    for (_, _, px) in covered.pixels().enumerate_pixels() {
        assert!(px[0] > 250 && px[1] < 5, "{px:?}");
    }

    let free = compositor.render(&base, &spec, &SubscriptionState::free(), RenderFlags::default());
    let greyed = (154..190)
        .flat_map(|x| (128..140).map(move |y| (x, y)))
        .filter(|&(x, y)| free.pixels().get_pixel(x, y)[1] > 40)
        .count();
    assert!(greyed > 0, "branding hidden under the logo");
}

#[test]
fn pattern_grid_on_square_canvas() {
    let grid = PatternGrid::new(600, 600, 150);
    assert_eq!((grid.cols, grid.rows), (4, 4));
    assert_eq!(grid.anchors().count(), 16);

    let tiny = PatternGrid::new(120, 90, 300);
    assert_eq!((tiny.cols, tiny.rows), (2, 2));
}

#[test]
fn pattern_instances_are_attenuated() {
    let compositor = Compositor::new();
    let base = solid(600, 600, [0, 0, 0, 255]);
    let logo = Arc::new(solid(100, 100, [255, 255, 255, 255]));

    let mut single = WatermarkSpec::image(logo, 100);
    single.opacity = 1.0;
    single.geometry.x = 50.0;
    single.geometry.y = 50.0;
    let out = compositor.render(&base, &single, &pro(), RenderFlags::default());
    assert_eq!(out.pixels().get_pixel(300, 300)[0], 255);

    let tiled = WatermarkSpec {
        tiling: Tiling::Pattern { spacing: 150 },
        ..single
    };
    let out = compositor.render(&base, &tiled, &pro(), RenderFlags::default());
    let tile = out.pixels().get_pixel(75, 75)[0];
    assert!((152..=154).contains(&tile), "{tile}");
    assert_eq!(out.pixels().get_pixel(5, 5)[0], 0);
}

#[test]
fn text_is_anchored_and_aligned() {
    let compositor = Compositor::new();
    let base = solid(400, 300, [0, 0, 0, 255]);
    let spec = WatermarkSpec::default();

    let out = compositor.render(&base, &spec, &pro(), RenderFlags::default());
    let changed = changed_pixels(&out, &base);
    assert!(!changed.is_empty());
    for (x, y) in changed {
        assert!(x < 390, "right-aligned text crosses the anchor at x={x}");
        assert!((240..300).contains(&y), "text not centred on the anchor: y={y}");
    }
}

#[test]
fn stroke_and_shadow_add_ink() {
    let compositor = Compositor::new();
    let base = solid(300, 200, [255, 255, 255, 255]);
    let mut plain = WatermarkSpec::text("Proof");
    plain.text.color = Rgba([0, 0, 255, 255]);
    let mut styled = styled_text();
    styled.text.color = plain.text.color;

    let plain_out = compositor.render(&base, &plain, &pro(), RenderFlags::default());
    let styled_out = compositor.render(&base, &styled, &pro(), RenderFlags::default());
    assert!(changed_pixels(&styled_out, &base).len() > changed_pixels(&plain_out, &base).len());
}

#[test]
fn rendering_is_deterministic() {
    let compositor = Compositor::new();
    let base = solid(320, 240, [90, 90, 90, 255]);
    let mut spec = styled_text();
    spec.tiling = Tiling::Pattern { spacing: 80 };
    spec.geometry.rotation = -30.0;

    let sub = SubscriptionState::free();
    let a = compositor.render(&base, &spec, &sub, RenderFlags::default());
    let b = compositor.render(&base, &spec, &sub, RenderFlags::default());
    assert_eq!(a, b);
}

#[test]
fn half_turn_and_back_matches_unrotated() {
    let compositor = Compositor::new();
    let base = solid(300, 200, [10, 10, 10, 255]);
    let fresh = WatermarkSpec::default();
    let turned = fresh.clone().rotated_by(180.0).rotated_by(-180.0);

    let sub = SubscriptionState::free();
    assert_eq!(
        compositor.render(&base, &turned, &sub, RenderFlags::default()),
        compositor.render(&base, &fresh, &sub, RenderFlags::default())
    );
}

#[test]
fn rotated_logo_turns_about_its_own_anchor() {
    let compositor = Compositor::new();
    let base = solid(200, 200, [0, 0, 0, 255]);
    let logo = Arc::new(solid(20, 20, [255, 255, 255, 255]));
    let mut spec = WatermarkSpec::image(logo, 40);
    spec.opacity = 1.0;
    spec.geometry.x = 25.0;
    spec.geometry.y = 25.0;

    for rotation in [30.0, 90.0] {
        spec.geometry.rotation = rotation;
        let out = compositor.render(&base, &spec, &pro(), RenderFlags::default());
        let (cx, cy) = ink_centroid(&out, 0, 0, 200, 200);
        assert!((cx - 50.0).abs() < 1.0 && (cy - 50.0).abs() < 1.0, "{rotation}: ({cx}, {cy})");
        assert!(
            changed_pixels(&out, &base).iter().all(|&(x, y)| x < 80 && y < 80),
            "{rotation}: ink far from the anchor"
        );
    }

    spec.geometry.rotation = 30.0;
    let turned = compositor.render(&base, &spec, &pro(), RenderFlags::default());
    assert_eq!(turned.pixels().get_pixel(31, 31)[0], 0, "corner of the unrotated square");
    assert_eq!(turned.pixels().get_pixel(50, 50)[0], 255);
}

#[test]
fn pattern_tiles_rotate_about_their_own_anchors() {
    let compositor = Compositor::new();
    let base = solid(600, 600, [0, 0, 0, 255]);
    let logo = Arc::new(solid(30, 30, [255, 255, 255, 255]));
    let mut spec = WatermarkSpec {
        tiling: Tiling::Pattern { spacing: 150 },
        opacity: 1.0,
        ..WatermarkSpec::image(logo, 60)
    };
    spec.geometry.rotation = 45.0;
    let out = compositor.render(&base, &spec, &pro(), RenderFlags::default());

    let reach = 46.0_f32;
    let mut checked = 0;
    for (ax, ay) in PatternGrid::new(600, 600, 150).anchors() {
        if ax - reach < 0.0 || ay - reach < 0.0 || ax + reach > 600.0 || ay + reach > 600.0 {
            continue;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let (x0, y0, x1, y1) = (
            (ax - reach) as u32,
            (ay - reach) as u32,
            (ax + reach) as u32,
            (ay + reach) as u32,
        );
        let (cx, cy) = ink_centroid(&out, x0, y0, x1, y1);
        assert!(
            (cx - f64::from(ax)).abs() < 1.0 && (cy - f64::from(ay)).abs() < 1.0,
            "tile at ({ax}, {ay}) inked around ({cx}, {cy})"
        );
        checked += 1;
    }
    assert!(checked >= 4, "only {checked} tiles fit the canvas");
}

#[test]
fn huge_shadow_blur_is_clamped() {
    let compositor = Compositor::new();
    let base = solid(240, 160, [255, 255, 255, 255]);
    let mut wild = styled_text();
    wild.text.shadow = Some(Shadow {
        blur: 1.0e9,
        color: Rgba([0, 0, 0, 255]),
        offset_x: 3.0,
        offset_y: 3.0,
    });
    let mut capped = wild.clone();
    capped.text.shadow = Some(Shadow {
        blur: 50.0,
        color: Rgba([0, 0, 0, 255]),
        offset_x: 3.0,
        offset_y: 3.0,
    });

    let out = compositor.render(&base, &wild, &pro(), RenderFlags::default());
    assert_eq!((out.width(), out.height()), (240, 160));
    assert_ne!(out, base);
    assert_eq!(out, compositor.render(&base, &capped, &pro(), RenderFlags::default()));
}

#[test]
fn huge_stroke_is_clamped() {
    let compositor = Compositor::new();
    let base = solid(240, 160, [255, 255, 255, 255]);
    let mut wild = WatermarkSpec::text("Proof").with_anchor(Anchor::Center);
    wild.text.stroke = Some(Stroke {
        width: 1.0e9,
        color: Rgba([0, 0, 0, 255]),
    });
    let mut capped = wild.clone();
    capped.text.stroke = Some(Stroke {
        width: 20.0,
        color: Rgba([0, 0, 0, 255]),
    });

    let out = compositor.render(&base, &wild, &pro(), RenderFlags::default());
    assert_ne!(out, base);
    assert_eq!(out, compositor.render(&base, &capped, &pro(), RenderFlags::default()));
}

#[test]
fn font_size_is_clamped_to_its_range() {
    let compositor = Compositor::new();
    let base = solid(1000, 400, [0, 0, 0, 255]);
    let mut spec = WatermarkSpec::text("Big").with_anchor(Anchor::Center);
    spec.text.color = Rgba([255, 255, 255, 255]);
    spec.opacity = 1.0;
    spec.text.size = 900.0;

    let out = compositor.render(&base, &spec, &pro(), RenderFlags::default());
    let rows: Vec<u32> = changed_pixels(&out, &base).iter().map(|&(_, y)| y).collect();
    let span = rows.iter().max().unwrap() - rows.iter().min().unwrap() + 1;
    assert!(span <= 200, "text spans {span} rows");

    spec.text.size = 200.0;
    assert_eq!(out, compositor.render(&base, &spec, &pro(), RenderFlags::default()));
}

#[test]
fn image_kind_without_logo_skips_the_layer() {
    let compositor = Compositor::new();
    let base = solid(200, 150, [255, 255, 255, 255]);
    let spec = WatermarkSpec {
        kind: WatermarkKind::Image,
        ..WatermarkSpec::default()
    };

    assert_eq!(compositor.render(&base, &spec, &pro(), RenderFlags::default()), base);

    let free = compositor.render(&base, &spec, &SubscriptionState::free(), RenderFlags::default());
    assert!(!changed_pixels(&free, &base).is_empty(), "branding still drawn");
}

#[test]
fn loader_rejects_oversized_file() {
    let bytes = vec![0xFF; 15 * 1024 * 1024];
    let err = loader::load(&bytes, "image/jpeg", &LoadLimits::BASE_IMAGE).unwrap_err();
    assert!(matches!(err, LoadError::TooLarge { .. }), "{err:?}");
}

#[test]
fn loader_rejects_tiny_image() {
    let bytes = png_bytes(DynamicImage::ImageLuma8(GrayImage::from_pixel(5, 5, Luma([0]))));
    let err = loader::load(&bytes, "image/png", &LoadLimits::BASE_IMAGE).unwrap_err();
    assert_eq!(
        err,
        LoadError::TooSmall {
            width: 5,
            height: 5,
            min: 10
        }
    );
}

#[test]
fn loader_rejects_huge_image() {
    let bytes = png_bytes(DynamicImage::ImageLuma8(GrayImage::new(20_000, 12)));
    let err = loader::load(&bytes, "image/png", &LoadLimits::BASE_IMAGE).unwrap_err();
    assert!(matches!(err, LoadError::TooBig { width: 20_000, .. }), "{err:?}");
}

#[test]
fn loader_rejects_non_image() {
    let err = loader::load(b"just some notes", "text/plain", &LoadLimits::BASE_IMAGE).unwrap_err();
    assert!(matches!(err, LoadError::UnsupportedFormat(_)), "{err:?}");
}

#[test]
fn session_export_includes_overlays_and_restores_preview() {
    let mut session = Session::default();
    let photo = RgbaImage::from_pixel(160, 120, Rgba([30, 30, 30, 255]));
    session
        .load_image(&png_bytes(DynamicImage::ImageRgba8(photo.clone())), "image/png")
        .unwrap();
    session.set_preview(false);

    let now = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
    let exported = session.export(now).unwrap();
    assert_eq!(exported.filename, "awit_watermarked_20240506T070809.png");
    assert!(!session.preview());

    let decoded = image::load_from_memory_with_format(&exported.bytes, ImageFormat::Png)
        .unwrap()
        .to_rgba8();
    assert_eq!(decoded.dimensions(), (160, 120));
    assert_ne!(decoded, photo, "export must carry the overlays");

    let shown = session.render().unwrap();
    assert_eq!(shown.pixels(), &photo);
}

#[test]
fn session_export_without_photo_reports_no_image() {
    let mut session = Session::default();
    session.set_preview(false);
    assert!(matches!(session.export(Utc::now()), Err(ExportError::NoImage)));
    assert!(!session.preview());
}
