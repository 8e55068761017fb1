//! Composite diff rendering: three panels plus a labeled caption strip.

use ab_glyph::{Font, FontVec, PxScale, ScaleFont, point};
use image::{Rgb, RgbImage};
use log::debug;

use crate::CompareResult;

const LABEL_SCALE: f32 = 20.0;
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const RED: Rgb<u8> = Rgb([255, 0, 0]);

/// Candidate system font paths for caption text. If none exists the
/// composite is written without labels.
const FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
];

/// Build the `expected | actual | diff` composite with a caption strip.
pub(crate) fn composite(
    expected: &RgbImage,
    actual: &RgbImage,
    result: &CompareResult,
    caption_height: u32,
) -> RgbImage {
    let (width, height) = expected.dimensions();
    let mut out = RgbImage::new(width * 3, height + caption_height);

    image::imageops::replace(&mut out, expected, 0, 0);
    image::imageops::replace(&mut out, actual, i64::from(width), 0);
    image::imageops::replace(&mut out, &result.diff, i64::from(width) * 2, 0);

    let Some(font) = load_font() else {
        debug!("no system font found, writing composite without labels");
        return out;
    };

    let label_y = (height + 5) as i32;
    draw_text(&mut out, "Expected", 10, label_y, &font, WHITE);
    draw_text(&mut out, "Actual", width as i32 + 10, label_y, &font, WHITE);
    draw_text(
        &mut out,
        "Difference (10x)",
        width as i32 * 2 + 10,
        label_y,
        &font,
        WHITE,
    );

    let verdict = if result.passed { "PASS" } else { "FAIL" };
    let caption = format!(
        "Similarity: {:.2}% - {}",
        result.similarity * 100.0,
        verdict
    );
    let color = if result.passed { GREEN } else { RED };
    draw_text(&mut out, &caption, width as i32, label_y + 22, &font, color);

    out
}

fn load_font() -> Option<FontVec> {
    for path in FONT_PATHS {
        if let Ok(bytes) = std::fs::read(path) {
            if let Ok(font) = FontVec::try_from_vec(bytes) {
                return Some(font);
            }
        }
    }
    None
}

/// Rasterize one line of text at (x, y) being the top-left of the line box.
fn draw_text(img: &mut RgbImage, text: &str, x: i32, y: i32, font: &FontVec, color: Rgb<u8>) {
    let scaled = font.as_scaled(PxScale::from(LABEL_SCALE));
    let mut caret = point(x as f32, y as f32 + scaled.ascent());

    for ch in text.chars() {
        let mut glyph = scaled.scaled_glyph(ch);
        glyph.position = caret;
        caret.x += scaled.h_advance(glyph.id);

        let Some(outlined) = font.outline_glyph(glyph) else {
            continue;
        };
        let bounds = outlined.px_bounds();
        outlined.draw(|gx, gy, coverage| {
            let px = bounds.min.x as i32 + gx as i32;
            let py = bounds.min.y as i32 + gy as i32;
            if px < 0 || py < 0 || px as u32 >= img.width() || py as u32 >= img.height() {
                return;
            }
            let dst = img.get_pixel_mut(px as u32, py as u32);
            for c in 0..3 {
                let blended =
                    f32::from(dst.0[c]) * (1.0 - coverage) + f32::from(color.0[c]) * coverage;
                dst.0[c] = blended.round().clamp(0.0, 255.0) as u8;
            }
        });
    }
}
