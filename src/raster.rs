//! Raster capture – paints a frozen [`SheetLayout`] into a `tiny-skia`
//! pixmap. Used by the compact pathway's image and paginated exports.
//!
//! Coordinates stay in PDF points with a top-left origin; one scale
//! transform maps them to device pixels. Glyph outlines come straight from
//! `ttf-parser`, so without loaded faces text is laid out but not painted.

use std::collections::{BTreeMap, HashMap};

use tiny_skia::{
    FillRule, FilterQuality, IntSize, Paint, PathBuilder, Pixmap, PixmapPaint, Rect, Transform,
};
use ttf_parser::OutlineBuilder;

use crate::assets::LoadedImage;
use crate::fonts::{heuristic_advance, FontManager};
use crate::layout_config::{LayoutBox, SheetLayout, TextContent};

/// Pixel size of a sheet captured at `scale` device pixels per point.
pub fn capture_size(sheet: &SheetLayout, scale: f32) -> (u32, u32) {
    (
        (sheet.width_pt * scale).round().max(1.0) as u32,
        (sheet.height_pt * scale).round().max(1.0) as u32,
    )
}

/// Paint one sheet.
pub fn capture_sheet(
    sheet: &SheetLayout,
    fonts: &FontManager,
    images: &BTreeMap<String, LoadedImage>,
    scale: f32,
) -> Result<Pixmap, String> {
    let (w, h) = capture_size(sheet, scale);
    let mut pixmap =
        Pixmap::new(w, h).ok_or_else(|| format!("cannot allocate a {w}x{h} bitmap"))?;
    pixmap.fill(tiny_skia::Color::WHITE);

    let mut painter = Painter {
        pixmap: &mut pixmap,
        transform: Transform::from_scale(scale, scale),
        fonts,
        faces: fonts
            .faces()
            .iter()
            .map(|f| ttf_parser::Face::parse(&f.bytes, 0).ok())
            .collect(),
        images,
        image_cache: HashMap::new(),
    };
    for b in &sheet.boxes {
        painter.paint_box(b);
    }
    log::debug!("Captured sheet {} at {w}x{h}px", sheet.index);
    Ok(pixmap)
}

pub fn encode_png(pixmap: &Pixmap) -> Result<Vec<u8>, String> {
    pixmap.encode_png().map_err(|e| format!("PNG encode error: {e}"))
}

struct Painter<'a> {
    pixmap: &'a mut Pixmap,
    transform: Transform,
    fonts: &'a FontManager,
    faces: Vec<Option<ttf_parser::Face<'a>>>,
    images: &'a BTreeMap<String, LoadedImage>,
    image_cache: HashMap<String, Option<Pixmap>>,
}

fn paint_for(color: [f32; 4], opacity: f32) -> Paint<'static> {
    let mut paint = Paint::default();
    let alpha = (color[3] * opacity).clamp(0.0, 1.0);
    paint.set_color(
        tiny_skia::Color::from_rgba(color[0], color[1], color[2], alpha)
            .unwrap_or(tiny_skia::Color::BLACK),
    );
    paint.anti_alias = true;
    paint
}

impl Painter<'_> {
    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, paint: &Paint<'_>) {
        if let Some(rect) = Rect::from_xywh(x, y, w, h) {
            self.pixmap.fill_rect(rect, paint, self.transform, None);
        }
    }

    fn paint_box(&mut self, b: &LayoutBox) {
        if let Some(bg) = b.background_color {
            let paint = paint_for(bg, b.opacity);
            self.fill_rect(b.x, b.y, b.width, b.height, &paint);
        }

        if let Some(border) = &b.border {
            let paint = paint_for(border.color, b.opacity);
            let t = border.width;
            self.fill_rect(b.x, b.y + b.height - t, b.width, t, &paint);
            if !border.bottom_only {
                self.fill_rect(b.x, b.y, b.width, t, &paint);
                self.fill_rect(b.x, b.y, t, b.height, &paint);
                self.fill_rect(b.x + b.width - t, b.y, t, b.height, &paint);
            }
        }

        if let Some(img) = &b.image {
            self.paint_image(&img.src, b);
        }

        if let Some(text) = &b.text {
            self.paint_text(text, b);
        }

        for child in &b.children {
            self.paint_box(child);
        }
    }

    fn paint_image(&mut self, src: &str, b: &LayoutBox) {
        let images = self.images;
        let source = self
            .image_cache
            .entry(src.to_string())
            .or_insert_with(|| images.get(src).and_then(premultiplied_pixmap));
        let Some(source) = source.as_ref() else {
            return;
        };
        let sx = b.width / source.width() as f32;
        let sy = b.height / source.height() as f32;
        let paint = PixmapPaint {
            opacity: b.opacity.clamp(0.0, 1.0),
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        let ts = self
            .transform
            .pre_concat(Transform::from_row(sx, 0.0, 0.0, sy, b.x, b.y));
        self.pixmap.draw_pixmap(0, 0, source.as_ref(), &paint, ts, None);
    }

    fn paint_text(&mut self, text: &TextContent, b: &LayoutBox) {
        let paint = paint_for(text.color, b.opacity);
        for line in &text.lines {
            let mut pen_x = b.x + line.x_offset;
            let baseline = b.y + line.y_offset + text.ascent;
            for run in self.fonts.runs(&line.text) {
                let face = run
                    .face
                    .and_then(|i| self.faces.get(i))
                    .and_then(|f| f.as_ref());
                let Some(face) = face else {
                    pen_x += run
                        .text
                        .chars()
                        .map(|c| heuristic_advance(c, text.bold) * text.font_size)
                        .sum::<f32>();
                    continue;
                };
                let scale = text.font_size / face.units_per_em() as f32;
                for c in run.text.chars() {
                    let Some(gid) = face.glyph_index(c) else {
                        pen_x += heuristic_advance(c, text.bold) * text.font_size;
                        continue;
                    };
                    let mut builder = GlyphPathBuilder::new(pen_x, baseline, scale);
                    if face.outline_glyph(gid, &mut builder).is_some() {
                        if let Some(path) = builder.finish() {
                            self.pixmap
                                .fill_path(&path, &paint, FillRule::Winding, self.transform, None);
                        }
                    }
                    pen_x += face.glyph_hor_advance(gid).unwrap_or(0) as f32 * scale;
                }
            }
        }
    }
}

/// tiny-skia wants premultiplied pixels.
fn premultiplied_pixmap(img: &LoadedImage) -> Option<Pixmap> {
    let mut data = img.rgba.clone();
    for px in data.chunks_exact_mut(4) {
        let a = px[3] as u16;
        for c in &mut px[..3] {
            *c = ((*c as u16 * a + 127) / 255) as u8;
        }
    }
    Pixmap::from_vec(data, IntSize::from_wh(img.width, img.height)?)
}

/// Glyph outline sink. Font units are y-up; the sheet is y-down, so the
/// y axis is flipped around the baseline.
struct GlyphPathBuilder {
    builder: PathBuilder,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

impl GlyphPathBuilder {
    fn new(origin_x: f32, origin_y: f32, scale: f32) -> Self {
        Self {
            builder: PathBuilder::new(),
            origin_x,
            origin_y,
            scale,
        }
    }

    fn finish(self) -> Option<tiny_skia::Path> {
        self.builder.finish()
    }

    fn map(&self, x: f32, y: f32) -> (f32, f32) {
        (self.origin_x + x * self.scale, self.origin_y - y * self.scale)
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x, y) = self.map(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x2, y2) = self.map(x2, y2);
        let (x, y) = self.map(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout_config::BorderStyle;
    use crate::template::{PageProfile, SheetKind};

    fn sheet(boxes: Vec<LayoutBox>) -> SheetLayout {
        SheetLayout {
            index: 0,
            kind: SheetKind::Prayer,
            profile: PageProfile::HalfSize,
            width_pt: PageProfile::HalfSize.width_pt(),
            height_pt: PageProfile::HalfSize.height_pt(),
            boxes,
        }
    }

    #[test]
    fn size_follows_profile_and_scale() {
        let s = sheet(Vec::new());
        let (w, h) = capture_size(&s, 2.0);
        let aspect = w as f32 / h as f32;
        assert!((aspect - PageProfile::HalfSize.aspect()).abs() < 0.01);
        let pixmap = capture_sheet(&s, &FontManager::default(), &BTreeMap::new(), 2.0).unwrap();
        assert_eq!((pixmap.width(), pixmap.height()), (w, h));
    }

    #[test]
    fn paints_background_and_rule() {
        let mut bg = LayoutBox::new(10.0, 10.0, 50.0, 20.0);
        bg.background_color = Some([1.0, 0.0, 0.0, 1.0]);
        let mut rule = LayoutBox::new(10.0, 100.0, 50.0, 20.0);
        rule.border = Some(BorderStyle {
            width: 2.0,
            color: [0.0, 0.0, 0.0, 1.0],
            bottom_only: true,
        });
        let pixmap =
            capture_sheet(&sheet(vec![bg, rule]), &FontManager::default(), &BTreeMap::new(), 1.0)
                .unwrap();

        let red = pixmap.pixel(30, 20).unwrap();
        assert_eq!((red.red(), red.green(), red.blue()), (255, 0, 0));
        let line = pixmap.pixel(30, 119).unwrap();
        assert_eq!((line.red(), line.green(), line.blue()), (0, 0, 0));
        let above = pixmap.pixel(30, 110).unwrap();
        assert_eq!(above.red(), 255);
        assert_eq!(above.green(), 255);
    }

    #[test]
    fn png_has_signature() {
        let pixmap = capture_sheet(&sheet(Vec::new()), &FontManager::default(), &BTreeMap::new(), 0.5)
            .unwrap();
        let png = encode_png(&pixmap).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
