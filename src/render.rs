//! PDF renderer – takes a [`DocumentLayout`] and produces PDF bytes using
//! `printpdf` (v0.8 ops-based API).
//!
//! Two outputs share this module: the vector print stream (one page per
//! sheet at the sheet's own physical size) and the paginated export, where
//! each page carries one captured bitmap instead of vector content.

use std::collections::{BTreeMap, HashMap};

use printpdf::*;

use crate::assets::LoadedImage;
use crate::fonts::FontManager;
use crate::layout_config::*;
use crate::template::PageProfile;

/// A printpdf XObject together with the pixel dimensions of the source image.
struct ImageResource {
    xobj_id: XObjectId,
    px_width: u32,
    px_height: u32,
}

/// Fonts registered with the document, indexed like [`FontManager::faces`].
struct FontResources {
    embedded: Vec<Option<FontId>>,
}

/// Render a document layout into a vector PDF print stream.
///
/// Images that were not loaded, or that printpdf cannot embed, are skipped
/// with a warning. Text not covered by any loaded face falls back to the
/// builtin Helvetica, which only covers Latin-1.
pub fn render_print_pdf(
    layout: &DocumentLayout,
    fonts: &FontManager,
    images: &BTreeMap<String, LoadedImage>,
) -> Result<Vec<u8>, String> {
    if layout.sheets.is_empty() {
        return Err("document has no sheets".to_string());
    }
    let mut doc = PdfDocument::new(&layout.title);
    let mut warnings: Vec<PdfWarnMsg> = Vec::new();

    // ── Fonts ─────────────────────────────────────────────────────────────
    let embedded = fonts
        .faces()
        .iter()
        .map(|face| match ParsedFont::from_bytes(&face.bytes, 0, &mut warnings) {
            Some(parsed) => Some(doc.add_font(&parsed)),
            None => {
                log::warn!("Font {} cannot be embedded, using builtin fallback", face.name);
                None
            }
        })
        .collect();
    let font_resources = FontResources { embedded };

    // ── Images ────────────────────────────────────────────────────────────
    let mut image_resources: HashMap<String, ImageResource> = HashMap::new();
    for (src, img) in images {
        match RawImage::decode_from_bytes(&img.encoded, &mut warnings) {
            Ok(raw) => {
                let xobj_id = doc.add_image(&raw);
                image_resources.insert(
                    src.clone(),
                    ImageResource {
                        xobj_id,
                        px_width: img.width,
                        px_height: img.height,
                    },
                );
            }
            Err(e) => log::warn!("Skipping image {src}: PDF encode error: {e}"),
        }
    }

    // ── Pages ─────────────────────────────────────────────────────────────
    let pages = layout
        .sheets
        .iter()
        .map(|sheet| {
            let mut ops = Vec::new();
            for lbox in &sheet.boxes {
                render_box(
                    &mut ops,
                    lbox,
                    sheet.height_pt,
                    fonts,
                    &font_resources,
                    &image_resources,
                );
            }
            PdfPage::new(
                Mm(sheet.profile.width_mm()),
                Mm(sheet.profile.height_mm()),
                ops,
            )
        })
        .collect();

    doc.with_pages(pages);
    let bytes = doc.save(&PdfSaveOptions::default(), &mut Vec::new());
    log::debug!(
        "Rendered print stream: {} pages, {} bytes",
        layout.sheets.len(),
        bytes.len()
    );
    Ok(bytes)
}

/// One captured page of a paginated export.
pub struct BitmapPage<'a> {
    pub profile: PageProfile,
    pub png: &'a [u8],
    pub px_width: u32,
    pub px_height: u32,
}

/// Assemble PNG captures into a PDF, one full-bleed page per capture, each
/// page sized to its sheet's profile.
pub fn render_bitmap_pdf(title: &str, pages: &[BitmapPage<'_>]) -> Result<Vec<u8>, String> {
    if pages.is_empty() {
        return Err("no captured pages".to_string());
    }
    let mut doc = PdfDocument::new(title);
    let mut warnings: Vec<PdfWarnMsg> = Vec::new();

    let mut pdf_pages = Vec::with_capacity(pages.len());
    for (i, page) in pages.iter().enumerate() {
        let raw = RawImage::decode_from_bytes(page.png, &mut warnings)
            .map_err(|e| format!("page {i}: {e}"))?;
        let xobj_id = doc.add_image(&raw);
        let width_pt = page.profile.width_pt();
        let height_pt = page.profile.height_pt();
        let ops = vec![Op::UseXobject {
            id: xobj_id,
            transform: XObjectTransform {
                translate_x: Some(Pt(0.0)),
                translate_y: Some(Pt(0.0)),
                dpi: Some(72.0),
                scale_x: Some(width_pt / page.px_width.max(1) as f32),
                scale_y: Some(height_pt / page.px_height.max(1) as f32),
                rotate: None,
            },
        }];
        pdf_pages.push(PdfPage::new(
            Mm(page.profile.width_mm()),
            Mm(page.profile.height_mm()),
            ops,
        ));
    }

    doc.with_pages(pdf_pages);
    Ok(doc.save(&PdfSaveOptions::default(), &mut Vec::new()))
}

/// Map text to what the builtin (WinAnsi) fonts can show; anything outside
/// Latin-1 becomes `?`.
fn to_winlatin(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '\u{00A0}' => ' ',
            '\u{20AC}' | '\u{2018}' | '\u{2019}' | '\u{201C}' | '\u{201D}' | '\u{2013}'
            | '\u{2014}' | '\u{2022}' | '\u{2026}' => c,
            c if (c as u32) < 256 => c,
            _ => '?',
        })
        .collect()
}

fn rgb(c: [f32; 4]) -> Color {
    Color::Rgb(Rgb {
        r: c[0],
        g: c[1],
        b: c[2],
        icc_profile: None,
    })
}

fn point(x: f32, y: f32) -> LinePoint {
    LinePoint {
        p: Point { x: Pt(x), y: Pt(y) },
        bezier: false,
    }
}

/// Recursively render a LayoutBox and its children into PDF ops.
fn render_box(
    ops: &mut Vec<Op>,
    lbox: &LayoutBox,
    page_height: f32,
    fonts: &FontManager,
    font_resources: &FontResources,
    images: &HashMap<String, ImageResource>,
) {
    // PDF origin is bottom-left; layout origin is top-left.
    let top = page_height - lbox.y;
    let bottom = top - lbox.height;
    let (left, right) = (lbox.x, lbox.x + lbox.width);

    if let Some(bg) = lbox.background_color {
        ops.push(Op::SetFillColor { col: rgb(bg) });
        ops.push(Op::DrawPolygon {
            polygon: Polygon {
                rings: vec![PolygonRing {
                    points: vec![
                        point(left, bottom),
                        point(right, bottom),
                        point(right, top),
                        point(left, top),
                    ],
                }],
                mode: PaintMode::Fill,
                winding_order: WindingOrder::NonZero,
            },
        });
    }

    if let Some(border) = &lbox.border {
        ops.push(Op::SetOutlineColor {
            col: rgb(border.color),
        });
        ops.push(Op::SetOutlineThickness {
            pt: Pt(border.width),
        });
        // Stroke the centre line of the reserved border band.
        let inset = border.width / 2.0;
        let line = if border.bottom_only {
            Line {
                points: vec![
                    point(left, bottom + inset),
                    point(right, bottom + inset),
                ],
                is_closed: false,
            }
        } else {
            Line {
                points: vec![
                    point(left + inset, top - inset),
                    point(right - inset, top - inset),
                    point(right - inset, bottom + inset),
                    point(left + inset, bottom + inset),
                ],
                is_closed: true,
            }
        };
        ops.push(Op::DrawLine { line });
    }

    if let Some(text) = &lbox.text {
        render_text(ops, lbox, text, top, fonts, font_resources);
    }

    if let Some(img) = &lbox.image {
        if let Some(res) = images.get(&img.src) {
            ops.push(Op::UseXobject {
                id: res.xobj_id.clone(),
                transform: XObjectTransform {
                    translate_x: Some(Pt(left)),
                    translate_y: Some(Pt(bottom)),
                    // At 72 dpi one pixel is one point.
                    dpi: Some(72.0),
                    scale_x: Some(lbox.width / res.px_width.max(1) as f32),
                    scale_y: Some(lbox.height / res.px_height.max(1) as f32),
                    rotate: None,
                },
            });
        }
    }

    for child in &lbox.children {
        render_box(ops, child, page_height, fonts, font_resources, images);
    }
}

fn render_text(
    ops: &mut Vec<Op>,
    lbox: &LayoutBox,
    text: &TextContent,
    top: f32,
    fonts: &FontManager,
    font_resources: &FontResources,
) {
    let builtin = if text.bold {
        BuiltinFont::HelveticaBold
    } else {
        BuiltinFont::Helvetica
    };

    for line in &text.lines {
        if line.text.is_empty() {
            continue;
        }
        let baseline = top - line.y_offset - text.ascent;
        let mut pen_x = lbox.x + line.x_offset;

        for run in fonts.runs(&line.text) {
            let run_width = fonts.measure_text_width(run.text, text.font_size, text.bold);
            if run.text.trim().is_empty() {
                pen_x += run_width;
                continue;
            }
            ops.push(Op::StartTextSection);
            ops.push(Op::SetTextCursor {
                pos: Point {
                    x: Pt(pen_x),
                    y: Pt(baseline),
                },
            });
            ops.push(Op::SetFillColor {
                col: rgb(text.color),
            });
            match run
                .face
                .and_then(|i| font_resources.embedded.get(i).cloned().flatten())
            {
                Some(font) => {
                    ops.push(Op::SetFontSize {
                        size: Pt(text.font_size),
                        font: font.clone(),
                    });
                    ops.push(Op::WriteText {
                        items: vec![TextItem::Text(run.text.to_string())],
                        font,
                    });
                }
                None => {
                    ops.push(Op::SetFontSizeBuiltinFont {
                        size: Pt(text.font_size),
                        font: builtin,
                    });
                    ops.push(Op::WriteTextBuiltinFont {
                        items: vec![TextItem::Text(to_winlatin(run.text))],
                        font: builtin,
                    });
                }
            }
            ops.push(Op::EndTextSection);
            pen_x += run_width;
        }
    }
}
