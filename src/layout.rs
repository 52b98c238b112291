//! Layout engine – uses Taffy to compute flexbox layout for one sheet of
//! parsed markup, then freezes the result into a [`SheetLayout`].
//!
//! Text blocks become measured leaves: Taffy asks for their size under the
//! available width, we wrap with [`wrap_text`] and answer. Once layout is
//! final the same wrapping is repeated against the definitive content width
//! so the frozen lines match the box they sit in.

use std::collections::HashMap;
use taffy::prelude::*;

use crate::fonts::{wrap_text, FontManager};
use crate::layout_config::{BorderStyle, ImageContent, LayoutBox, SheetLayout, TextContent, TextLine};
use crate::markup::{Element, Node, Tag};
use crate::style::{self, resolve_style, ComputedStyle, Length, PT_PER_PX};
use crate::template::{PageProfile, SheetKind};

/// Intrinsic pixel sizes of the images that finished loading, keyed by the
/// `src` attribute they were referenced with. Images missing from the map
/// are hidden.
pub type ImageSizes = HashMap<String, (u32, u32)>;

/// Per-leaf measurement context stored inside the Taffy tree.
#[derive(Debug, Clone)]
enum Leaf {
    Text {
        text: String,
        font_size: f32,
        bold: bool,
        line_height: f32,
    },
    Image {
        src: String,
        width_pt: f32,
        height_pt: f32,
    },
}

struct LayoutBuilder<'a> {
    taffy: TaffyTree<Leaf>,
    fonts: &'a FontManager,
    images: &'a ImageSizes,
    node_styles: HashMap<NodeId, ComputedStyle>,
}

impl<'a> LayoutBuilder<'a> {
    fn new(fonts: &'a FontManager, images: &'a ImageSizes) -> Self {
        let mut taffy = TaffyTree::new();
        // Sheets are sized in mm; snapping to whole points would skew them.
        taffy.disable_rounding();
        Self {
            taffy,
            fonts,
            images,
            node_styles: HashMap::new(),
        }
    }

    /// True when every child is text or an inline element (no block children).
    fn all_inline(children: &[Node]) -> bool {
        children.iter().all(|c| match c {
            Node::Text(_) => true,
            Node::Element(e) => e.tag.is_inline() && Self::all_inline(&e.children),
        })
    }

    fn is_text_leaf(element: &Element) -> bool {
        if element.children.is_empty() {
            return false;
        }
        (element.tag.is_text_block() || matches!(element.tag, Tag::Div | Tag::Span))
            && Self::all_inline(&element.children)
    }

    fn build_node(
        &mut self,
        element: &Element,
        parent: Option<&ComputedStyle>,
    ) -> Result<Option<NodeId>, String> {
        let style = resolve_style(element, parent);
        if style.display == style::Display::None {
            return Ok(None);
        }

        if element.tag == Tag::Img {
            let src = element.attr("src").unwrap_or_default();
            let Some(&(px_w, px_h)) = self.images.get(src) else {
                log::debug!("Image {src:?} is not available, hiding it");
                return Ok(None);
            };
            let leaf = Leaf::Image {
                src: src.to_string(),
                width_pt: px_w as f32 * PT_PER_PX,
                height_pt: px_h as f32 * PT_PER_PX,
            };
            return self.new_leaf(&style, leaf).map(Some);
        }

        if Self::is_text_leaf(element) {
            let text = element.inline_text().trim().to_string();
            if !text.is_empty() {
                return self.new_leaf(&style, Self::text_leaf(text, &style)).map(Some);
            }
        }

        let mut child_nodes = Vec::new();
        for child in &element.children {
            let id = match child {
                Node::Element(e) => self.build_node(e, Some(&style))?,
                // Loose text next to block siblings flows as its own block.
                Node::Text(t) if !t.trim().is_empty() => {
                    let mut anon = style.clone();
                    anon.padding = [0.0; 4];
                    anon.margin = [0.0; 4];
                    anon.border_all = 0.0;
                    anon.border_bottom = 0.0;
                    anon.background = None;
                    anon.width = Length::Auto;
                    anon.height = Length::Auto;
                    anon.min_height = Length::Auto;
                    anon.position = style::Position::Relative;
                    Some(self.new_leaf(&anon, Self::text_leaf(t.trim().to_string(), &anon))?)
                }
                Node::Text(_) => None,
            };
            child_nodes.extend(id);
        }

        let node = self
            .taffy
            .new_with_children(computed_to_taffy(&style), &child_nodes)
            .map_err(|e| format!("Failed to create layout node: {e}"))?;
        self.node_styles.insert(node, style);
        Ok(Some(node))
    }

    fn text_leaf(text: String, style: &ComputedStyle) -> Leaf {
        Leaf::Text {
            text,
            font_size: style.font_size,
            bold: style.bold,
            line_height: style.line_height,
        }
    }

    fn new_leaf(&mut self, style: &ComputedStyle, leaf: Leaf) -> Result<NodeId, String> {
        let node = self
            .taffy
            .new_leaf_with_context(computed_to_taffy(style), leaf)
            .map_err(|e| format!("Failed to create layout leaf: {e}"))?;
        self.node_styles.insert(node, style.clone());
        Ok(node)
    }

    fn compute(&mut self, root: NodeId, width: f32, height: f32) -> Result<(), String> {
        let fonts = self.fonts;
        self.taffy
            .compute_layout_with_measure(
                root,
                Size {
                    width: AvailableSpace::Definite(width),
                    height: AvailableSpace::Definite(height),
                },
                |known, available, _node, leaf, _style| measure(known, available, leaf, fonts),
            )
            .map_err(|e| format!("Layout computation failed: {e}"))
    }

    /// Extract positioned boxes after layout computation.
    fn extract(&self, node: NodeId, offset_x: f32, offset_y: f32) -> Result<LayoutBox, String> {
        let layout = self
            .taffy
            .layout(node)
            .map_err(|e| format!("Missing layout: {e}"))?;
        let style = self.node_styles.get(&node).cloned().unwrap_or_default();

        let x = offset_x + layout.location.x;
        let y = offset_y + layout.location.y;
        let mut out = LayoutBox::new(x, y, layout.size.width, layout.size.height);
        out.background_color = style.background.map(style::Color::to_array);
        out.opacity = style.opacity;
        out.border = if style.border_all > 0.0 {
            Some(BorderStyle {
                width: style.border_all,
                color: style.border_color.to_array(),
                bottom_only: false,
            })
        } else if style.border_bottom > 0.0 {
            Some(BorderStyle {
                width: style.border_bottom,
                color: style.border_color.to_array(),
                bottom_only: true,
            })
        } else {
            None
        };

        match self.taffy.get_node_context(node) {
            Some(Leaf::Text {
                text,
                font_size,
                bold,
                line_height,
            }) => {
                out.text = Some(self.freeze_text(
                    text,
                    *font_size,
                    *bold,
                    *line_height,
                    &style,
                    layout.size.width,
                ));
            }
            Some(Leaf::Image { src, .. }) => {
                out.image = Some(ImageContent { src: src.clone() });
            }
            None => {}
        }

        for child in self.taffy.children(node).unwrap_or_default() {
            out.children.push(self.extract(child, x, y)?);
        }
        Ok(out)
    }

    fn freeze_text(
        &self,
        text: &str,
        font_size: f32,
        bold: bool,
        line_height: f32,
        style: &ComputedStyle,
        box_width: f32,
    ) -> TextContent {
        let [pad_top, pad_right, _, pad_left] = style.padding;
        let border = style.border_all;
        let content_left = pad_left + border;
        let content_width = (box_width - pad_left - pad_right - 2.0 * border).max(0.0);
        let line_h = font_size * line_height;

        let lines = wrap_text(
            text,
            font_size,
            bold,
            content_width.max(f32::MIN_POSITIVE),
            self.fonts,
        )
        .into_iter()
        .enumerate()
        .map(|(i, line)| {
            let width = self.fonts.measure_text_width(&line, font_size, bold);
            let slack = (content_width - width).max(0.0);
            let align = match style.text_align {
                style::TextAlign::Left => 0.0,
                style::TextAlign::Center => slack / 2.0,
                style::TextAlign::Right => slack,
            };
            TextLine {
                text: line,
                x_offset: content_left + align,
                y_offset: pad_top + border + i as f32 * line_h,
                width,
            }
        })
        .collect();

        TextContent {
            lines,
            font_size,
            bold,
            color: style.color.to_array(),
            line_height: line_h,
            ascent: (line_h - font_size) / 2.0 + self.fonts.ascender(font_size),
        }
    }
}

/// Taffy measure callback for text and image leaves.
fn measure(
    known: Size<Option<f32>>,
    available: Size<AvailableSpace>,
    leaf: Option<&mut Leaf>,
    fonts: &FontManager,
) -> Size<f32> {
    if let Size {
        width: Some(width),
        height: Some(height),
    } = known
    {
        return Size { width, height };
    }
    match leaf {
        None => Size::ZERO,
        Some(Leaf::Text {
            text,
            font_size,
            bold,
            line_height,
        }) => {
            let max_width = known.width.unwrap_or(match available.width {
                AvailableSpace::Definite(w) => w.max(f32::MIN_POSITIVE),
                // Narrowest: break at every opportunity.
                AvailableSpace::MinContent => f32::MIN_POSITIVE,
                // Zero disables wrapping.
                AvailableSpace::MaxContent => 0.0,
            });
            let lines = wrap_text(text, *font_size, *bold, max_width, fonts);
            let width = lines
                .iter()
                .map(|l| fonts.measure_text_width(l, *font_size, *bold))
                .fold(0.0f32, f32::max);
            Size {
                width: known.width.unwrap_or(width),
                height: known
                    .height
                    .unwrap_or(lines.len() as f32 * *font_size * *line_height),
            }
        }
        Some(Leaf::Image {
            width_pt,
            height_pt,
            ..
        }) => {
            let aspect = if *height_pt > 0.0 { *width_pt / *height_pt } else { 1.0 };
            match (known.width, known.height) {
                (Some(w), None) => Size {
                    width: w,
                    height: w / aspect,
                },
                (None, Some(h)) => Size {
                    width: h * aspect,
                    height: h,
                },
                _ => Size {
                    width: *width_pt,
                    height: *height_pt,
                },
            }
        }
    }
}

fn dimension(length: Length) -> Dimension {
    match length {
        Length::Auto => Dimension::Auto,
        Length::Pt(v) => Dimension::Length(v),
        Length::Percent(p) => Dimension::Percent(p / 100.0),
    }
}

fn inset(length: Length) -> LengthPercentageAuto {
    match length {
        Length::Auto => LengthPercentageAuto::Auto,
        Length::Pt(v) => LengthPercentageAuto::Length(v),
        Length::Percent(p) => LengthPercentageAuto::Percent(p / 100.0),
    }
}

fn computed_to_taffy(s: &ComputedStyle) -> Style {
    let [mt, mr, mb, ml] = s.margin;
    let [pt, pr, pb, pl] = s.padding;
    Style {
        display: taffy::Display::Flex,
        position: match s.position {
            style::Position::Relative => taffy::Position::Relative,
            style::Position::Absolute => taffy::Position::Absolute,
        },
        inset: Rect {
            top: inset(s.top),
            left: inset(s.left),
            right: LengthPercentageAuto::Auto,
            bottom: LengthPercentageAuto::Auto,
        },
        flex_direction: match s.direction {
            style::Direction::Row => taffy::FlexDirection::Row,
            style::Direction::Column => taffy::FlexDirection::Column,
        },
        justify_content: Some(match s.justify {
            style::Justify::Start => taffy::JustifyContent::Start,
            style::Justify::End => taffy::JustifyContent::End,
            style::Justify::Center => taffy::JustifyContent::Center,
            style::Justify::SpaceBetween => taffy::JustifyContent::SpaceBetween,
            style::Justify::SpaceAround => taffy::JustifyContent::SpaceAround,
            style::Justify::SpaceEvenly => taffy::JustifyContent::SpaceEvenly,
        }),
        align_items: Some(match s.align_items {
            style::Align::Start => taffy::AlignItems::Start,
            style::Align::End => taffy::AlignItems::End,
            style::Align::Center => taffy::AlignItems::Center,
            style::Align::Baseline => taffy::AlignItems::Baseline,
            style::Align::Stretch => taffy::AlignItems::Stretch,
        }),
        flex_grow: s.flex_grow,
        flex_shrink: s.flex_shrink,
        size: Size {
            width: dimension(s.width),
            height: dimension(s.height),
        },
        min_size: Size {
            width: Dimension::Auto,
            height: dimension(s.min_height),
        },
        margin: Rect {
            top: LengthPercentageAuto::Length(mt),
            right: LengthPercentageAuto::Length(mr),
            bottom: LengthPercentageAuto::Length(mb),
            left: LengthPercentageAuto::Length(ml),
        },
        padding: Rect {
            top: LengthPercentage::Length(pt),
            right: LengthPercentage::Length(pr),
            bottom: LengthPercentage::Length(pb),
            left: LengthPercentage::Length(pl),
        },
        border: Rect {
            top: LengthPercentage::Length(s.border_all),
            right: LengthPercentage::Length(s.border_all),
            bottom: LengthPercentage::Length(s.border_all.max(s.border_bottom)),
            left: LengthPercentage::Length(s.border_all),
        },
        gap: Size {
            width: LengthPercentage::Length(s.gap),
            height: LengthPercentage::Length(s.gap),
        },
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Lay out one sheet. `root` is the parsed `<sheet>` element; its box is
/// forced to the profile's physical size.
pub fn layout_sheet(
    root: &Element,
    index: usize,
    kind: SheetKind,
    profile: PageProfile,
    fonts: &FontManager,
    images: &ImageSizes,
) -> Result<SheetLayout, String> {
    let width = profile.width_pt();
    let height = profile.height_pt();
    let mut builder = LayoutBuilder::new(fonts, images);

    let mut root_style = resolve_style(root, None);
    root_style.display = style::Display::Flex;
    root_style.position = style::Position::Relative;
    root_style.width = Length::Pt(width);
    root_style.height = Length::Pt(height);

    let mut child_ids = Vec::new();
    for child in &root.children {
        if let Node::Element(e) = child {
            child_ids.extend(builder.build_node(e, Some(&root_style))?);
        }
    }
    let root_id = builder
        .taffy
        .new_with_children(computed_to_taffy(&root_style), &child_ids)
        .map_err(|e| format!("Failed to create sheet root: {e}"))?;
    builder.node_styles.insert(root_id, root_style);

    builder.compute(root_id, width, height)?;
    let root_box = builder.extract(root_id, 0.0, 0.0)?;

    Ok(SheetLayout {
        index,
        kind,
        profile,
        width_pt: width,
        height_pt: height,
        boxes: vec![root_box],
    })
}
