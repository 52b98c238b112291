//! Font loading and text measurement using `ttf-parser`.
//!
//! Certificates mix three scripts (Han, Tibetan, Latin) that no single
//! face covers, so the manager keeps an ordered fallback list and picks the
//! first face that has a glyph for each character. When no face is loaded
//! (or none covers a character) we fall back to per-script heuristic
//! advances so layout still completes deterministically.

use std::cell::RefCell;
use std::collections::HashMap;

/// A loaded font face with metrics in font units.
#[derive(Clone)]
pub struct FontFace {
    pub name: String,
    /// Raw font bytes (kept alive for ttf-parser's zero-copy API).
    pub bytes: Vec<u8>,
    pub units_per_em: f32,
    pub ascender: f32,
    pub descender: f32,
}

impl std::fmt::Debug for FontFace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontFace")
            .field("name", &self.name)
            .field("bytes", &self.bytes.len())
            .field("units_per_em", &self.units_per_em)
            .finish()
    }
}

/// A maximal run of text drawn with one face (`None` = no face covers it).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontRun<'t> {
    pub face: Option<usize>,
    pub text: &'t str,
}

/// Ordered fallback list of faces.
#[derive(Debug, Clone, Default)]
pub struct FontManager {
    faces: Vec<FontFace>,
    /// Covering face and advance in ems, per character.
    glyphs: RefCell<HashMap<char, Option<(usize, f32)>>>,
}

impl FontManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a TTF/OTF face to the fallback list.
    pub fn load_font(&mut self, name: &str, bytes: Vec<u8>) -> Result<(), String> {
        let face = ttf_parser::Face::parse(&bytes, 0)
            .map_err(|e| format!("Failed to parse font {name}: {e}"))?;
        let data = FontFace {
            name: name.to_string(),
            units_per_em: face.units_per_em() as f32,
            ascender: face.ascender() as f32,
            descender: face.descender() as f32,
            bytes,
        };
        log::debug!("Loaded font face {} ({} bytes)", data.name, data.bytes.len());
        self.faces.push(data);
        self.glyphs.get_mut().clear();
        Ok(())
    }

    pub fn faces(&self) -> &[FontFace] {
        &self.faces
    }

    pub fn has_real_fonts(&self) -> bool {
        !self.faces.is_empty()
    }

    /// First face with a glyph for `c`, and that glyph's advance in ems.
    fn lookup(&self, c: char) -> Option<(usize, f32)> {
        if let Some(hit) = self.glyphs.borrow().get(&c) {
            return *hit;
        }
        let found = self.faces.iter().enumerate().find_map(|(i, data)| {
            let face = ttf_parser::Face::parse(&data.bytes, 0).ok()?;
            let gid = face.glyph_index(c)?;
            let advance = face.glyph_hor_advance(gid).unwrap_or(0) as f32;
            Some((i, advance / data.units_per_em))
        });
        self.glyphs.borrow_mut().insert(c, found);
        found
    }

    /// Split `text` into runs that share a covering face.
    pub fn runs<'t>(&self, text: &'t str) -> Vec<FontRun<'t>> {
        let face_for = |c: char| self.lookup(c).map(|(face, _)| face);

        let mut runs: Vec<FontRun<'t>> = Vec::new();
        let mut start = 0;
        let mut current: Option<Option<usize>> = None;
        for (i, c) in text.char_indices() {
            // Spaces join whichever run they sit in.
            let face = if c == ' ' {
                current.unwrap_or_else(|| face_for(c))
            } else {
                face_for(c)
            };
            match current {
                Some(cur) if cur == face => {}
                Some(cur) => {
                    runs.push(FontRun {
                        face: cur,
                        text: &text[start..i],
                    });
                    start = i;
                    current = Some(face);
                }
                None => current = Some(face),
            }
        }
        if let Some(face) = current {
            runs.push(FontRun {
                face,
                text: &text[start..],
            });
        }
        runs
    }

    /// Width of `text` in points at `font_size`.
    pub fn measure_text_width(&self, text: &str, font_size: f32, bold: bool) -> f32 {
        text.chars()
            .map(|c| match self.lookup(c) {
                Some((_, advance)) => advance * font_size,
                None => heuristic_advance(c, bold) * font_size,
            })
            .sum()
    }

    /// Ascender in points for the primary face (0.8 em without fonts).
    pub fn ascender(&self, font_size: f32) -> f32 {
        match self.faces.first() {
            Some(f) => f.ascender * font_size / f.units_per_em,
            None => font_size * 0.8,
        }
    }
}

/// Advance in ems used when no loaded face covers `c`.
pub fn heuristic_advance(c: char, bold: bool) -> f32 {
    match script_of(c) {
        Script::Han => 1.0,
        Script::TibetanMark => 0.0,
        Script::Tibetan => 0.55,
        Script::Other if c == ' ' => 0.28,
        Script::Other => {
            if bold {
                0.55
            } else {
                0.5
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Script {
    Han,
    Tibetan,
    /// Vowel signs and subjoined letters stack on the preceding letter.
    TibetanMark,
    Other,
}

fn script_of(c: char) -> Script {
    match c as u32 {
        0x2E80..=0x303F | 0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xF900..=0xFAFF | 0xFF00..=0xFFEF => {
            Script::Han
        }
        0x0F71..=0x0F84 | 0x0F8D..=0x0FBC => Script::TibetanMark,
        0x0F00..=0x0FFF => Script::Tibetan,
        _ => Script::Other,
    }
}

/// Split a paragraph into break-separated tokens.
///
/// Latin words break at spaces, every Han character is its own token, and
/// Tibetan syllables break after the tsheg or shad.
fn tokens(paragraph: &str) -> Vec<(bool, String)> {
    let mut out: Vec<(bool, String)> = Vec::new();
    let mut current = String::new();
    let mut space_before = false;

    let flush = |current: &mut String, space_before: &mut bool, out: &mut Vec<(bool, String)>| {
        if !current.is_empty() {
            out.push((*space_before, std::mem::take(current)));
            *space_before = false;
        }
    };

    for c in paragraph.chars() {
        if c.is_whitespace() && c != '\u{00A0}' {
            flush(&mut current, &mut space_before, &mut out);
            space_before = !out.is_empty();
            continue;
        }
        match script_of(c) {
            Script::Han => {
                flush(&mut current, &mut space_before, &mut out);
                current.push(c);
                flush(&mut current, &mut space_before, &mut out);
            }
            _ => {
                current.push(c);
                if c == '་' || c == '།' {
                    flush(&mut current, &mut space_before, &mut out);
                }
            }
        }
    }
    flush(&mut current, &mut space_before, &mut out);
    out
}

/// Word-wrap text to fit within `max_width` points. Returns one entry per
/// line; explicit newlines are preserved.
pub fn wrap_text(
    text: &str,
    font_size: f32,
    bold: bool,
    max_width: f32,
    fonts: &FontManager,
) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut line = String::new();
        for (space_before, token) in tokens(paragraph) {
            let candidate = if line.is_empty() {
                token.clone()
            } else if space_before {
                format!("{line} {token}")
            } else {
                format!("{line}{token}")
            };
            if max_width > 0.0
                && !line.is_empty()
                && fonts.measure_text_width(&candidate, font_size, bold) > max_width
            {
                lines.push(std::mem::replace(&mut line, token));
            } else {
                line = candidate;
            }
        }
        lines.push(line);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_widths_by_script() {
        let mgr = FontManager::new();
        assert!((mgr.measure_text_width("Hello", 10.0, false) - 25.0).abs() < 0.01);
        assert!((mgr.measure_text_width("皈依證", 10.0, false) - 30.0).abs() < 0.01);
        // Subjoined/vowel marks take no advance.
        let base = mgr.measure_text_width("ཀ", 10.0, false);
        assert!((mgr.measure_text_width("ཀི", 10.0, false) - base).abs() < 0.01);
    }

    #[test]
    fn wraps_latin_at_spaces() {
        let mgr = FontManager::new();
        let lines = wrap_text("Namo Guru Bhe Namo Buddhaya", 10.0, false, 60.0, &mgr);
        assert!(lines.len() >= 2, "{lines:?}");
        assert!(lines.iter().all(|l| !l.starts_with(' ')));
    }

    #[test]
    fn wraps_han_per_character() {
        let mgr = FontManager::new();
        let lines = wrap_text("無上最勝佛法僧", 10.0, false, 35.0, &mgr);
        assert_eq!(lines, vec!["無上最", "勝佛法", "僧"]);
    }

    #[test]
    fn keeps_explicit_newlines_and_blank_lines() {
        let mgr = FontManager::new();
        let lines = wrap_text("a\n\nb", 10.0, false, 500.0, &mgr);
        assert_eq!(lines, vec!["a", "", "b"]);
    }

    #[test]
    fn runs_without_fonts_are_single() {
        let mgr = FontManager::new();
        let runs = mgr.runs("陳 Chen");
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].face, None);
    }

    #[test]
    fn coverage_is_looked_up_once_per_character() {
        let mgr = FontManager::new();
        let first = mgr.measure_text_width("陳陳陳 a", 10.0, false);
        assert_eq!(mgr.glyphs.borrow().len(), 3);
        let again = mgr.measure_text_width("陳陳陳 a", 10.0, false);
        assert_eq!(first, again);
        mgr.runs("a 陳");
        assert_eq!(mgr.glyphs.borrow().len(), 3);
    }

    #[test]
    fn rejects_garbage_font() {
        let mut mgr = FontManager::new();
        assert!(mgr.load_font("broken", vec![0, 1, 2, 3]).is_err());
        assert!(!mgr.has_real_fonts());
    }
}
