//! Certificate template – the fixed six-sheet document and the composer
//! that binds one recipient record into it.
//!
//! Sheet count, order and profiles never depend on the record; only the
//! six detail rows carry recipient data. A missing value still produces its
//! row, with an empty `fill-line` slot in place of the text.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::date::localize_date;
use crate::locale::{LabelTable, Locale};
use crate::markup::{escape_attr, escape_text};
use crate::record::RecipientRecord;
use crate::style::PT_PER_MM;

/// Physical sheet size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageProfile {
    /// A6 portrait, 105 × 148 mm.
    HalfSize,
    /// Two A6 panels side by side, 210 × 148 mm.
    DoubleWide,
}

impl PageProfile {
    pub fn width_mm(self) -> f32 {
        match self {
            PageProfile::HalfSize => 105.0,
            PageProfile::DoubleWide => 210.0,
        }
    }

    pub fn height_mm(self) -> f32 {
        148.0
    }

    pub fn width_pt(self) -> f32 {
        self.width_mm() * PT_PER_MM
    }

    pub fn height_pt(self) -> f32 {
        self.height_mm() * PT_PER_MM
    }

    /// Width over height.
    pub fn aspect(self) -> f32 {
        self.width_mm() / self.height_mm()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SheetKind {
    Cover,
    Prayer,
    Detail,
    Doctrine,
    Lineage,
    Contact,
}

impl SheetKind {
    /// Document order.
    pub const ALL: [SheetKind; 6] = [
        SheetKind::Cover,
        SheetKind::Prayer,
        SheetKind::Detail,
        SheetKind::Doctrine,
        SheetKind::Lineage,
        SheetKind::Contact,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SheetKind::Cover => "cover",
            SheetKind::Prayer => "prayer",
            SheetKind::Detail => "detail",
            SheetKind::Doctrine => "doctrine",
            SheetKind::Lineage => "lineage",
            SheetKind::Contact => "contact",
        }
    }

    pub fn profile(self) -> PageProfile {
        match self {
            SheetKind::Cover | SheetKind::Contact => PageProfile::DoubleWide,
            _ => PageProfile::HalfSize,
        }
    }
}

/// One physical sheet of composed markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    pub index: usize,
    pub kind: SheetKind,
    pub profile: PageProfile,
    /// A single `<sheet>` element.
    pub markup: String,
}

/// The complete, ordered certificate for one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSpec {
    pub locale: Locale,
    pub title: String,
    sheets: Vec<Sheet>,
}

impl DocumentSpec {
    /// Full document markup, sheets in order.
    pub fn markup(&self) -> String {
        let mut out = String::new();
        for sheet in &self.sheets {
            out.push_str(&sheet.markup);
            out.push('\n');
        }
        out
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn sheet(&self, kind: SheetKind) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }
}

#[cfg(test)]
impl DocumentSpec {
    pub(crate) fn set_markup(&mut self, index: usize, markup: &str) {
        self.sheets[index].markup = markup.to_string();
    }
}

/// Asset references baked into the static sheets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateComposer {
    pub seal_src: String,
    pub imagery_src: String,
}

impl Default for TemplateComposer {
    fn default() -> Self {
        Self {
            seal_src: "asset:seal.png".to_string(),
            imagery_src: "asset:three-jewels.png".to_string(),
        }
    }
}

/// Tibetan row labels, in row order.
const DETAIL_TIBETAN: [&str; 6] = [
    "སྐྱབས་སྡོམ་ཞུ་མཁན།",
    "གནང་བའི་དུས་ཚོད།",
    "ཞུ་བའི་ས་གནས།",
    "ཆོས་མིང་།",
    "ཆོས་མིང་སྒྲ་བསྒྱུར།",
    "ཆོས་མིང་དོན་བསྒྱུར།",
];

const DETAIL_FIELDS: [(&str, &str); 6] = [
    ("name", "certRecipient"),
    ("date", "certDate"),
    ("place", "certPlace"),
    ("dharma-name", "certDharmaName"),
    ("dharma-name-phonetic", "certDharmaNamePhonetic"),
    ("dharma-name-meaning", "certDharmaNameMeaning"),
];

impl TemplateComposer {
    pub fn new(seal_src: impl Into<String>, imagery_src: impl Into<String>) -> Self {
        Self {
            seal_src: seal_src.into(),
            imagery_src: imagery_src.into(),
        }
    }

    /// Bind `record` into the template. Identical input always produces
    /// byte-identical markup.
    pub fn compose(
        &self,
        record: &RecipientRecord,
        locale: Locale,
        labels: &LabelTable,
    ) -> DocumentSpec {
        let sheets = SheetKind::ALL
            .iter()
            .enumerate()
            .map(|(index, &kind)| {
                let body = match kind {
                    SheetKind::Cover => self.cover(locale, labels),
                    SheetKind::Prayer => prayer(),
                    SheetKind::Detail => self.detail(record, locale, labels),
                    SheetKind::Doctrine => self.doctrine(),
                    SheetKind::Lineage => lineage(),
                    SheetKind::Contact => contact(locale, labels),
                };
                Sheet {
                    index,
                    kind,
                    profile: kind.profile(),
                    markup: wrap_sheet(index, kind, &body),
                }
            })
            .collect();

        let title = match record.name.trim() {
            "" => labels.get(locale, "certificateTitle").to_string(),
            name => format!("{} - {}", labels.get(locale, "certificateTitle"), name),
        };
        log::debug!("Composed {} sheets for record {}", SheetKind::ALL.len(), record.id);
        DocumentSpec {
            locale,
            title,
            sheets,
        }
    }

    fn cover(&self, locale: Locale, labels: &LabelTable) -> String {
        let org = escape_text(labels.get(locale, "organizationName"));
        let title = escape_text(labels.get(locale, "certificateTitle"));
        format!(
            r#"<div class="w-1/2 h-full flex-col justify-center items-center p-10 text-center">
<p class="text-lg text-gold font-bold">{org}</p>
<p class="text-sm text-muted mt-2">ཀཿཐོག་རིག་འཛིན་ཆེན་པོ།</p>
</div>
<div class="w-1/2 h-full flex-col justify-center items-center p-10 text-center border-maroon border">
<p class="text-xl text-maroon">སྐྱབས་འགྲོའི་ལག་འཁྱེར།</p>
<h1 class="text-4xl text-maroon">{title}</h1>
<p class="text-md text-gold">Refuge Certificate</p>
<img src="{seal}" class="opacity-90 mt-6" style="width: 30mm; height: 30mm">
</div>"#,
            seal = escape_attr(&self.seal_src),
        )
    }

    fn detail(&self, record: &RecipientRecord, locale: Locale, labels: &LabelTable) -> String {
        let date = localize_date(&record.refuge_date, locale);
        let values: [Option<&str>; 6] = [
            Some(record.name.trim()).filter(|s| !s.is_empty()),
            Some(date.as_str()).filter(|s| !s.is_empty()),
            Some(record.refuge_place.trim()).filter(|s| !s.is_empty()),
            RecipientRecord::optional(&record.dharma_name),
            RecipientRecord::optional(&record.dharma_name_phonetic),
            RecipientRecord::optional(&record.dharma_name_meaning),
        ];

        let mut out = String::from(
            r#"<div class="text-center mb-2">
<p class="text-md">སྟོན་པ། མཉམ་མེད་ཐུབ་པའི་དབང་པོ་ཤཱཀྱ་རྒྱལ།</p>
<p class="text-base">The Buddha Shakyamuni</p>
<p class="text-md">創教者：無等導師釋迦牟尼佛</p>
</div>
"#,
        );
        let _ = write!(
            out,
            r#"<div class="lama-section relative text-center mb-2" style="min-height: 40mm">
<p>སྐྱབས་རྗེ། གནང་མཁན།</p>
<p>ཀཿཐོག་རིག་འཛིན་ཆེན་པོ་རྒྱལ་བ་ཆེན་པོ།</p>
<p>Refuge Lama: H.E.Kathog Rigzin Chenpo</p>
<p>傳皈依戒師：噶陀仁珍千寶</p>
<img src="{}" class="seal absolute opacity-90" style="top: 2.5mm; left: 25mm; width: 35mm; height: 35mm">
</div>
<div class="details mt-1">
"#,
            escape_attr(&self.seal_src)
        );

        for ((field, label_key), (tibetan, value)) in DETAIL_FIELDS
            .iter()
            .zip(DETAIL_TIBETAN.iter().zip(values))
        {
            let label = escape_text(labels.get(locale, label_key));
            let (class, text) = match value {
                Some(v) => ("detail-value flex-1 ml-2 border-b pb-1", escape_text(v)),
                None => ("detail-value flex-1 ml-2 fill-line", String::new()),
            };
            let _ = writeln!(
                out,
                r#"<div class="detail-row flex items-end mb-2" data-field="{field}"><div class="detail-label shrink-0 text-sm" style="width: 45mm"><span class="text-xs">{tibetan}</span><br><span>{label}</span></div><div class="{class}">{text}</div></div>"#,
            );
        }
        out.push_str("</div>\n");
        out.push_str(&page_number(2));
        out
    }

    fn doctrine(&self) -> String {
        format!(
            r#"<div class="flex-col items-center text-center">
<h2 class="text-maroon">三寶 · The Three Jewels</h2>
<p class="text-md">དཀོན་མཆོག་གསུམ།</p>
<img src="{}" class="my-2" style="width: 50mm">
<p class="text-md leading-loose">皈依佛，兩足尊<br>皈依法，離欲尊<br>皈依僧，眾中尊</p>
<p class="text-sm">I take refuge in the Buddha, foremost among humans; in the Dharma, free from attachment; in the Sangha, foremost among assemblies.</p>
</div>
{}"#,
            escape_attr(&self.imagery_src),
            page_number(4)
        )
    }
}

/// Compose with the default asset references.
pub fn compose(record: &RecipientRecord, locale: Locale, labels: &LabelTable) -> DocumentSpec {
    TemplateComposer::default().compose(record, locale, labels)
}

fn wrap_sheet(index: usize, kind: SheetKind, body: &str) -> String {
    let class = match kind.profile() {
        PageProfile::DoubleWide => "flex bg-cream",
        PageProfile::HalfSize => "flex-col px-10 py-8 bg-cream",
    };
    format!(
        "<sheet kind=\"{}\" index=\"{index}\" class=\"{class}\">\n{body}\n</sheet>",
        kind.name()
    )
}

fn page_number(n: usize) -> String {
    format!(
        r#"<div class="page-number absolute text-center text-xs text-muted" style="top: 132mm; left: 0; width: 100%">{n}</div>"#
    )
}

fn prayer() -> String {
    format!(
        r#"<div class="flex-1 flex-col justify-center items-center text-center">
<h1 class="font-normal">日 誦 皈 依 文</h1>
<p class="text-lg leading-loose mb-4">無上最勝佛法僧<br>直至菩提我皈依<br>六度萬行諸功德<br>為利眾生願成佛</p>
<p class="text-md mb-4" style="line-height: 1.8">Namo Guru Bhe<br>Namo Buddhaya<br>Namo Dharmaya<br>Namo Sanghaya</p>
<p class="text-lg mb-4">ཨོཾ་ཨཱཿཧཱུྃ་བཛྲ་གུ་རུ་པདྨ་སིདྡྷི་ཧཱུྃ།</p>
<p class="text-md">嗡阿吽 邊雜 咕嚕 貝瑪 悉地 吽</p>
</div>
{}"#,
        page_number(1)
    )
}

fn lineage() -> String {
    format!(
        r#"<div class="flex-col">
<h2 class="text-maroon text-center">噶陀傳承 · The Kathog Lineage</h2>
<p class="text-sm leading-normal">噶陀寺由噶當巴德謝於西元一一五九年創建於康區，為寧瑪派六大主寺中最古老者，以傳承經教與修持並重聞名。</p>
<p class="text-sm leading-normal mt-2">Kathog Monastery was founded in 1159 by Kadampa Deshek in eastern Tibet. The oldest of the six great Nyingma seats, it is renowned for upholding both the scriptural and the practice lineages.</p>
<p class="text-sm leading-normal mt-2">仁珍千寶法王為噶陀傳承持有者，慈悲傳授皈依戒，令弟子得入佛門。</p>
</div>
{}"#,
        page_number(5)
    )
}

fn contact(locale: Locale, labels: &LabelTable) -> String {
    let org = escape_text(labels.get(locale, "organizationName"));
    format!(
        r#"<div class="w-1/2 h-full flex-col justify-center items-center p-10 text-center">
<p class="text-lg text-gold font-bold mb-2">{org}</p>
<p class="text-sm">如有任何問題，歡迎與本會聯絡。</p>
<p class="text-sm">For any enquiries, please contact the association.</p>
</div>
<div class="w-1/2 h-full flex-col justify-center items-center p-10 text-center">
<p class="text-md text-maroon">願一切眾生離苦得樂</p>
<p class="text-sm">May all beings be free from suffering and its causes.</p>
<p class="text-md mt-2">སེམས་ཅན་ཐམས་ཅད་བདེ་བ་དང་བདེ་བའི་རྒྱུ་དང་ལྡན་པར་གྱུར་ཅིག</p>
</div>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::{parse_markup, Element, Node};

    fn record() -> RecipientRecord {
        RecipientRecord {
            id: 1,
            name: "陳小明".into(),
            refuge_date: "2024-01-15".into(),
            refuge_place: "台北".into(),
            dharma_name: Some(String::new()),
            ..Default::default()
        }
    }

    fn parse_sheet(sheet: &Sheet) -> Element {
        match parse_markup(&sheet.markup).unwrap().into_iter().next() {
            Some(Node::Element(e)) => e,
            other => panic!("expected sheet element, got {other:?}"),
        }
    }

    fn detail_rows(spec: &DocumentSpec) -> Vec<(String, String, bool)> {
        let root = parse_sheet(spec.sheet(SheetKind::Detail).unwrap());
        let mut rows = Vec::new();
        root.walk(&mut |e| {
            if e.classes().any(|c| c == "detail-row") {
                let mut value = None;
                e.walk(&mut |v| {
                    if v.classes().any(|c| c == "detail-value") {
                        value = Some((v.inline_text(), v.classes().any(|c| c == "fill-line")));
                    }
                });
                let (text, blank) = value.unwrap();
                rows.push((e.attr("data-field").unwrap().to_string(), text, blank));
            }
        });
        rows
    }

    #[test]
    fn fixed_sheet_order_and_profiles() {
        let spec = compose(&record(), Locale::Zh, &LabelTable::default());
        assert_eq!(spec.len(), 6);
        for (i, sheet) in spec.sheets().iter().enumerate() {
            assert_eq!(sheet.index, i);
            assert_eq!(sheet.kind, SheetKind::ALL[i]);
            assert_eq!(parse_sheet(sheet).attr("kind"), Some(sheet.kind.name()));
        }
        assert_eq!(spec.sheets()[0].profile, PageProfile::DoubleWide);
        assert_eq!(spec.sheets()[2].profile, PageProfile::HalfSize);
    }

    #[test]
    fn detail_rows_bind_values_and_blanks() {
        let spec = compose(&record(), Locale::Zh, &LabelTable::default());
        let rows = detail_rows(&spec);
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0], ("name".into(), "陳小明".into(), false));
        assert_eq!(rows[1].1, "民國113年1月15日");
        assert_eq!(rows[2].1, "台北");
        for row in &rows[3..] {
            assert_eq!(row.1, "");
            assert!(row.2, "{row:?} should be a fill-line");
        }
    }

    #[test]
    fn english_labels_and_dates() {
        let spec = compose(&record(), Locale::En, &LabelTable::default());
        let rows = detail_rows(&spec);
        assert_eq!(rows[1].1, "January 15, 2024");
        assert!(spec.sheet(SheetKind::Detail).unwrap().markup.contains("Recipient (皈依者):"));
    }

    #[test]
    fn values_are_escaped() {
        let mut r = record();
        r.name = "<b>A & B</b>".into();
        let spec = compose(&r, Locale::En, &LabelTable::default());
        let markup = &spec.sheet(SheetKind::Detail).unwrap().markup;
        assert!(markup.contains("&lt;b&gt;A &amp; B&lt;/b&gt;"));
        assert_eq!(detail_rows(&spec)[0].1, "<b>A & B</b>");
    }

    #[test]
    fn sheet_count_does_not_depend_on_record() {
        let empty = compose(&RecipientRecord::default(), Locale::Zh, &LabelTable::default());
        let full = compose(&record(), Locale::Zh, &LabelTable::default());
        assert_eq!(empty.len(), full.len());
        assert!(detail_rows(&empty).iter().all(|r| r.2));
    }

    #[test]
    fn profiles_keep_a6_geometry() {
        assert!((PageProfile::HalfSize.aspect() - 105.0 / 148.0).abs() < 1e-6);
        assert!((PageProfile::DoubleWide.width_pt() - 595.28).abs() < 0.01);
    }
}
