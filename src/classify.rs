use std::sync::LazyLock;

use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::formats::{Language, LexicalEntry, VersePartType, VerseToken};

const CATALOG_PATH: &str = "biblehub.com/strongs/";
const ORIGINAL_WORD_LABEL: &str = "Original Word";
const PHRASE_MARKER: &str = "PHRASE";
const DETAIL_LINK_LABEL: &str = "Verse Row [REF] BibleID";

static ANCHOR_WITH_HREF: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static ANCHOR: LazyLock<Selector> = LazyLock::new(|| selector("a"));
static TOP_HEADING: LazyLock<Selector> = LazyLock::new(|| selector("span.tophdg"));
static CONCORDANCE_TABLE: LazyLock<Selector> = LazyLock::new(|| selector("div#concTable"));
static CONCORDANCE_ROW: LazyLock<Selector> = LazyLock::new(|| selector("div.row"));
static DIV: LazyLock<Selector> = LazyLock::new(|| selector("div"));
static DIV_WITH_ID: LazyLock<Selector> = LazyLock::new(|| selector("div[id]"));
static LABELLED_ANCHOR: LazyLock<Selector> = LazyLock::new(|| selector("a[data-ev-label]"));

static VERSE_ROW_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^verse_\d+$").expect("valid verse row pattern"));
static HEBREW_ENTRY_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"hebrew/(\d+)").expect("valid hebrew id pattern"));
static GREEK_ENTRY_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"greek/(\d+)").expect("valid greek id pattern"));

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).unwrap_or_else(|err| panic!("invalid static selector {css:?}: {err}"))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("no {language} entry number in url: {url}")]
    MissingEntryId { language: Language, url: String },

    #[error("result row {row_id} has no verse detail link")]
    MissingDetailLink { row_id: String },
}

pub fn link_language(href: &str) -> Option<Language> {
    let (_, rest) = href.split_once(CATALOG_PATH)?;
    let first = rest.chars().next()?;
    Language::ALL
        .into_iter()
        .find(|language| language.catalog_range().contains(&first))
}

pub fn classify_lexical_links(html: &str, language: Language) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut links: Vec<String> = Vec::new();
    for anchor in document.select(&ANCHOR_WITH_HREF) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if link_language(href) == Some(language) && !links.iter().any(|l| l == href) {
            links.push(href.to_owned());
        }
    }
    links
}

pub fn entry_links(html: &str, language: Language) -> Vec<String> {
    let marker = format!("/{}/", language.slug());
    let document = Html::parse_document(html);
    let mut links: Vec<String> = Vec::new();
    for anchor in document.select(&ANCHOR_WITH_HREF) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if href.contains(&marker) && !links.iter().any(|l| l == href) {
            links.push(href.to_owned());
        }
    }
    links
}

/// Resolves an href as the site writes it: absolute, protocol-relative,
/// scheme-less (`biblehub.com/strongs/a.htm`) or relative to the current page.
pub fn resolve_href(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if let Some(rest) = href.strip_prefix("//") {
        return Url::parse(&format!("{}://{rest}", base.scheme())).ok();
    }
    if let Ok(url) = Url::parse(href) {
        return Some(url);
    }
    if let Some((host, _)) = href.split_once('/')
        && host.contains('.')
        && !host.starts_with('.')
    {
        return Url::parse(&format!("{}://{href}", base.scheme())).ok();
    }
    base.join(href).ok()
}

pub fn strongs_id_from_url(url: &str, language: Language) -> Result<String, ExtractionError> {
    let pattern = match language {
        Language::Hebrew => &*HEBREW_ENTRY_ID,
        Language::Greek => &*GREEK_ENTRY_ID,
    };
    pattern
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|digits| format!("{}{}", language.marker(), digits.as_str()))
        .ok_or_else(|| ExtractionError::MissingEntryId {
            language,
            url: url.to_owned(),
        })
}

/// Reads every labelled header (`span.tophdg`) of a Strong's entry page.
///
/// "Original Word" takes the sibling span tagged with the language class; every
/// other label takes the next non-empty text node after the header.
pub fn extract_lexical_fields(
    html: &str,
    url: &str,
    language: Language,
) -> Result<LexicalEntry, ExtractionError> {
    let strongs_id = strongs_id_from_url(url, language)?;
    let document = Html::parse_document(html);

    let mut entry = LexicalEntry {
        strongs_id,
        original_word: String::new(),
        extra_fields: Vec::new(),
    };
    for header in document.select(&TOP_HEADING) {
        let text = header.text().collect::<String>();
        let label = text.trim();
        let label = label.strip_suffix(':').unwrap_or(label).trim_end();
        if label.is_empty() {
            continue;
        }

        if label == ORIGINAL_WORD_LABEL {
            entry.original_word = sibling_span_text(header, language.slug()).unwrap_or_default();
        } else {
            entry.set_field(label, next_text_sibling(header).unwrap_or_default());
        }
    }
    Ok(entry)
}

fn sibling_span_text(header: ElementRef<'_>, class: &str) -> Option<String> {
    header
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "span" && el.value().classes().any(|c| c == class))
        .map(|el| el.text().collect::<String>().trim().to_owned())
}

fn next_text_sibling(header: ElementRef<'_>) -> Option<String> {
    header.next_siblings().find_map(|node| match node.value() {
        Node::Text(text) if !text.trim().is_empty() => Some(text.trim().to_owned()),
        _ => None,
    })
}

/// Rows without a lexical-id anchor are kept with `lexical_id: None`.
pub fn extract_verse_parts(html: &str) -> Vec<VerseToken> {
    let document = Html::parse_document(html);
    let Some(table) = document.select(&CONCORDANCE_TABLE).next() else {
        return Vec::new();
    };

    table
        .select(&CONCORDANCE_ROW)
        .map(|row| {
            let columns: Vec<ElementRef<'_>> = row.select(&DIV).collect();
            let joined = columns
                .first()
                .map(|col| {
                    col.select(&ANCHOR)
                        .map(|a| a.text().collect::<String>())
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .unwrap_or_default();

            let part_type = if joined.contains(PHRASE_MARKER) {
                VersePartType::Phrase
            } else {
                VersePartType::Word
            };
            let text = joined.replace(PHRASE_MARKER, "").trim().to_owned();

            let lexical_id = columns
                .get(1)
                .and_then(|col| col.select(&ANCHOR).next())
                .map(|a| a.text().collect::<String>().trim().to_uppercase())
                .filter(|id| !id.is_empty());

            VerseToken {
                part_type,
                text,
                lexical_id,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
    pub row_id: String,
    pub verse_label: String,
    pub detail_href: String,
}

pub fn verse_rows(html: &str) -> Result<Vec<ResultRow>, ExtractionError> {
    let document = Html::parse_document(html);
    let mut rows = Vec::new();
    for div in document.select(&DIV_WITH_ID) {
        let Some(row_id) = div.value().id() else {
            continue;
        };
        if !VERSE_ROW_ID.is_match(row_id) {
            continue;
        }

        let missing = || ExtractionError::MissingDetailLink {
            row_id: row_id.to_owned(),
        };
        let link = div
            .select(&LABELLED_ANCHOR)
            .find(|a| {
                a.value()
                    .attr("data-ev-label")
                    .is_some_and(|label| label.contains(DETAIL_LINK_LABEL))
            })
            .ok_or_else(missing)?;
        let detail_href = link.value().attr("href").ok_or_else(missing)?;

        rows.push(ResultRow {
            row_id: row_id.to_owned(),
            verse_label: link.text().collect::<String>().trim().to_owned(),
            detail_href: detail_href.to_owned(),
        });
    }
    Ok(rows)
}
