use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const STRONGS_DATA_FOLDER: &str = "id_lookups";
pub const VERSE_DATA_FOLDER: &str = "verse_data";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Hebrew,
    Greek,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::Hebrew, Language::Greek];

    pub fn name(self) -> &'static str {
        match self {
            Language::Hebrew => "Hebrew",
            Language::Greek => "Greek",
        }
    }

    /// Lowercase form used in entry URLs (`/hebrew/1.htm`) and span classes.
    pub fn slug(self) -> &'static str {
        match self {
            Language::Hebrew => "hebrew",
            Language::Greek => "greek",
        }
    }

    pub fn marker(self) -> char {
        match self {
            Language::Hebrew => 'H',
            Language::Greek => 'G',
        }
    }

    /// First characters of the catalog path segment (`strongs/<c>...`) listing this language.
    pub fn catalog_range(self) -> std::ops::RangeInclusive<char> {
        match self {
            Language::Hebrew => 'a'..='i',
            Language::Greek => 'j'..='o',
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexicalEntry {
    pub strongs_id: String,
    pub original_word: String,
    /// Every other labelled header, in page order.
    pub extra_fields: Vec<(String, String)>,
}

impl LexicalEntry {
    pub fn field(&self, label: &str) -> Option<&str> {
        self.extra_fields
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, value)| value.as_str())
    }

    /// A repeated label keeps its first position and takes the latest value.
    pub fn set_field(&mut self, label: impl Into<String>, value: impl Into<String>) {
        let label = label.into();
        let value = value.into();
        match self.extra_fields.iter_mut().find(|(name, _)| *name == label) {
            Some((_, slot)) => *slot = value,
            None => self.extra_fields.push((label, value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VersePartType {
    Word,
    Phrase,
}

impl VersePartType {
    pub fn as_str(self) -> &'static str {
        match self {
            VersePartType::Word => "WORD",
            VersePartType::Phrase => "PHRASE",
        }
    }
}

impl FromStr for VersePartType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WORD" => Ok(VersePartType::Word),
            "PHRASE" => Ok(VersePartType::Phrase),
            other => anyhow::bail!("unknown verse part type: {other:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerseToken {
    pub part_type: VersePartType,
    pub text: String,
    pub lexical_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersePart {
    pub part_type: VersePartType,
    pub text: String,
    pub lexical_id: Option<String>,
    pub bible_chapter: u32,
    pub bible_verse: String,
}

impl VersePart {
    pub fn new(token: VerseToken, bible_chapter: u32, bible_verse: String) -> Self {
        Self {
            part_type: token.part_type,
            text: token.text,
            lexical_id: token.lexical_id,
            bible_chapter,
            bible_verse,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LitType {
    Pentateuch,
    HistoricalBooks,
    WisdomLiterature,
    MajorProphets,
    MinorProphets,
    Gospels,
    Apocalypse,
    Epistles,
}

impl LitType {
    pub const ALL: [LitType; 8] = [
        LitType::Pentateuch,
        LitType::HistoricalBooks,
        LitType::WisdomLiterature,
        LitType::MajorProphets,
        LitType::MinorProphets,
        LitType::Gospels,
        LitType::Apocalypse,
        LitType::Epistles,
    ];

    /// Label written to the `lit_type` column and filtered on by the explorer.
    pub fn as_str(self) -> &'static str {
        match self {
            LitType::Pentateuch => "Pentateuch",
            LitType::HistoricalBooks => "Historical Books (Former Prophets)",
            LitType::WisdomLiterature => "Wisdom Literature",
            LitType::MajorProphets => "Major Prophets",
            LitType::MinorProphets => "Minor Prophets",
            LitType::Gospels => "Gospels",
            LitType::Apocalypse => "Apocalypse",
            LitType::Epistles => "Epistles",
        }
    }

    pub fn testament(self) -> Testament {
        match self {
            LitType::Gospels | LitType::Apocalypse | LitType::Epistles => Testament::New,
            _ => Testament::Old,
        }
    }
}

impl fmt::Display for LitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LitType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LitType::ALL
            .into_iter()
            .find(|lit| lit.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("unknown literature type: {s:?}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Testament {
    Old,
    New,
}

impl Testament {
    pub fn as_str(self) -> &'static str {
        match self {
            Testament::Old => "Old Testament",
            Testament::New => "New Testament",
        }
    }
}

impl fmt::Display for Testament {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Testament {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Old Testament" => Ok(Testament::Old),
            "New Testament" => Ok(Testament::New),
            other => anyhow::bail!("unknown testament: {other:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookMetadata {
    pub bible_book: String,
    pub lit_type: LitType,
    pub testament_type: Testament,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerseRecord {
    pub part: VersePart,
    pub book: BookMetadata,
    pub version: String,
}

impl VerseRecord {
    pub fn stamp(part: VersePart, book: &BookMetadata, version: &str) -> Self {
        Self {
            part,
            book: book.clone(),
            version: version.to_owned(),
        }
    }
}

/// The granularity at which crawl output is retried and persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CrawlUnit {
    Lexicon { language: Language },
    Book { book: String, version: String },
}

impl CrawlUnit {
    pub fn relative_path(&self) -> PathBuf {
        match self {
            CrawlUnit::Lexicon { language } => PathBuf::from(STRONGS_DATA_FOLDER)
                .join(language.name())
                .join(format!("{}_id_lookup.csv", language.slug())),
            CrawlUnit::Book { book, version } => PathBuf::from(VERSE_DATA_FOLDER)
                .join(version)
                .join(format!("{book}.csv")),
        }
    }
}

impl fmt::Display for CrawlUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrawlUnit::Lexicon { language } => write!(f, "{language} lexicon"),
            CrawlUnit::Book { book, version } => write!(f, "{book} ({version})"),
        }
    }
}
