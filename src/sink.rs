use std::collections::HashSet;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::formats::{
    BookMetadata, CrawlUnit, LexicalEntry, VersePart, VersePartType, VerseRecord,
};

const ORIGINAL_WORD_COLUMN: &str = "Original Word";

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("create output dir {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("replace {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub trait FlatRecord: Sized {
    /// Columns always written first, even for an empty unit.
    const CORE_COLUMNS: &'static [&'static str];

    fn to_fields(&self) -> Vec<(String, String)>;

    fn from_fields(fields: Vec<(String, String)>) -> anyhow::Result<Self>;

    /// Reshapes the record to exactly `columns`, the way reading the flushed file back would.
    fn conform(&mut self, _columns: &[String]) {}
}

impl FlatRecord for LexicalEntry {
    const CORE_COLUMNS: &'static [&'static str] = &["strongs_id", ORIGINAL_WORD_COLUMN];

    fn to_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("strongs_id".to_owned(), self.strongs_id.clone()),
            (ORIGINAL_WORD_COLUMN.to_owned(), self.original_word.clone()),
        ];
        fields.extend(
            self.extra_fields
                .iter()
                .map(|(label, value)| (label.clone(), value.clone())),
        );
        fields
    }

    fn from_fields(fields: Vec<(String, String)>) -> anyhow::Result<Self> {
        let mut strongs_id = None;
        let mut entry = LexicalEntry {
            strongs_id: String::new(),
            original_word: String::new(),
            extra_fields: Vec::new(),
        };
        for (label, value) in fields {
            match label.as_str() {
                "strongs_id" => strongs_id = Some(value),
                ORIGINAL_WORD_COLUMN => entry.original_word = value,
                _ => entry.set_field(label, value),
            }
        }
        entry.strongs_id = strongs_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| anyhow::anyhow!("row has no strongs_id"))?;
        Ok(entry)
    }

    fn conform(&mut self, columns: &[String]) {
        let mut previous = std::mem::take(&mut self.extra_fields);
        self.extra_fields = columns
            .iter()
            .filter(|column| !Self::CORE_COLUMNS.contains(&column.as_str()))
            .map(|column| {
                let value = previous
                    .iter_mut()
                    .find(|(label, _)| label == column)
                    .map(|(_, value)| std::mem::take(value))
                    .unwrap_or_default();
                (column.clone(), value)
            })
            .collect();
    }
}

impl FlatRecord for VerseRecord {
    const CORE_COLUMNS: &'static [&'static str] = &[
        "verse_part_type",
        "verse_part",
        "hebrew_id",
        "bible_chapter",
        "bible_verse",
        "lit_type",
        "testament_type",
        "bible_book",
        "version",
    ];

    fn to_fields(&self) -> Vec<(String, String)> {
        let values = [
            self.part.part_type.as_str().to_owned(),
            self.part.text.clone(),
            self.part.lexical_id.clone().unwrap_or_default(),
            self.part.bible_chapter.to_string(),
            self.part.bible_verse.clone(),
            self.book.lit_type.as_str().to_owned(),
            self.book.testament_type.as_str().to_owned(),
            self.book.bible_book.clone(),
            self.version.clone(),
        ];
        Self::CORE_COLUMNS
            .iter()
            .map(|c| (*c).to_owned())
            .zip(values)
            .collect()
    }

    fn from_fields(fields: Vec<(String, String)>) -> anyhow::Result<Self> {
        let get = |name: &str| column(&fields, name);

        let part = VersePart {
            part_type: get("verse_part_type")?.parse::<VersePartType>()?,
            text: get("verse_part")?.to_owned(),
            lexical_id: Some(get("hebrew_id")?)
                .filter(|id| !id.is_empty())
                .map(str::to_owned),
            bible_chapter: get("bible_chapter")?
                .parse()
                .context("parse bible_chapter")?,
            bible_verse: get("bible_verse")?.to_owned(),
        };
        let book = BookMetadata {
            bible_book: get("bible_book")?.to_owned(),
            lit_type: get("lit_type")?.parse()?,
            testament_type: get("testament_type")?.parse()?,
        };
        Ok(VerseRecord {
            part,
            book,
            version: get("version")?.to_owned(),
        })
    }
}

fn column<'a>(fields: &'a [(String, String)], name: &str) -> anyhow::Result<&'a str> {
    fields
        .iter()
        .find(|(label, _)| label == name)
        .map(|(_, value)| value.as_str())
        .ok_or_else(|| anyhow::anyhow!("row has no {name} column"))
}

#[derive(Debug)]
pub struct ResultSink<R> {
    unit: CrawlUnit,
    records: Vec<R>,
}

impl<R: FlatRecord> ResultSink<R> {
    pub fn new(unit: CrawlUnit) -> Self {
        Self {
            unit,
            records: Vec::new(),
        }
    }

    pub fn unit(&self) -> &CrawlUnit {
        &self.unit
    }

    pub fn append(&mut self, record: R) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    /// Writes the whole buffer to the unit's file under `out_dir`, replacing any previous output.
    ///
    /// Buffered records are first reshaped to the unit's column set, so they match
    /// what [`read_unit`] returns for the written file.
    pub fn flush(&mut self, out_dir: &Path) -> Result<PathBuf, SinkError> {
        let rows: Vec<_> = self.records.iter().map(FlatRecord::to_fields).collect();
        let columns = column_union::<R>(&rows);
        for record in &mut self.records {
            record.conform(&columns);
        }

        let path = out_dir.join(self.unit.relative_path());
        write_csv_atomic(&path, &self.records)?;
        tracing::info!(
            unit = %self.unit,
            records = self.records.len(),
            path = %path.display(),
            "flushed unit"
        );
        Ok(path)
    }
}

/// Serializes `records` to `path` through a sibling temp file and a rename.
///
/// The header is the core columns followed by every other label in first-seen order;
/// labels a record lacks are written as empty strings.
pub fn write_csv_atomic<R: FlatRecord>(path: &Path, records: &[R]) -> Result<(), SinkError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|source| SinkError::CreateDir {
        path: parent.to_path_buf(),
        source,
    })?;

    let rows: Vec<Vec<(String, String)>> = records.iter().map(FlatRecord::to_fields).collect();
    let columns = column_union::<R>(&rows);

    let write_err = |source: csv::Error| SinkError::Write {
        path: path.to_path_buf(),
        source,
    };
    let persist_err = |source: std::io::Error| SinkError::Persist {
        path: path.to_path_buf(),
        source,
    };

    let tmp = tempfile::NamedTempFile::new_in(parent).map_err(persist_err)?;
    let mut writer = csv::Writer::from_writer(tmp);
    writer.write_record(&columns).map_err(write_err)?;
    for row in &rows {
        let line = columns.iter().map(|column| {
            row.iter()
                .find(|(label, _)| label == column)
                .map(|(_, value)| value.as_str())
                .unwrap_or("")
        });
        writer.write_record(line).map_err(write_err)?;
    }
    let mut tmp = writer
        .into_inner()
        .map_err(|err| persist_err(err.into_error()))?;
    tmp.flush().map_err(persist_err)?;
    tmp.persist(path).map_err(|err| persist_err(err.error))?;
    Ok(())
}

fn column_union<R: FlatRecord>(rows: &[Vec<(String, String)>]) -> Vec<String> {
    let mut columns: Vec<String> = R::CORE_COLUMNS.iter().map(|c| (*c).to_owned()).collect();
    let mut seen: HashSet<String> = columns.iter().cloned().collect();
    for (label, _) in rows.iter().flatten() {
        if seen.insert(label.clone()) {
            columns.push(label.clone());
        }
    }
    columns
}

pub fn read_rows(path: &Path) -> anyhow::Result<Vec<Vec<(String, String)>>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("open unit file: {}", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("read header: {}", path.display()))?
        .clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("read row: {}", path.display()))?;
        rows.push(
            headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.to_owned(), v.to_owned()))
                .collect(),
        );
    }
    Ok(rows)
}

pub fn read_unit<R: FlatRecord>(path: &Path) -> anyhow::Result<Vec<R>> {
    read_rows(path)?
        .into_iter()
        .enumerate()
        .map(|(idx, row)| {
            R::from_fields(row).with_context(|| format!("row {} of {}", idx + 1, path.display()))
        })
        .collect()
}
