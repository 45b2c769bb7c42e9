use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use serde_json::{Map, Value, json};

use crate::cli::IngestArgs;
use crate::config::{Config, ElasticConfig};
use crate::elastic::ElasticClient;
use crate::formats::{Language, STRONGS_DATA_FOLDER, VERSE_DATA_FOLDER};
use crate::sink;

pub const CHAPTER_FIELD: &str = "bible_chapter";

pub async fn run(args: IngestArgs, mut config: Config) -> anyhow::Result<()> {
    if let Some(host) = args.es_host {
        config.elasticsearch.host = host;
    }
    let data_dir = args.data_dir.as_path();
    let es_config = &config.elasticsearch;
    let client = ElasticClient::new(es_config)?;
    client
        .wait_until_ready(
            es_config.ping_attempts,
            Duration::from_secs(es_config.ping_interval_secs),
        )
        .await?;

    let verse_files = verse_files(&data_dir.join(VERSE_DATA_FOLDER))?;
    let strongs_files = strongs_files(&data_dir.join(STRONGS_DATA_FOLDER))?;
    if verse_files.is_empty() && strongs_files.is_empty() {
        anyhow::bail!("no crawl output under {}", data_dir.display());
    }

    load_index(
        &client,
        es_config,
        &es_config.verse_index,
        &verse_mapping(),
        &verse_files,
    )
    .await?;
    load_index(
        &client,
        es_config,
        &es_config.strongs_index,
        &strongs_mapping(),
        &strongs_files,
    )
    .await?;
    Ok(())
}

async fn load_index(
    client: &ElasticClient,
    es_config: &ElasticConfig,
    index: &str,
    mapping: &Value,
    files: &[PathBuf],
) -> anyhow::Result<()> {
    client.recreate_index(index, mapping).await?;
    let mut total = 0;
    for path in files {
        let documents = documents_from_csv(path)?;
        let indexed = client
            .bulk_index(index, &documents, es_config.bulk_chunk_size)
            .await
            .with_context(|| format!("ingest {}", path.display()))?;
        tracing::info!(index, path = %path.display(), records = indexed, "ingested");
        total += indexed;
    }
    tracing::info!(index, files = files.len(), records = total, "index loaded");
    Ok(())
}

/// `verse_data/<version>/*.csv`, versions and files in name order. Dot-directories are ignored.
pub fn verse_files(verse_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if !verse_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut versions = Vec::new();
    for entry in std::fs::read_dir(verse_dir)
        .with_context(|| format!("read dir {}", verse_dir.display()))?
    {
        let path = entry
            .with_context(|| format!("read entry of {}", verse_dir.display()))?
            .path();
        let hidden = path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with('.'));
        if path.is_dir() && !hidden {
            versions.push(path);
        }
    }
    versions.sort();

    let mut files = Vec::new();
    for version in versions {
        files.extend(csv_files(&version)?);
    }
    Ok(files)
}

/// `id_lookups/Hebrew/*.csv` then `id_lookups/Greek/*.csv`.
pub fn strongs_files(strongs_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for language in Language::ALL {
        let dir = strongs_dir.join(language.name());
        if dir.is_dir() {
            files.extend(csv_files(&dir)?);
        }
    }
    Ok(files)
}

fn csv_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let path = entry
            .with_context(|| format!("read entry of {}", dir.display()))?
            .path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "csv") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// One JSON document per CSV row. Empty cells stay empty strings; `bible_chapter`
/// becomes an integer, or null when it does not parse.
pub fn documents_from_csv(path: &Path) -> anyhow::Result<Vec<Value>> {
    let rows = sink::read_rows(path)?;
    Ok(rows
        .into_iter()
        .map(|row| {
            let mut document = Map::new();
            for (column, value) in row {
                let value = if column == CHAPTER_FIELD {
                    value
                        .trim()
                        .parse::<i64>()
                        .map(Value::from)
                        .unwrap_or(Value::Null)
                } else {
                    Value::String(value)
                };
                document.insert(column, value);
            }
            Value::Object(document)
        })
        .collect())
}

pub fn verse_mapping() -> Value {
    json!({
        "mappings": {
            "properties": {
                "verse_part_type": { "type": "keyword" },
                "verse_part": {
                    "type": "text",
                    "fields": { "keyword": { "type": "keyword", "ignore_above": 256 } }
                },
                "hebrew_id": { "type": "keyword" },
                "bible_chapter": { "type": "integer" },
                "bible_verse": { "type": "keyword" },
                "lit_type": { "type": "keyword" },
                "testament_type": { "type": "keyword" },
                "bible_book": { "type": "keyword" },
                "version": { "type": "keyword" }
            }
        }
    })
}

/// Entry labels vary by page, so everything beyond the id is mapped dynamically as text.
pub fn strongs_mapping() -> Value {
    json!({
        "mappings": {
            "dynamic_templates": [{
                "labels_as_text": {
                    "match_mapping_type": "string",
                    "mapping": {
                        "type": "text",
                        "fields": { "keyword": { "type": "keyword", "ignore_above": 256 } }
                    }
                }
            }],
            "properties": {
                "strongs_id": { "type": "keyword" }
            }
        }
    })
}
