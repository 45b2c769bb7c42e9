use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use anyhow::Context as _;
use serde::Serialize;
use serde_json::{Value, json};

use crate::cli::QueryArgs;
use crate::config::Config;
use crate::elastic::ElasticClient;
use crate::formats::{LitType, Testament};

const TRANSLATIONS_AGG: &str = "unique_translations";
const BY_BOOK_AGG: &str = "by_book";
const BY_TESTAMENT_AGG: &str = "by_testament";
const BY_LIT_AGG: &str = "by_lit";
const UNIQUE_VERSES_AGG: &str = "unique_verses";
const DISTINCT_IDS_AGG: &str = "distinct_ids";
const VERSE_COUNT_AGG: &str = "verse_count";

pub const MAX_VERSE_PARTS: usize = 10_000;

const STOPWORDS: &[&str] = &[
    "a", "about", "after", "again", "against", "all", "also", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "between", "both", "but", "by", "can",
    "could", "did", "do", "does", "doing", "down", "during", "each", "few", "for", "from",
    "further", "had", "has", "hath", "have", "having", "he", "her", "here", "hers", "herself",
    "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just",
    "me", "more", "most", "my", "myself", "no", "nor", "not", "of", "off", "on", "once", "only",
    "or", "other", "ought", "our", "ours", "ourselves", "out", "over", "own", "same", "shall",
    "she", "should", "so", "some", "such", "than", "that", "the", "thee", "their", "theirs",
    "them", "themselves", "then", "there", "these", "they", "this", "those", "thou", "through",
    "thy", "to", "too", "under", "until", "unto", "up", "very", "was", "we", "were", "what",
    "when", "where", "which", "while", "who", "whom", "why", "with", "would", "ye", "you",
    "your", "yours", "yourself", "yourselves",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Needle {
    /// Exact Strong's id, matched against `hebrew_id`.
    StrongsId(String),
    /// English word or phrase, matched as a phrase against `verse_part`.
    Word(String),
}

impl Needle {
    /// Ids are matched as typed; words are lower-cased.
    pub fn normalized(&self) -> String {
        match self {
            Needle::StrongsId(id) => id.trim().to_owned(),
            Needle::Word(word) => word.trim().to_lowercase(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filters {
    pub version: Option<String>,
    pub book: Option<String>,
    pub testament: Option<Testament>,
    pub lit_type: Option<LitType>,
}

pub fn base_query(needle: &Needle, filters: &Filters) -> anyhow::Result<Value> {
    let value = needle.normalized();
    if value.is_empty() {
        anyhow::bail!("search term is empty");
    }
    let must = match needle {
        Needle::StrongsId(_) => json!({ "term": { "hebrew_id": value } }),
        Needle::Word(_) => json!({ "match_phrase": { "verse_part": value } }),
    };

    let mut filter = Vec::new();
    if let Some(version) = &filters.version {
        filter.push(json!({ "term": { "version": version } }));
    }
    if let Some(book) = &filters.book {
        filter.push(json!({ "term": { "bible_book": book } }));
    }
    if let Some(testament) = filters.testament {
        filter.push(json!({ "term": { "testament_type": testament.as_str() } }));
    }
    if let Some(lit_type) = filters.lit_type {
        filter.push(json!({ "term": { "lit_type": lit_type.as_str() } }));
    }

    Ok(json!({ "bool": { "must": [must], "filter": filter } }))
}

fn aggregation_request(query: &Value, name: &str, agg: Value) -> Value {
    json!({ "size": 0, "query": query, "aggs": { name: agg } })
}

pub fn panel_requests(query: &Value) -> Vec<(&'static str, Value)> {
    vec![
        (
            TRANSLATIONS_AGG,
            aggregation_request(
                query,
                TRANSLATIONS_AGG,
                json!({ "terms": { "field": "verse_part.keyword", "size": 1000 } }),
            ),
        ),
        (
            BY_BOOK_AGG,
            aggregation_request(
                query,
                BY_BOOK_AGG,
                json!({ "terms": { "field": "bible_book", "size": 100, "order": { "_key": "asc" } } }),
            ),
        ),
        (
            BY_TESTAMENT_AGG,
            aggregation_request(
                query,
                BY_TESTAMENT_AGG,
                json!({ "terms": { "field": "testament_type", "size": 10 } }),
            ),
        ),
        (
            BY_LIT_AGG,
            aggregation_request(
                query,
                BY_LIT_AGG,
                json!({ "terms": { "field": "lit_type", "size": 10 } }),
            ),
        ),
        (
            UNIQUE_VERSES_AGG,
            aggregation_request(
                query,
                UNIQUE_VERSES_AGG,
                json!({ "terms": { "field": "bible_verse", "size": 1000 } }),
            ),
        ),
        (
            DISTINCT_IDS_AGG,
            aggregation_request(
                query,
                DISTINCT_IDS_AGG,
                json!({ "cardinality": { "field": "hebrew_id" } }),
            ),
        ),
        (
            VERSE_COUNT_AGG,
            aggregation_request(
                query,
                VERSE_COUNT_AGG,
                json!({ "value_count": { "field": "bible_verse" } }),
            ),
        ),
    ]
}

pub fn verse_parts_request(verses: &[String], version: Option<&str>) -> Value {
    let filter: Vec<Value> = version
        .map(|version| json!({ "term": { "version": version } }))
        .into_iter()
        .collect();
    json!({
        "size": MAX_VERSE_PARTS,
        "_source": ["bible_verse", "verse_part"],
        "query": {
            "bool": {
                "must": [{ "terms": { "bible_verse": verses } }],
                "filter": filter
            }
        }
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub key: String,
    pub count: u64,
}

pub fn buckets(response: &Value, agg: &str) -> Vec<Bucket> {
    response
        .pointer(&format!("/aggregations/{agg}/buckets"))
        .and_then(Value::as_array)
        .map(|buckets| {
            buckets
                .iter()
                .filter_map(|bucket| {
                    let key = match bucket.get("key")? {
                        Value::String(key) => key.clone(),
                        other => other.to_string(),
                    };
                    let count = bucket.get("doc_count")?.as_u64()?;
                    Some(Bucket { key, count })
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn metric(response: &Value, agg: &str) -> Option<u64> {
    response
        .pointer(&format!("/aggregations/{agg}/value"))
        .and_then(Value::as_u64)
}

/// Verse id → verse text, joined from hits in order of first appearance.
pub fn assemble_verses(response: &Value) -> Vec<(String, String)> {
    let mut order = Vec::new();
    let mut parts: HashMap<String, Vec<String>> = HashMap::new();
    let hits = response
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for hit in hits {
        let source = &hit["_source"];
        let (Some(verse), Some(part)) = (
            source.get("bible_verse").and_then(Value::as_str),
            source.get("verse_part").and_then(Value::as_str),
        ) else {
            continue;
        };
        if !parts.contains_key(verse) {
            order.push(verse.to_owned());
        }
        parts
            .entry(verse.to_owned())
            .or_default()
            .push(part.to_owned());
    }
    order
        .into_iter()
        .map(|verse| {
            let text = parts.remove(&verse).unwrap_or_default().join(" ");
            (verse, text)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WordCount {
    pub word: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoOccurrence {
    pub left: String,
    pub right: String,
    pub verses: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SurroundingWords {
    pub words: Vec<WordCount>,
    pub pairs: Vec<CoOccurrence>,
}

/// Most frequent words around the needle and how often pairs of them share a verse.
///
/// Stopwords and the needle itself are excluded. Ties break alphabetically.
pub fn surrounding_words(verses: &[(String, String)], needle: &str, top: usize) -> SurroundingWords {
    let stopwords: HashSet<&str> = STOPWORDS.iter().copied().collect();
    let needle = needle.trim().to_lowercase();

    let mut counts: HashMap<&str, u64> = HashMap::new();
    for (_, text) in verses {
        for word in text.split_whitespace() {
            let lower = word.to_lowercase();
            if stopwords.contains(lower.as_str()) || lower == needle {
                continue;
            }
            *counts.entry(word).or_default() += 1;
        }
    }

    let mut ranked: Vec<(&str, u64)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.truncate(top);
    let top_words: HashSet<&str> = ranked.iter().map(|(word, _)| *word).collect();

    let mut pairs: BTreeMap<(&str, &str), u64> = BTreeMap::new();
    for (_, text) in verses {
        let present: BTreeSet<&str> = text
            .split_whitespace()
            .filter(|word| top_words.contains(word))
            .collect();
        let present: Vec<&str> = present.into_iter().collect();
        for (i, left) in present.iter().enumerate() {
            for right in &present[i + 1..] {
                *pairs.entry((*left, *right)).or_default() += 1;
            }
        }
    }

    SurroundingWords {
        words: ranked
            .into_iter()
            .map(|(word, count)| WordCount {
                word: word.to_owned(),
                count,
            })
            .collect(),
        pairs: pairs
            .into_iter()
            .map(|((left, right), verses)| CoOccurrence {
                left: left.to_owned(),
                right: right.to_owned(),
                verses,
            })
            .collect(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExplorerReport {
    pub needle: String,
    pub translations: Vec<Bucket>,
    pub by_book: Vec<Bucket>,
    pub by_testament: Vec<Bucket>,
    pub by_lit_type: Vec<Bucket>,
    pub verses: Vec<String>,
    pub distinct_ids: Option<u64>,
    pub verse_parts: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surrounding: Option<SurroundingWords>,
}

pub struct ExplorerRequest<'a> {
    pub index: &'a str,
    pub needle: Needle,
    pub filters: Filters,
    /// `Some(n)` also computes the top `n` surrounding words.
    pub surrounding: Option<usize>,
}

pub async fn explore(
    client: &ElasticClient,
    request: &ExplorerRequest<'_>,
) -> anyhow::Result<ExplorerReport> {
    let query = base_query(&request.needle, &request.filters)?;
    let mut report = ExplorerReport {
        needle: request.needle.normalized(),
        ..ExplorerReport::default()
    };

    for (agg, body) in panel_requests(&query) {
        let response = client
            .search(request.index, &body)
            .await
            .with_context(|| format!("{agg} aggregation"))?;
        match agg {
            TRANSLATIONS_AGG => {
                report.translations = buckets(&response, agg)
                    .into_iter()
                    .filter(|bucket| !bucket.key.is_empty())
                    .collect();
            }
            BY_BOOK_AGG => report.by_book = buckets(&response, agg),
            BY_TESTAMENT_AGG => report.by_testament = buckets(&response, agg),
            BY_LIT_AGG => report.by_lit_type = buckets(&response, agg),
            UNIQUE_VERSES_AGG => {
                report.verses = buckets(&response, agg)
                    .into_iter()
                    .map(|bucket| bucket.key)
                    .collect();
            }
            DISTINCT_IDS_AGG => report.distinct_ids = metric(&response, agg),
            VERSE_COUNT_AGG => report.verse_parts = metric(&response, agg),
            _ => {}
        }
    }

    if let Some(top) = request.surrounding
        && !report.verses.is_empty()
    {
        let body = verse_parts_request(&report.verses, request.filters.version.as_deref());
        let response = client
            .search(request.index, &body)
            .await
            .context("verse text")?;
        let verses = assemble_verses(&response);
        report.surrounding = Some(surrounding_words(&verses, &report.needle, top));
    }

    tracing::info!(
        needle = %report.needle,
        verses = report.verses.len(),
        books = report.by_book.len(),
        "explorer queries done"
    );
    Ok(report)
}

pub async fn run(args: QueryArgs, mut config: Config) -> anyhow::Result<()> {
    if let Some(host) = args.es_host {
        config.elasticsearch.host = host;
    }
    let needle = match (args.id, args.word) {
        (Some(id), _) => Needle::StrongsId(id),
        (None, Some(word)) => Needle::Word(word),
        (None, None) => anyhow::bail!("either --id or --word is required"),
    };
    let filters = Filters {
        version: args.bible_version,
        book: args.book,
        testament: args.testament,
        lit_type: args.lit_type,
    };

    let output = if args.dry_run {
        let query = base_query(&needle, &filters)?;
        let panels: serde_json::Map<String, Value> = panel_requests(&query)
            .into_iter()
            .map(|(name, body)| (name.to_owned(), body))
            .collect();
        serde_json::to_string_pretty(&panels).context("serialize requests")?
    } else {
        let client = ElasticClient::new(&config.elasticsearch)?;
        let request = ExplorerRequest {
            index: &config.elasticsearch.verse_index,
            needle,
            filters,
            surrounding: args.surrounding.then_some(args.top_words),
        };
        let report = explore(&client, &request).await?;
        serde_json::to_string_pretty(&report).context("serialize report")?
    };
    println!("{output}");
    Ok(())
}
