mod elastic_stub;

use elastic_stub::{ElasticStub, ElasticStubConfig, REJECT_MARKER};
use serde_json::{Value, json};
use verselex::cli::IngestArgs;
use verselex::config::{Config, ElasticConfig};
use verselex::elastic::ElasticClient;
use verselex::query::{ExplorerRequest, Filters, Needle, explore};

fn write(path: &std::path::Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn ndjson_sources(body: &str) -> Vec<Value> {
    body.lines()
        .skip(1)
        .step_by(2)
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn scraped_docs(dir: &std::path::Path) {
    write(
        &dir.join("verse_data/KJV/Genesis.csv"),
        "verse_part_type,verse_part,hebrew_id,bible_chapter,bible_verse,lit_type,testament_type,bible_book,version\n\
         WORD,In the beginning,H7225,1,Genesis1:1,Pentateuch,Old Testament,Genesis,KJV\n\
         PHRASE,and the earth,,1,Genesis1:1,Pentateuch,Old Testament,Genesis,KJV\n",
    );
    write(
        &dir.join("id_lookups/Hebrew/hebrew_id_lookup.csv"),
        "strongs_id,Original Word,Transliteration\nH1,אָב,ab\n",
    );
    write(
        &dir.join("id_lookups/Greek/greek_id_lookup.csv"),
        "strongs_id,Original Word,Transliteration\nG3056,λόγος,logos\n",
    );
}

#[tokio::test]
async fn ingest_recreates_both_indices_and_bulk_loads_rows() -> anyhow::Result<()> {
    let stub = ElasticStub::spawn(ElasticStubConfig {
        existing_indices: vec!["verse_index".to_owned()],
        ..ElasticStubConfig::default()
    });
    let dir = tempfile::tempdir()?;
    scraped_docs(dir.path());

    verselex::ingest::run(
        IngestArgs {
            data_dir: dir.path().to_path_buf(),
            es_host: Some(stub.base_url.clone()),
        },
        Config::default(),
    )
    .await?;

    assert_eq!(stub.requests_to("DELETE", "/verse_index").len(), 1);
    assert!(stub.requests_to("DELETE", "/strongs_id_index").is_empty());

    let created = stub.requests_to("PUT", "/verse_index");
    assert_eq!(created.len(), 1);
    let mapping: Value = serde_json::from_str(&created[0].body)?;
    assert_eq!(
        mapping["mappings"]["properties"]["bible_chapter"]["type"],
        json!("integer")
    );

    let bulks = stub.requests_to("POST", "/_bulk");
    assert_eq!(bulks.len(), 3);
    assert!(bulks[0].body.starts_with(r#"{"index":{"_index":"verse_index"}}"#));
    let verses = ndjson_sources(&bulks[0].body);
    assert_eq!(verses.len(), 2);
    assert_eq!(verses[0]["bible_chapter"], json!(1));
    assert_eq!(verses[0]["hebrew_id"], json!("H7225"));
    assert_eq!(verses[1]["hebrew_id"], json!(""));

    let hebrew = ndjson_sources(&bulks[1].body);
    assert_eq!(hebrew[0]["strongs_id"], json!("H1"));
    let greek = ndjson_sources(&bulks[2].body);
    assert_eq!(greek[0]["Transliteration"], json!("logos"));
    Ok(())
}

#[tokio::test]
async fn rejected_bulk_items_fail_the_ingest() {
    let stub = ElasticStub::spawn(ElasticStubConfig::default());
    let dir = tempfile::tempdir().unwrap();
    write(
        &dir.path().join("verse_data/KJV/Genesis.csv"),
        &format!("verse_part,bible_chapter\n{REJECT_MARKER},1\n"),
    );

    let err = verselex::ingest::run(
        IngestArgs {
            data_dir: dir.path().to_path_buf(),
            es_host: Some(stub.base_url.clone()),
        },
        Config::default(),
    )
    .await
    .unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("failed to parse field [bible_chapter]"), "{message}");
    assert!(message.contains("Genesis.csv"), "{message}");
}

#[tokio::test]
async fn empty_data_dir_is_an_error() {
    let stub = ElasticStub::spawn(ElasticStubConfig::default());
    let dir = tempfile::tempdir().unwrap();

    let err = verselex::ingest::run(
        IngestArgs {
            data_dir: dir.path().to_path_buf(),
            es_host: Some(stub.base_url.clone()),
        },
        Config::default(),
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("no crawl output"), "{err:#}");
    assert!(stub.requests_to("POST", "/_bulk").is_empty());
}

#[tokio::test]
async fn explorer_collects_every_panel_and_surrounding_words() -> anyhow::Result<()> {
    let stub = ElasticStub::spawn(ElasticStubConfig {
        aggregations: vec![
            (
                "by_book".to_owned(),
                json!({ "buckets": [
                    { "key": "Acts", "doc_count": 3 },
                    { "key": "Romans", "doc_count": 1 }
                ] }),
            ),
            (
                "unique_verses".to_owned(),
                json!({ "buckets": [
                    { "key": "Acts1:8", "doc_count": 1 },
                    { "key": "Romans1:16", "doc_count": 1 }
                ] }),
            ),
            ("distinct_ids".to_owned(), json!({ "value": 1 })),
            ("verse_count".to_owned(), json!({ "value": 4 })),
        ],
        hits: vec![
            json!({ "bible_verse": "Acts1:8", "verse_part": "ye shall receive power" }),
            json!({ "bible_verse": "Romans1:16", "verse_part": "the power of God" }),
            json!({ "bible_verse": "Acts1:8", "verse_part": "after that the Holy Ghost" }),
        ],
        ..ElasticStubConfig::default()
    });
    let client = ElasticClient::new(&ElasticConfig {
        host: stub.base_url.clone(),
        ..ElasticConfig::default()
    })?;

    let report = explore(
        &client,
        &ExplorerRequest {
            index: "verse_index",
            needle: Needle::Word("Power".to_owned()),
            filters: Filters {
                version: Some("KJV".to_owned()),
                book: None,
                testament: None,
                lit_type: None,
            },
            surrounding: Some(10),
        },
    )
    .await?;

    assert_eq!(report.needle, "power");
    assert_eq!(report.by_book.len(), 2);
    assert_eq!(report.by_book[0].key, "Acts");
    assert_eq!(report.verses, vec!["Acts1:8", "Romans1:16"]);
    assert_eq!(report.distinct_ids, Some(1));
    assert_eq!(report.verse_parts, Some(4));
    assert!(report.translations.is_empty());

    let surrounding = report.surrounding.expect("surrounding words requested");
    let words: Vec<&str> = surrounding.words.iter().map(|w| w.word.as_str()).collect();
    assert!(words.contains(&"receive"));
    assert!(words.contains(&"God"));
    assert!(!words.iter().any(|w| w.eq_ignore_ascii_case("power")));

    let searches = stub.requests_to("POST", "/verse_index/_search");
    assert_eq!(searches.len(), 8);
    let text_request: Value = serde_json::from_str(&searches[7].body)?;
    assert_eq!(
        text_request["query"]["bool"]["filter"][0],
        json!({ "term": { "version": "KJV" } })
    );
    Ok(())
}
