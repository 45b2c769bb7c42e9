use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::formats::{BookMetadata, LitType};

const PENTATEUCH: &[&str] = &["Genesis", "Exodus", "Leviticus", "Numbers", "Deuteronomy"];

const HISTORICAL_BOOKS: &[&str] = &[
    "Joshua",
    "Judges",
    "Ruth",
    "1 Samuel",
    "2 Samuel",
    "1 Kings",
    "2 Kings",
    "1 Chronicles",
    "2 Chronicles",
    "Ezra",
    "Nehemiah",
    "Esther",
];

const WISDOM_LITERATURE: &[&str] = &["Job", "Psalms", "Proverbs", "Ecclesiastes", "Song of Solomon"];

// "Ezekial" is how existing search-term files spell it.
const MAJOR_PROPHETS: &[&str] = &[
    "Isaiah",
    "Jeremiah",
    "Lamentations",
    "Ezekiel",
    "Ezekial",
    "Daniel",
];

const MINOR_PROPHETS: &[&str] = &[
    "Hosea",
    "Joel",
    "Amos",
    "Obadiah",
    "Jonah",
    "Micah",
    "Nahum",
    "Habakkuk",
    "Zephaniah",
    "Haggai",
    "Zechariah",
    "Malachi",
];

const GOSPELS: &[&str] = &["Matthew", "Mark", "Luke", "John"];

/// Literature type of a canonical book name. Anything unmapped is an epistle.
pub fn lit_type_for(book: &str) -> LitType {
    let groups: [(&[&str], LitType); 6] = [
        (PENTATEUCH, LitType::Pentateuch),
        (HISTORICAL_BOOKS, LitType::HistoricalBooks),
        (WISDOM_LITERATURE, LitType::WisdomLiterature),
        (MAJOR_PROPHETS, LitType::MajorProphets),
        (MINOR_PROPHETS, LitType::MinorProphets),
        (GOSPELS, LitType::Gospels),
    ];

    if book == "Revelation" {
        return LitType::Apocalypse;
    }
    groups
        .into_iter()
        .find(|(books, _)| books.contains(&book))
        .map(|(_, lit)| lit)
        .unwrap_or(LitType::Epistles)
}

pub fn book_metadata(book: &str) -> BookMetadata {
    let lit_type = lit_type_for(book);
    BookMetadata {
        bible_book: book.to_owned(),
        lit_type,
        testament_type: lit_type.testament(),
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid search term {term:?}: {reason}")]
pub struct TermError {
    pub term: String,
    pub reason: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTerm {
    pub raw: String,
    pub book: String,
    pub chapter: u32,
}

/// Splits "Genesis 2", "1 Kings 2 3" or "Song of Solomon 2 1" into book and chapter.
///
/// The chapter is the first numeral after the book-name tokens, so a leading
/// book number ("1 Kings") shifts it from the second token to the third.
pub fn parse_search_term(term: &str) -> Result<SearchTerm, TermError> {
    let err = |reason| TermError {
        term: term.to_owned(),
        reason,
    };

    let tokens: Vec<&str> = term.split_whitespace().collect();
    let mut idx = 0;
    if tokens
        .first()
        .is_some_and(|t| t.chars().all(|c| c.is_ascii_digit()))
    {
        idx = 1;
    }

    let name_start = idx;
    while idx < tokens.len() && tokens[idx].chars().any(char::is_alphabetic) {
        idx += 1;
    }
    if idx == name_start {
        return Err(err("missing book name"));
    }

    let book = tokens[..idx].join(" ");
    let chapter_token = tokens.get(idx).ok_or_else(|| err("missing chapter"))?;
    let chapter = chapter_token
        .split(':')
        .next()
        .unwrap_or_default()
        .parse::<u32>()
        .map_err(|_| err("chapter is not a number"))?;

    Ok(SearchTerm {
        raw: term.to_owned(),
        book,
        chapter,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermAliases {
    aliases: BTreeMap<String, String>,
}

impl TermAliases {
    pub fn new(aliases: BTreeMap<String, String>) -> Self {
        Self { aliases }
    }

    pub fn apply<'a>(&self, term: &'a str) -> Cow<'a, str> {
        let mut out = Cow::Borrowed(term);
        for (from, to) in &self.aliases {
            if out.contains(from.as_str()) {
                out = Cow::Owned(out.replace(from.as_str(), to));
            }
        }
        out
    }
}

impl Default for TermAliases {
    fn default() -> Self {
        Self::new(default_aliases())
    }
}

pub fn default_aliases() -> BTreeMap<String, String> {
    BTreeMap::from([("Song of Solomon".to_owned(), "Sng".to_owned())])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::Testament;

    #[test]
    fn lit_type_covers_each_group() {
        assert_eq!(lit_type_for("Genesis"), LitType::Pentateuch);
        assert_eq!(lit_type_for("2 Kings"), LitType::HistoricalBooks);
        assert_eq!(lit_type_for("Song of Solomon"), LitType::WisdomLiterature);
        assert_eq!(lit_type_for("Ezekiel"), LitType::MajorProphets);
        assert_eq!(lit_type_for("Ezekial"), LitType::MajorProphets);
        assert_eq!(lit_type_for("Malachi"), LitType::MinorProphets);
        assert_eq!(lit_type_for("John"), LitType::Gospels);
        assert_eq!(lit_type_for("Revelation"), LitType::Apocalypse);
        assert_eq!(lit_type_for("Romans"), LitType::Epistles);
    }

    #[test]
    fn unmapped_books_default_to_new_testament_epistles() {
        let meta = book_metadata("Nonexistent");
        assert_eq!(meta.lit_type, LitType::Epistles);
        assert_eq!(meta.testament_type, Testament::New);
    }

    #[test]
    fn testament_follows_lit_type() {
        assert_eq!(book_metadata("Psalms").testament_type, Testament::Old);
        assert_eq!(book_metadata("Mark").testament_type, Testament::New);
        assert_eq!(book_metadata("Revelation").testament_type, Testament::New);
        assert_eq!(book_metadata("Ruth").testament_type, Testament::Old);
    }

    #[test]
    fn chapter_follows_single_word_book() -> anyhow::Result<()> {
        let term = parse_search_term("Genesis 2")?;
        assert_eq!(term.book, "Genesis");
        assert_eq!(term.chapter, 2);
        Ok(())
    }

    #[test]
    fn chapter_follows_numbered_book() -> anyhow::Result<()> {
        let term = parse_search_term("1 Kings 2")?;
        assert_eq!(term.book, "1 Kings");
        assert_eq!(term.chapter, 2);

        let term = parse_search_term("2 Samuel 14 3")?;
        assert_eq!(term.book, "2 Samuel");
        assert_eq!(term.chapter, 14);
        Ok(())
    }

    #[test]
    fn chapter_follows_multi_word_book() -> anyhow::Result<()> {
        let term = parse_search_term("Song of Solomon 2 1")?;
        assert_eq!(term.book, "Song of Solomon");
        assert_eq!(term.chapter, 2);

        let term = parse_search_term("Sng 2 1")?;
        assert_eq!(term.book, "Sng");
        assert_eq!(term.chapter, 2);
        Ok(())
    }

    #[test]
    fn chapter_accepts_chapter_verse_notation() -> anyhow::Result<()> {
        assert_eq!(parse_search_term("John 3:16")?.chapter, 3);
        Ok(())
    }

    #[test]
    fn malformed_terms_are_rejected() {
        assert!(parse_search_term("").is_err());
        assert!(parse_search_term("Genesis").is_err());
        assert!(parse_search_term("12 34").is_err());
        let err = parse_search_term("Genesis #2").unwrap_err();
        assert!(err.to_string().contains("chapter is not a number"));
    }

    #[test]
    fn song_of_solomon_is_aliased() {
        let aliases = TermAliases::default();
        assert_eq!(aliases.apply("Song of Solomon 2 1"), "Sng 2 1");
    }

    #[test]
    fn unaliased_terms_pass_through_borrowed() {
        let aliases = TermAliases::default();
        let out = aliases.apply("Genesis 2");
        assert!(matches!(out, Cow::Borrowed("Genesis 2")));
    }
}
