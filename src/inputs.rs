use std::path::{Path, PathBuf};

use anyhow::Context as _;

pub const SEARCH_TERMS_COLUMN: &str = "search_terms";
pub const VERSIONS_COLUMN: &str = "versions";

/// Non-blank values of `column`, in file order.
pub fn read_column(path: &Path, column: &str) -> anyhow::Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("open {}", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("read header of {}", path.display()))?;
    let idx = headers
        .iter()
        .position(|header| header.trim() == column)
        .with_context(|| format!("{} has no {column:?} column", path.display()))?;

    let mut values = Vec::new();
    for row in reader.records() {
        let row = row.with_context(|| format!("read row of {}", path.display()))?;
        if let Some(value) = row.get(idx).map(str::trim)
            && !value.is_empty()
        {
            values.push(value.to_owned());
        }
    }
    Ok(values)
}

/// The `.csv` files directly under `dir`, sorted by file name. Each one holds one book's terms.
pub fn term_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
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
