//! Saving OCR results as JSON.

use std::{fs, io::Write as _};

use schemars::JsonSchema;

use crate::prelude::*;

/// The OCR text of one page.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PageResult {
    /// The 1-based page number.
    pub page: usize,

    /// The recognized text, with leading and trailing whitespace removed.
    pub text: String,
}

impl PageResult {
    /// Create a result for `page`, trimming the raw recognizer output.
    pub fn new(page: usize, raw_text: &str) -> Self {
        Self {
            page,
            text: raw_text.trim().to_owned(),
        }
    }
}

/// Write `results` to `path` as a pretty-printed JSON array.
///
/// Missing parent directories are created. The file is written next to its
/// final location and then renamed into place, so readers see either the old
/// file or the complete new one, and a failed write leaves nothing behind.
#[instrument(level = "debug", skip_all, fields(path = %path.display(), pages = results.len()))]
pub fn write_results(results: &[PageResult], path: &Path) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create directory {:?}", parent.display()))?;

    let json =
        serde_json::to_vec_pretty(results).context("failed to serialize OCR results")?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".ocr-")
        .suffix(".json.tmp")
        .tempfile_in(parent)
        .with_context(|| {
            format!("failed to create temporary file in {:?}", parent.display())
        })?;
    tmp.write_all(&json)
        .context("failed to write temporary JSON file")?;
    tmp.as_file()
        .sync_all()
        .context("failed to flush temporary JSON file")?;
    tmp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to save {:?}", path.display()))?;
    debug!("saved OCR results");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_results(path: &Path) -> Vec<PageResult> {
        let data = fs::read_to_string(path).unwrap();
        serde_json::from_str(&data).unwrap()
    }

    #[test]
    fn page_results_trim_only_the_edges() {
        let result = PageResult::new(1, "\n  Xin chào,\n  thế giới  \n\n");
        assert_eq!(result.text, "Xin chào,\n  thế giới");
    }

    #[test]
    fn writes_pretty_json_in_page_order() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("writer")?;
        let path = dir.path().join("out.json");
        let results = vec![
            PageResult::new(1, "A"),
            PageResult::new(2, "B"),
            PageResult::new(3, "C"),
        ];
        write_results(&results, &path)?;

        let expected = r#"[
  {
    "page": 1,
    "text": "A"
  },
  {
    "page": 2,
    "text": "B"
  },
  {
    "page": 3,
    "text": "C"
  }
]"#;
        assert_eq!(fs::read_to_string(&path)?, expected);
        Ok(())
    }

    #[test]
    fn multibyte_text_is_written_verbatim() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("writer")?;
        let path = dir.path().join("out.json");
        let results = vec![
            PageResult::new(1, "Toán lớp 1"),
            PageResult::new(2, "日本語のテキスト"),
            PageResult::new(3, "tab\there \"quoted\""),
        ];
        write_results(&results, &path)?;

        let raw = fs::read_to_string(&path)?;
        assert!(raw.contains("Toán lớp 1"));
        assert!(raw.contains("日本語のテキスト"));
        assert_eq!(read_results(&path), results);
        Ok(())
    }

    #[test]
    fn creates_missing_parent_directories() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("writer")?;
        let path = dir.path().join("a/b/c/out.json");
        write_results(&[PageResult::new(1, "x")], &path)?;
        assert_eq!(read_results(&path), [PageResult::new(1, "x")]);
        Ok(())
    }

    #[test]
    fn overwrites_and_is_repeatable() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("writer")?;
        let path = dir.path().join("out.json");
        fs::write(&path, "stale")?;

        let results = vec![PageResult::new(1, "first"), PageResult::new(2, "")];
        write_results(&results, &path)?;
        let first = fs::read(&path)?;
        write_results(&results, &path)?;
        let second = fs::read(&path)?;
        assert_eq!(first, second);
        assert_eq!(read_results(&path), results);

        // Only the output file is left in the directory.
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }

    #[test]
    fn empty_result_sets_are_valid_json() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("writer")?;
        let path = dir.path().join("out.json");
        write_results(&[], &path)?;
        assert_eq!(fs::read_to_string(&path)?, "[]");
        Ok(())
    }

    #[test]
    fn failed_writes_leave_nothing_behind() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("writer")?;
        // A directory can't be replaced by a file.
        let path = dir.path().join("taken");
        fs::create_dir(&path)?;
        assert!(write_results(&[PageResult::new(1, "x")], &path).is_err());
        let leftovers = fs::read_dir(dir.path())?
            .map(|entry| entry.map(|e| e.file_name()))
            .collect::<Result<Vec<_>, _>>()?;
        assert_eq!(leftovers, ["taken"]);
        Ok(())
    }
}
