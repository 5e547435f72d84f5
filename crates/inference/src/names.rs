use regex::Regex;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::LazyLock;

/// `0: 'person'` or `"1": "bicycle"` inside a dict literal.
static NAME_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"["']?(\d+)["']?\s*:\s*(?:'((?:[^'\\]|\\.)*)'|"((?:[^"\\]|\\.)*)")"#)
        .expect("class name pattern is valid")
});

/// Class index to human-readable name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassNames {
    names: BTreeMap<usize, String>,
}

impl ClassNames {
    pub fn new(names: BTreeMap<usize, String>) -> Self {
        Self { names }
    }

    /// Parse the `names` entry YOLO exports embed in model metadata, e.g.
    /// `{0: 'person', 1: 'bicycle'}`. JSON objects with string keys also parse.
    pub fn from_metadata(raw: &str) -> anyhow::Result<Self> {
        let names: BTreeMap<usize, String> = NAME_ENTRY
            .captures_iter(raw)
            .map(|caps| -> anyhow::Result<(usize, String)> {
                let index = caps[1].parse()?;
                let name = caps
                    .get(2)
                    .or_else(|| caps.get(3))
                    .map(|m| unescape(m.as_str()))
                    .unwrap_or_default();
                Ok((index, name))
            })
            .collect::<anyhow::Result<_>>()?;

        if names.is_empty() {
            anyhow::bail!("No class names found in model metadata: {:?}", raw);
        }

        Ok(Self { names })
    }

    /// One class name per line; line `i` is class `i`.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let mut lines = reader
            .lines()
            .map(|line| line.map(|l| l.trim().to_string()))
            .collect::<Result<Vec<_>, _>>()?;

        while lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }

        if lines.is_empty() {
            anyhow::bail!("Class names file {} is empty", path.display());
        }

        Ok(Self {
            names: lines.into_iter().enumerate().collect(),
        })
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(&index).map(String::as_str)
    }

    /// Number of classes the model scores, i.e. one past the highest index.
    pub fn num_classes(&self) -> usize {
        self.names.keys().next_back().map_or(0, |max| max + 1)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ClassNames {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).enumerate().collect(),
        }
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_python_dict_literal() {
        let names = ClassNames::from_metadata("{0: 'person', 1: 'bicycle', 2: 'car'}").unwrap();
        assert_eq!(names.len(), 3);
        assert_eq!(names.get(0), Some("person"));
        assert_eq!(names.get(2), Some("car"));
        assert_eq!(names.get(3), None);
    }

    #[test]
    fn parses_names_with_spaces_commas_and_quotes() {
        let raw = r#"{0: 'traffic light', 1: "dog's toy", 2: 'a, b', 3: 'it\'s'}"#;
        let names = ClassNames::from_metadata(raw).unwrap();
        assert_eq!(names.get(0), Some("traffic light"));
        assert_eq!(names.get(1), Some("dog's toy"));
        assert_eq!(names.get(2), Some("a, b"));
        assert_eq!(names.get(3), Some("it's"));
    }

    #[test]
    fn parses_json_object_with_string_keys() {
        let names = ClassNames::from_metadata(r#"{"0": "plane", "1": "ship"}"#).unwrap();
        assert_eq!(names.get(1), Some("ship"));
    }

    #[test]
    fn rejects_metadata_without_entries() {
        assert!(ClassNames::from_metadata("{}").is_err());
        assert!(ClassNames::from_metadata("").is_err());
    }

    #[test]
    fn num_classes_accounts_for_sparse_tables() {
        let names = ClassNames::from_metadata("{0: 'a', 5: 'f'}").unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(names.num_classes(), 6);
        assert_eq!(ClassNames::default().num_classes(), 0);
    }

    #[test]
    fn loads_newline_separated_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "plane").unwrap();
        writeln!(file, "  ship  ").unwrap();
        writeln!(file, "storage tank").unwrap();
        writeln!(file).unwrap();

        let names = ClassNames::from_file(file.path()).unwrap();
        assert_eq!(names.len(), 3);
        assert_eq!(names.get(1), Some("ship"));
        assert_eq!(names.get(2), Some("storage tank"));
    }

    #[test]
    fn empty_file_is_an_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(ClassNames::from_file(file.path()).is_err());
    }

    #[test]
    fn collects_from_iterator() {
        let names: ClassNames = ["cat", "dog"].into_iter().collect();
        assert_eq!(names.get(1), Some("dog"));
        assert_eq!(names.num_classes(), 2);
    }
}
