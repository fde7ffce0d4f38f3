//! Papers and their passages.

use std::fmt;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static PARAGRAPH_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n\s*\n+").expect("Invalid paragraph split regex"));

static HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#{1,6}\s+(.+?)\s*$").expect("Invalid heading regex"));

/// Section type given to passages that precede any heading.
pub const UNKNOWN_SECTION: &str = "unknown";

/// One paragraph of source text. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passage {
    pub section_type: String,
    pub text: String,
}

impl Passage {
    pub fn new(section_type: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            section_type: section_type.into(),
            text: text.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

impl fmt::Display for Passage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PaperError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid paper json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Paper {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(alias = "passages")]
    pub paragraphs: Vec<Passage>,
}

impl Paper {
    pub fn from_json_str(json: &str) -> Result<Self, PaperError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Plain text: blank lines separate paragraphs; a markdown heading sets
    /// the section type of the paragraphs after it.
    pub fn from_text(text: &str) -> Self {
        let mut section = UNKNOWN_SECTION.to_string();
        let mut title = None;
        let mut paragraphs = Vec::new();

        for block in PARAGRAPH_SPLIT.split(text) {
            let mut body = Vec::new();
            for line in block.lines() {
                match HEADING.captures(line.trim()) {
                    Some(caps) => {
                        let heading = caps[1].to_string();
                        if title.is_none() && line.trim_start().starts_with("# ") {
                            title = Some(heading.clone());
                        }
                        section = heading.to_lowercase();
                    }
                    None => body.push(line),
                }
            }
            let body = body.join("\n");
            let body = body.trim();
            if !body.is_empty() {
                paragraphs.push(Passage::new(section.clone(), body));
            }
        }

        Self { title, paragraphs }
    }

    /// `.json` files are parsed as JSON, anything else as plain text.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PaperError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json_str(&raw)
        } else {
            Ok(Self::from_text(&raw))
        }
    }

    pub fn nonempty_passages(&self) -> Vec<Passage> {
        self.paragraphs
            .iter()
            .filter(|p| !p.is_empty())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_headings_label_sections() {
        let paper = Paper::from_text(
            "# A trial\n\nPreamble line.\n\n## Methods\nWe enrolled 120 adults.\n\nAges 18-65.\n\n## Results\n\nMortality fell.",
        );
        assert_eq!(paper.title.as_deref(), Some("A trial"));
        let sections: Vec<&str> = paper
            .paragraphs
            .iter()
            .map(|p| p.section_type.as_str())
            .collect();
        assert_eq!(sections, vec!["a trial", "methods", "methods", "results"]);
        assert_eq!(paper.paragraphs[1].text, "We enrolled 120 adults.");
    }

    #[test]
    fn text_without_headings_is_unknown_section() {
        let paper = Paper::from_text("one\n\n\n\ntwo\n  \nthree");
        assert_eq!(paper.paragraphs.len(), 3);
        assert!(paper
            .paragraphs
            .iter()
            .all(|p| p.section_type == UNKNOWN_SECTION));
    }

    #[test]
    fn nonempty_filter_drops_blank_passages() {
        let paper = Paper::from_json_str(
            r#"{"paragraphs":[{"section_type":"abstract","text":"x"},{"section_type":"methods","text":"  "}]}"#,
        )
        .unwrap();
        assert_eq!(paper.paragraphs.len(), 2);
        let kept = paper.nonempty_passages();
        assert_eq!(kept, vec![Passage::new("abstract", "x")]);
    }

    #[test]
    fn passage_renders_as_its_text() {
        assert_eq!(Passage::new("methods", "n = 40").to_string(), "n = 40");
    }
}
