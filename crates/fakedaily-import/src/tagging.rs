use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

const EMBEDDED_TAG_RULES: &str = include_str!("../../../rules/tags.yaml");
const SUPPORTED_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("reading tag rules {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing tag rules: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("unsupported tag rules version {0}")]
    UnsupportedVersion(u32),
}

#[derive(Debug, Clone, Deserialize)]
struct TagRulesFile {
    version: u32,
    #[serde(default)]
    rules: Vec<TagRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TagRule {
    pub tag: String,
    pub contains_any: Vec<String>,
}

/// Read-only keyword table, loaded once per process.
#[derive(Debug, Clone)]
pub struct TagRules {
    rules: Vec<TagRule>,
}

impl TagRules {
    pub fn embedded() -> Result<Self, RuleError> {
        Self::from_yaml_str(EMBEDDED_TAG_RULES)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, RuleError> {
        let file: TagRulesFile = serde_yaml::from_str(text)?;
        if file.version != SUPPORTED_VERSION {
            return Err(RuleError::UnsupportedVersion(file.version));
        }
        let rules = file
            .rules
            .into_iter()
            .map(|rule| TagRule {
                tag: rule.tag.trim().to_string(),
                contains_any: rule
                    .contains_any
                    .into_iter()
                    .map(|needle| needle.to_lowercase())
                    .filter(|needle| !needle.is_empty())
                    .collect(),
            })
            .filter(|rule| !rule.tag.is_empty())
            .collect();
        Ok(Self { rules })
    }

    pub fn from_path(path: &Path) -> Result<Self, RuleError> {
        let text = std::fs::read_to_string(path).map_err(|source| RuleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// The file at `path` when given, the built-in table otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, RuleError> {
        match path {
            Some(path) => Self::from_path(path),
            None => Self::embedded(),
        }
    }

    pub fn rules(&self) -> &[TagRule] {
        &self.rules
    }

    /// Sorted, de-duplicated tags whose triggers occur in title or content.
    pub fn generate_tags(&self, title: &str, content: &str) -> Vec<String> {
        let haystack = format!("{title} {content}").to_lowercase();
        let mut tags: Vec<String> = self
            .rules
            .iter()
            .filter(|rule| rule.contains_any.iter().any(|needle| haystack.contains(needle.as_str())))
            .map(|rule| rule.tag.clone())
            .collect();
        tags.sort();
        tags.dedup();
        tags
    }

    /// Keeps `tags` unless empty.
    pub fn tags_or_generated(&self, tags: &[String], title: &str, content: &str) -> Vec<String> {
        if tags.iter().any(|t| !t.trim().is_empty()) {
            tags.to_vec()
        } else {
            self.generate_tags(title, content)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: &str = r#"
version: 1
rules:
  - tag: "Politik EU"
    contains_any: ["eu ", "Brüssel"]
  - tag: "Technologie"
    contains_any: ["ki ", "roboter"]
  - tag: "Politik EU"
    contains_any: ["straßburg"]
"#;

    #[test]
    fn embedded_table_loads() {
        let rules = TagRules::embedded().expect("embedded rules");
        assert_eq!(rules.rules().len(), 15);
        assert!(rules.rules().iter().any(|r| r.tag == "Politik Österreich"));
    }

    #[test]
    fn generated_tags_are_sorted_and_unique() {
        let rules = TagRules::from_yaml_str(SMALL).expect("rules");
        assert_eq!(
            rules.generate_tags("Roboter in BRÜSSEL", "Die eu verhandelt in Straßburg"),
            vec!["Politik EU", "Technologie"]
        );
        assert!(rules.generate_tags("Wetter", "Sonnig").is_empty());
    }

    #[test]
    fn trailing_space_triggers_are_word_boundaries() {
        let rules = TagRules::from_yaml_str(SMALL).expect("rules");
        assert!(rules.generate_tags("Die Skier", "").is_empty());
        assert_eq!(rules.generate_tags("Die KI übernimmt", ""), vec!["Technologie"]);
    }

    #[test]
    fn existing_tags_are_kept() {
        let rules = TagRules::from_yaml_str(SMALL).expect("rules");
        let existing = vec!["Satire".to_string()];
        assert_eq!(rules.tags_or_generated(&existing, "Roboter", ""), existing);
        assert_eq!(
            rules.tags_or_generated(&[], "Roboter", ""),
            vec!["Technologie".to_string()]
        );
    }

    #[test]
    fn embedded_table_tags_real_headlines() {
        let rules = TagRules::embedded().expect("embedded rules");
        let tags = rules.generate_tags("Kickl fordert Schnitzelpflicht", "");
        assert!(tags.contains(&"Politik Österreich".to_string()));
        assert!(tags.contains(&"Lebensmittel".to_string()));
    }

    #[test]
    fn bad_files_are_reported() {
        assert!(matches!(
            TagRules::from_yaml_str("version: 2\nrules: []"),
            Err(RuleError::UnsupportedVersion(2))
        ));
        assert!(matches!(TagRules::from_yaml_str("rules: ["), Err(RuleError::Parse(_))));
        assert!(matches!(
            TagRules::from_path(Path::new("/nonexistent/tags.yaml")),
            Err(RuleError::Io { .. })
        ));
    }
}
