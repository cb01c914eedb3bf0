use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::Value;

use super::DocumentFormat;

/// Where a command result is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Stdout,
    File(PathBuf),
}

impl OutputTarget {
    /// `None` and `"-"` mean stdout; anything else is a file path.
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg {
            None | Some("-") => OutputTarget::Stdout,
            Some(path) => OutputTarget::File(PathBuf::from(path)),
        }
    }

    /// Format implied by the target's file extension, if any.
    pub fn implied_format(&self) -> Option<DocumentFormat> {
        match self {
            OutputTarget::File(path) => Some(DocumentFormat::from_path(path)),
            OutputTarget::Stdout => None,
        }
    }
}

/// Serialization settings for a command result such as a default record,
/// a validation verdict, a JSON Schema or a nested record tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct Report {
    pub format: DocumentFormat,
    pub compact: bool,
}

impl Report {
    pub fn new(format: DocumentFormat) -> Self {
        Self {
            format,
            compact: false,
        }
    }

    pub fn compact(mut self, compact: bool) -> Self {
        self.compact = compact;
        self
    }

    /// Serializes `value` without a trailing newline.
    pub fn render(&self, value: &Value) -> Result<String> {
        match self.format {
            DocumentFormat::Json if self.compact => {
                serde_json::to_string(value).context("failed to serialize JSON")
            }
            DocumentFormat::Json => {
                serde_json::to_string_pretty(value).context("failed to serialize JSON")
            }
            #[cfg(feature = "yaml")]
            DocumentFormat::Yaml => serde_yaml::to_string(value)
                .map(|text| text.trim_end().to_string())
                .context("failed to serialize YAML"),
            #[cfg(feature = "toml")]
            DocumentFormat::Toml => {
                let table = toml_table(value);
                let text = if self.compact {
                    toml::to_string(&table)
                } else {
                    toml::to_string_pretty(&table)
                };
                text.map(|text| text.trim_end().to_string())
                    .context("failed to serialize TOML")
            }
        }
    }

    pub fn write(&self, value: &Value, target: &OutputTarget) -> Result<()> {
        let mut payload = self.render(value)?;
        payload.push('\n');
        match target {
            OutputTarget::Stdout => {
                let mut stdout = io::stdout().lock();
                stdout
                    .write_all(payload.as_bytes())
                    .and_then(|()| stdout.flush())
                    .context("failed to write to stdout")
            }
            OutputTarget::File(path) => fs::write(path, payload)
                .with_context(|| format!("failed to write to file {}", path.display())),
        }
    }
}

/// TOML documents are tables without nulls: null members are dropped and a
/// non-table result (a tree, a bare verdict) is stored under `result`.
#[cfg(feature = "toml")]
fn toml_table(value: &Value) -> Value {
    fn strip(value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .filter(|(_, member)| !member.is_null())
                    .map(|(key, member)| (key.clone(), strip(member)))
                    .collect(),
            ),
            Value::Array(items) => {
                Value::Array(items.iter().filter(|item| !item.is_null()).map(strip).collect())
            }
            other => other.clone(),
        }
    }
    match strip(value) {
        table @ Value::Object(_) => table,
        other => serde_json::json!({ "result": other }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[test]
    fn targets_follow_the_output_argument() {
        assert_eq!(OutputTarget::from_arg(None), OutputTarget::Stdout);
        assert_eq!(OutputTarget::from_arg(Some("-")), OutputTarget::Stdout);
        let file = OutputTarget::from_arg(Some("defaults.json"));
        assert_eq!(file, OutputTarget::File(PathBuf::from("defaults.json")));
        assert_eq!(file.implied_format(), Some(DocumentFormat::Json));
        assert_eq!(OutputTarget::Stdout.implied_format(), None);
    }

    #[test]
    fn compact_reports_fit_on_one_line() {
        let verdict = json!({"valid": false, "errors": {"username": "Username is required"}});
        let compact = Report::new(DocumentFormat::Json).compact(true);
        assert_eq!(
            compact.render(&verdict).unwrap(),
            r#"{"valid":false,"errors":{"username":"Username is required"}}"#
        );
        let pretty = Report::default().render(&verdict).unwrap();
        assert!(pretty.contains("\n  \"valid\": false"));
    }

    #[cfg(feature = "toml")]
    #[test]
    fn toml_reports_wrap_trees_and_drop_nulls() {
        let tree = json!([{"record": {"id": 1, "parentId": null}, "children": []}]);
        let text = Report::new(DocumentFormat::Toml).render(&tree).unwrap();
        assert!(text.contains("[[result]]"));
        assert!(!text.contains("parentId"));
    }

    #[test]
    fn writes_reports_to_files() {
        let path = std::env::temp_dir().join(format!(
            "metawindow-report-{}.json",
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        let target = OutputTarget::File(path.clone());
        Report::default()
            .write(&json!({"id": "", "username": ""}), &target)
            .unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("{\n  \"id\": \"\""));
        assert!(contents.ends_with("}\n"));
        let _ = fs::remove_file(path);
    }
}
