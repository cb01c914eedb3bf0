use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde_json::Value;

use super::DocumentFormat;

/// Parse structured data in any supported format into a `serde_json::Value`.
pub fn parse_document_str(contents: &str, format: DocumentFormat) -> Result<Value> {
    match format {
        DocumentFormat::Json => {
            serde_json::from_str::<Value>(contents).with_context(|| "failed to parse JSON document")
        }
        #[cfg(feature = "yaml")]
        DocumentFormat::Yaml => {
            serde_yaml::from_str::<Value>(contents).with_context(|| "failed to parse YAML document")
        }
        #[cfg(feature = "toml")]
        DocumentFormat::Toml => contents
            .parse::<toml::Value>()
            .with_context(|| "failed to parse TOML document")
            .and_then(|value| {
                serde_json::to_value(value).context("failed to convert TOML to JSON")
            }),
    }
}

/// Reads a document from disk; `-` reads standard input. Without an
/// explicit format the file extension decides.
pub fn load_document(path: &Path, format: Option<DocumentFormat>) -> Result<Value> {
    let contents = if path.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin()).context("failed to read stdin")?
    } else {
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?
    };
    let format = format.unwrap_or_else(|| DocumentFormat::from_path(path));
    parse_document_str(&contents, format).with_context(|| format!("in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_json_documents() {
        let raw = "{\"enabled\":true}";
        let parsed = parse_document_str(raw, DocumentFormat::Json).unwrap();
        assert_eq!(parsed["enabled"], Value::Bool(true));
    }

    #[test]
    fn reports_broken_json() {
        let err = parse_document_str("{", DocumentFormat::Json).unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse JSON document"));
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn parse_yaml_documents() {
        let raw = "tabs:\n  - title: Users\n    insertProc: usr_ins";
        let parsed = parse_document_str(raw, DocumentFormat::Yaml).unwrap();
        assert_eq!(parsed["tabs"][0]["insertProc"], json!("usr_ins"));
    }

    #[cfg(feature = "toml")]
    #[test]
    fn parse_toml_documents() {
        let raw = "page_size = 20\n[endpoints]\nsave = \"api/save\"";
        let parsed = parse_document_str(raw, DocumentFormat::Toml).unwrap();
        assert_eq!(parsed["page_size"], json!(20));
        assert_eq!(parsed["endpoints"]["save"], json!("api/save"));
    }

    #[test]
    fn loads_files_by_extension() {
        let path = std::env::temp_dir().join(format!("metawindow-load-{}.json", std::process::id()));
        fs::write(&path, r#"{"id": 7}"#).unwrap();
        let value = load_document(&path, None).unwrap();
        assert_eq!(value, json!({"id": 7}));
        let _ = fs::remove_file(path);
    }
}
