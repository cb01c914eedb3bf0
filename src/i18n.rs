use std::collections::HashMap;

/// Maps a translation key to localized text.
pub trait Translator: Send + Sync {
    /// `None` when the key has no translation.
    fn translate(&self, key: &str) -> Option<String>;
}

/// Translator without a catalogue; every lookup falls back.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTranslation;

impl Translator for NoTranslation {
    fn translate(&self, _key: &str) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, Default)]
pub struct MapTranslator {
    entries: HashMap<String, String>,
}

impl MapTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, text: impl Into<String>) -> Self {
        self.entries.insert(key.into(), text.into());
        self
    }
}

impl Translator for MapTranslator {
    fn translate(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }
}

const FALLBACKS: &[(&str, &str)] = &[
    ("validation.required", "{label} is required"),
    ("validation.email", "{label} must be a valid email address"),
    ("validation.min", "{label} must be at least {count} characters"),
    ("validation.max", "{label} must be at most {count} characters"),
    ("validation.type", "{label} has an invalid value"),
    ("common.save", "Save"),
    ("common.cancel", "Cancel"),
    ("dialog.new", "New"),
    ("dialog.edit", "Edit"),
    ("dialog.copy", "Copy"),
    ("dialog.delete", "Delete"),
];

/// Translated text for `key`, the built-in English text, or the key itself.
pub fn text(translator: &dyn Translator, key: &str) -> String {
    translator
        .translate(key)
        .or_else(|| {
            FALLBACKS
                .iter()
                .find(|(fallback, _)| *fallback == key)
                .map(|(_, text)| text.to_string())
        })
        .unwrap_or_else(|| key.to_string())
}

/// Like [`text`], with `{name}` placeholders substituted.
pub fn message(translator: &dyn Translator, key: &str, args: &[(&str, &str)]) -> String {
    args.iter()
        .fold(text(translator, key), |acc, (name, value)| {
            acc.replace(&format!("{{{name}}}"), value)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_builtin_text_then_key() {
        let none = NoTranslation;
        assert_eq!(
            message(&none, "validation.required", &[("label", "Email")]),
            "Email is required"
        );
        assert_eq!(text(&none, "users.title"), "users.title");
    }

    #[test]
    fn catalogue_entries_win() {
        let de = MapTranslator::new().with("validation.required", "{label} ist erforderlich");
        assert_eq!(
            message(&de, "validation.required", &[("label", "E-Mail")]),
            "E-Mail ist erforderlich"
        );
    }
}
