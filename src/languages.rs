//! Language registry
//!
//! Static table mapping a language id to its Wikipedia API origin and
//! display metadata. Selecting a language is a pure lookup; unknown ids
//! fall back to the first (default) entry.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// A supported Wikipedia language edition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    /// Language identifier, also used as the `variant` query parameter
    pub id: String,
    /// Human-readable name in the language itself
    pub name: String,
    /// Flag icon URL for display
    pub flag: String,
    /// Action API origin for this edition
    pub api_origin: String,
    /// A well-known article title, used for connectivity checks
    pub sample_article: String,
}

impl Language {
    fn new(id: &str, name: &str, flag_code: &str, sample_article: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            flag: format!("https://hatscripts.github.io/circle-flags/flags/{}.svg", flag_code),
            api_origin: format!("https://{}.wikipedia.org/w/api.php", id),
            sample_article: sample_article.to_string(),
        }
    }
}

/// All supported language editions. The first entry is the default.
pub static LANGUAGES: Lazy<Vec<Language>> = Lazy::new(|| {
    vec![
        Language::new("en", "English", "us", "Albert Einstein"),
        Language::new("de", "Deutsch", "de", "Johann Wolfgang von Goethe"),
        Language::new("es", "Español", "es", "Miguel de Cervantes"),
        Language::new("fr", "Français", "fr", "Victor Hugo"),
        Language::new("it", "Italiano", "it", "Leonardo da Vinci"),
        Language::new("ja", "日本語", "jp", "夏目漱石"),
        Language::new("pt", "Português", "pt", "Fernando Pessoa"),
        Language::new("ru", "Русский", "ru", "Лев Толстой"),
        Language::new("zh", "中文", "cn", "鲁迅"),
        Language::new("ar", "العربية", "sa", "ابن سينا"),
        Language::new("ko", "한국어", "kr", "세종대왕"),
        Language::new("nl", "Nederlands", "nl", "Vincent van Gogh"),
        Language::new("pl", "Polski", "pl", "Maria Skłodowska-Curie"),
        Language::new("tr", "Türkçe", "tr", "Mustafa Kemal Atatürk"),
        Language::new("uk", "Українська", "ua", "Тарас Шевченко"),
    ]
});

/// Looks up a language by id
pub fn lookup(id: &str) -> Option<&'static Language> {
    LANGUAGES.iter().find(|lang| lang.id == id)
}

/// Looks up a language by id, falling back to the default entry
pub fn lookup_or_default(id: &str) -> &'static Language {
    lookup(id).unwrap_or(&LANGUAGES[0])
}

/// The default language (first registry entry)
pub fn default_language() -> &'static Language {
    &LANGUAGES[0]
}
