//! Dutch/English detection and response-language instruction injection
//!
//! Word-list scoring with a conservative threshold: fewer than two
//! recognizable words means "unknown", and one language must beat the other
//! by more than 1.5x before we override the website hint. The injected
//! instruction is prepended to the model-facing message only; the stored
//! user message keeps the original text.

use once_cell::sync::Lazy;
use regex::Regex;

const DUTCH_WORDS: &[&str] = &[
    // articles / determiners
    "de", "het", "een", "deze", "dit", "alle",
    // common verbs
    "zijn", "heb", "hebben", "kan", "kunnen", "wil", "willen", "moet", "moeten", "maak", "maken",
    "geef", "geven", "toon", "tonen", "verwijder", "verwijderen", "wijzig", "wijzigen", "voeg",
    "toevoegen",
    // pronouns
    "ik", "jij", "je", "wij", "we", "mijn", "jouw", "onze",
    // interrogatives
    "wat", "hoe", "waarom", "wanneer", "waar", "welke", "wie",
    // negations
    "niet", "geen",
    // prepositions / connectors
    "van", "voor", "met", "naar", "bij", "ook", "maar",
    // project-management domain
    "project", "projecten", "taak", "taken", "mijlpaal", "mijlpalen", "programma", "programmas",
    "overzicht", "planning", "voortgang", "deadline", "budget",
];

const ENGLISH_WORDS: &[&str] = &[
    // articles / determiners
    "the", "a", "an", "this", "these", "all",
    // common verbs
    "is", "are", "have", "has", "can", "could", "will", "would", "want", "need", "create", "make",
    "give", "show", "list", "delete", "remove", "update", "change", "add",
    // pronouns
    "i", "you", "we", "my", "your", "our",
    // interrogatives
    "what", "how", "why", "when", "where", "which", "who",
    // negations
    "not", "no",
    // prepositions / connectors
    "of", "for", "with", "to", "at", "also", "but",
    // project-management domain
    "project", "projects", "task", "tasks", "milestone", "milestones", "program", "programs",
    "overview", "schedule", "progress", "deadline", "budget",
];

static DUTCH_RE: Lazy<Regex> = Lazy::new(|| word_list_regex(DUTCH_WORDS));
static ENGLISH_RE: Lazy<Regex> = Lazy::new(|| word_list_regex(ENGLISH_WORDS));

fn word_list_regex(words: &[&str]) -> Regex {
    let pattern = format!(r"(?i)\b(?:{})\b", words.join("|"));
    Regex::new(&pattern).expect("word list regex compiles")
}

pub const DUTCH_INSTRUCTION: &str = "[BELANGRIJK: Antwoord volledig in het Nederlands] ";
pub const ENGLISH_INSTRUCTION: &str = "[IMPORTANT: Respond entirely in English] ";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Language {
    Dutch,
    English,
    Unknown,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::Dutch => "nl",
            Language::English => "en",
            Language::Unknown => "unknown",
        }
    }

    fn from_hint(hint: &str) -> Language {
        match hint.trim().to_lowercase().as_str() {
            "en" => Language::English,
            _ => Language::Dutch,
        }
    }
}

/// Score-based detection over the two word lists
pub fn detect(text: &str) -> Language {
    let dutch = DUTCH_RE.find_iter(text).count();
    let english = ENGLISH_RE.find_iter(text).count();

    if dutch + english < 2 {
        return Language::Unknown;
    }
    if dutch as f64 > english as f64 * 1.5 {
        Language::Dutch
    } else if english as f64 > dutch as f64 * 1.5 {
        Language::English
    } else {
        Language::Unknown
    }
}

/// Final language choice: a confident detection wins over the website hint,
/// anything else falls back to the hint (default "nl").
pub fn choose(text: &str, website_hint: &str) -> Language {
    match detect(text) {
        Language::Unknown => Language::from_hint(website_hint),
        confident => confident,
    }
}

pub fn instruction(language: Language) -> &'static str {
    match language {
        Language::Dutch => DUTCH_INSTRUCTION,
        // Unknown never reaches the model; choose() resolves to nl/en first
        Language::English | Language::Unknown => ENGLISH_INSTRUCTION,
    }
}

/// Model-facing message with the language instruction prepended
pub fn tag_message(text: &str, language: Language) -> String {
    format!("{}{}", instruction(language), text)
}
