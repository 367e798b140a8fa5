//! Response shaping
//!
//! The driver's final text is either plain prose or a JSON directive that a
//! return_direct tool produced (a form payload or a view instruction). JSON
//! directives are replaced with a short localized announcement for display
//! while the raw payload is kept for the frontend; plain prose passes through
//! untouched with no raw copy.

use serde_json::Value;

use crate::language::Language;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShapedResponse {
    pub display_content: String,
    /// Original model/tool output, present only when it was transformed
    pub raw_output: Option<String>,
}

impl ShapedResponse {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            display_content: text.into(),
            raw_output: None,
        }
    }

    fn transformed(display: String, raw: &str) -> Self {
        Self {
            display_content: display,
            raw_output: Some(raw.to_string()),
        }
    }
}

/// `task_review` -> `Task Review`
fn title_case(form_type: &str) -> String {
    form_type
        .split(['_', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn form_announcement(form_type: &str, language: Language) -> String {
    let english = match form_type {
        "project_creation" => "Project creation form has been initiated.",
        "project_update" => "Project update form has been initiated.",
        "task_creation" => "Task creation form has been initiated.",
        "task_update" => "Task update form has been initiated.",
        "milestone_creation" => "Milestone creation form has been initiated.",
        "milestone_update" => "Milestone update form has been initiated.",
        "program_creation" => "Programme creation form has been initiated.",
        other => {
            let title = title_case(other);
            return match language {
                Language::Dutch => format!("Het formulier '{}' is gestart.", title),
                _ => format!("{} form has been initiated.", title),
            };
        }
    };
    if language != Language::Dutch {
        return english.to_string();
    }
    match form_type {
        "project_creation" => "Het projectaanmaakformulier is gestart.",
        "project_update" => "Het projectwijzigingsformulier is gestart.",
        "task_creation" => "Het taakaanmaakformulier is gestart.",
        "task_update" => "Het taakwijzigingsformulier is gestart.",
        "milestone_creation" => "Het mijlpaalaanmaakformulier is gestart.",
        "milestone_update" => "Het mijlpaalwijzigingsformulier is gestart.",
        "program_creation" => "Het programma-aanmaakformulier is gestart.",
        _ => unreachable!("handled above"),
    }
    .to_string()
}

/// Shape the driver's final text for display.
///
/// Only a full JSON object (`{`…`}`) is sniffed; anything else, including
/// prose that merely contains braces, passes through as plain text.
pub fn shape(raw: &str, language: Language) -> ShapedResponse {
    let trimmed = raw.trim();
    if !(trimmed.starts_with('{') && trimmed.ends_with('}')) {
        return ShapedResponse::plain(raw);
    }
    let Ok(value) = serde_json::from_str::<Value>(trimmed) else {
        return ShapedResponse::plain(raw);
    };

    if let Some(form_type) = value.get("form_type").and_then(Value::as_str) {
        return ShapedResponse::transformed(form_announcement(form_type, language), trimmed);
    }
    if value.get("view").is_some() {
        let display = value
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        return ShapedResponse::transformed(display, trimmed);
    }

    // Other JSON (tool payloads the model echoed) is shown as-is.
    ShapedResponse::plain(raw)
}
