//! Form schema catalog
//!
//! Declarative descriptions of the forms the agent may hand to the UI instead
//! of executing a mutation directly. The catalog is built once at startup and
//! shared read-only; update variants are shallow clones of a base schema with
//! `entity_id` and `current_values` filled in from the fetched object.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::{Map, Value};

pub const PROJECT_METHODOLOGIES: &[(&str, &str)] = &[
    ("agile", "Agile"),
    ("scrum", "Scrum"),
    ("kanban", "Kanban"),
    ("waterfall", "Waterfall"),
    ("prince2", "PRINCE2"),
    ("six_sigma", "Six Sigma"),
    ("safe", "SAFe"),
    ("msp", "MSP"),
    ("pmi", "PMI"),
];

const PROJECT_STATUSES: &[(&str, &str)] = &[
    ("planning", "Planning"),
    ("in_progress", "In Progress"),
    ("on_hold", "On Hold"),
    ("completed", "Completed"),
    ("cancelled", "Cancelled"),
];

const TASK_STATUSES: &[(&str, &str)] = &[
    ("todo", "To Do"),
    ("in_progress", "In Progress"),
    ("blocked", "Blocked"),
    ("done", "Done"),
];

const MILESTONE_STATUSES: &[(&str, &str)] = &[
    ("pending", "Pending"),
    ("in_progress", "In Progress"),
    ("completed", "Completed"),
];

const TASK_PRIORITIES: &[(&str, &str)] = &[
    ("low", "Low"),
    ("medium", "Medium"),
    ("high", "High"),
    ("critical", "Critical"),
];

#[derive(Clone, Debug, Serialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Textarea,
    Select,
    DynamicSelect,
    Date,
    Number,
}

#[derive(Clone, Debug, Serialize)]
pub struct FormField {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<SelectOption>>,
    /// Remote list endpoint for dynamic selects
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_field: Option<String>,
}

impl FormField {
    fn new(name: &str, label: &str, kind: FieldKind, required: bool) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind,
            required,
            default: None,
            placeholder: None,
            options: None,
            options_url: None,
            label_field: None,
            value_field: None,
        }
    }

    pub fn text(name: &str, label: &str, required: bool) -> Self {
        Self::new(name, label, FieldKind::Text, required)
    }

    pub fn textarea(name: &str, label: &str, required: bool) -> Self {
        Self::new(name, label, FieldKind::Textarea, required)
    }

    pub fn date(name: &str, label: &str, required: bool) -> Self {
        Self::new(name, label, FieldKind::Date, required)
    }

    pub fn number(name: &str, label: &str, required: bool) -> Self {
        Self::new(name, label, FieldKind::Number, required)
    }

    pub fn select(name: &str, label: &str, required: bool, options: &[(&str, &str)]) -> Self {
        let mut field = Self::new(name, label, FieldKind::Select, required);
        field.options = Some(
            options
                .iter()
                .map(|(value, label)| SelectOption {
                    value: value.to_string(),
                    label: label.to_string(),
                })
                .collect(),
        );
        field
    }

    pub fn dynamic_select(
        name: &str,
        label: &str,
        required: bool,
        url: &str,
        label_field: &str,
        value_field: &str,
    ) -> Self {
        let mut field = Self::new(name, label, FieldKind::DynamicSelect, required);
        field.options_url = Some(url.to_string());
        field.label_field = Some(label_field.to_string());
        field.value_field = Some(value_field.to_string());
        field
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_placeholder(mut self, placeholder: &str) -> Self {
        self.placeholder = Some(placeholder.to_string());
        self
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct FormSchema {
    pub form_type: String,
    pub title: String,
    pub fields: Vec<FormField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_values: Option<Map<String, Value>>,
}

impl FormSchema {
    fn new(form_type: &str, title: &str, fields: Vec<FormField>) -> Self {
        Self {
            form_type: form_type.to_string(),
            title: title.to_string(),
            fields,
            entity_id: None,
            current_values: None,
        }
    }

    /// Clone of this schema bound to an existing entity
    pub fn for_entity(&self, entity_id: i64, current_values: Map<String, Value>) -> Self {
        let mut schema = self.clone();
        schema.entity_id = Some(entity_id);
        schema.current_values = Some(current_values);
        schema
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).expect("form schema serializes")
    }
}

fn project_fields() -> Vec<FormField> {
    vec![
        FormField::text("name", "Project Name", true).with_placeholder("e.g. Website Redesign"),
        FormField::textarea("description", "Description", false),
        FormField::select("methodology", "Methodology", true, PROJECT_METHODOLOGIES),
        FormField::date("start_date", "Start Date", true),
        FormField::date("end_date", "End Date", true),
        FormField::number("budget", "Budget", false).with_default(Value::from(0)),
    ]
}

fn task_fields() -> Vec<FormField> {
    vec![
        FormField::text("title", "Task Title", true),
        FormField::textarea("description", "Description", false),
        FormField::dynamic_select(
            "milestone_id",
            "Milestone",
            true,
            "/api/milestones/",
            "name",
            "id",
        ),
        FormField::select("priority", "Priority", false, TASK_PRIORITIES)
            .with_default(Value::from("medium")),
        FormField::date("start_date", "Start Date", false),
        FormField::date("due_date", "Due Date", false),
        FormField::dynamic_select("assigned_to", "Assignee", false, "/api/users/", "name", "id"),
    ]
}

fn milestone_fields() -> Vec<FormField> {
    vec![
        FormField::text("name", "Milestone Name", true),
        FormField::textarea("description", "Description", false),
        FormField::dynamic_select("project_id", "Project", true, "/api/projects/", "name", "id"),
        FormField::date("start_date", "Start Date", true),
        FormField::date("end_date", "End Date", true),
    ]
}

fn program_fields() -> Vec<FormField> {
    vec![
        FormField::text("name", "Programme Name", true),
        FormField::textarea("description", "Description", false),
        FormField::date("start_date", "Start Date", false),
        FormField::date("end_date", "End Date", false),
    ]
}

fn with_status(mut fields: Vec<FormField>, options: &[(&str, &str)]) -> Vec<FormField> {
    fields.push(FormField::select("status", "Status", false, options));
    fields
}

static CATALOG: Lazy<HashMap<&'static str, FormSchema>> = Lazy::new(|| {
    let mut catalog = HashMap::new();
    catalog.insert(
        "project_creation",
        FormSchema::new("project_creation", "Create Project", project_fields()),
    );
    catalog.insert(
        "project_update",
        FormSchema::new(
            "project_update",
            "Update Project",
            with_status(project_fields(), PROJECT_STATUSES),
        ),
    );
    catalog.insert(
        "task_creation",
        FormSchema::new("task_creation", "Create Task", task_fields()),
    );
    catalog.insert(
        "task_update",
        FormSchema::new(
            "task_update",
            "Update Task",
            with_status(task_fields(), TASK_STATUSES),
        ),
    );
    catalog.insert(
        "milestone_creation",
        FormSchema::new("milestone_creation", "Create Milestone", milestone_fields()),
    );
    catalog.insert(
        "milestone_update",
        FormSchema::new(
            "milestone_update",
            "Update Milestone",
            with_status(milestone_fields(), MILESTONE_STATUSES),
        ),
    );
    catalog.insert(
        "program_creation",
        FormSchema::new("program_creation", "Create Programme", program_fields()),
    );
    catalog
});

/// Look up a schema by form type
pub fn form_schema(form_type: &str) -> Option<&'static FormSchema> {
    CATALOG.get(form_type)
}

pub fn known_form_types() -> impl Iterator<Item = &'static str> {
    CATALOG.keys().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_all_seven_forms() {
        let expected = [
            "project_creation",
            "project_update",
            "task_creation",
            "task_update",
            "milestone_creation",
            "milestone_update",
            "program_creation",
        ];
        for form_type in expected {
            assert!(form_schema(form_type).is_some(), "missing {}", form_type);
        }
        assert_eq!(known_form_types().count(), expected.len());
    }

    #[test]
    fn update_schemas_carry_a_status_field() {
        for form_type in ["project_update", "task_update", "milestone_update"] {
            let schema = form_schema(form_type).expect("schema");
            let status = schema
                .fields
                .iter()
                .find(|f| f.name == "status")
                .expect("status field");
            assert_eq!(status.kind, FieldKind::Select);
            assert!(status.options.as_ref().is_some_and(|o| !o.is_empty()));
        }
        assert!(form_schema("project_creation")
            .expect("schema")
            .fields
            .iter()
            .all(|f| f.name != "status"));
    }

    #[test]
    fn for_entity_fills_id_and_values_without_touching_catalog() {
        let base = form_schema("project_update").expect("schema");
        let mut values = Map::new();
        values.insert("name".to_string(), Value::from("Apollo"));
        let bound = base.for_entity(42, values);

        assert_eq!(bound.entity_id, Some(42));
        assert_eq!(bound.current_values.as_ref().expect("values")["name"], "Apollo");
        assert!(base.entity_id.is_none());
    }

    #[test]
    fn serialized_field_shape() {
        let schema = form_schema("task_creation").expect("schema");
        let value = schema.to_value();
        let milestone = value["fields"]
            .as_array()
            .expect("fields")
            .iter()
            .find(|f| f["name"] == "milestone_id")
            .expect("milestone field");
        assert_eq!(milestone["type"], "dynamic_select");
        assert_eq!(milestone["options_url"], "/api/milestones/");
        assert_eq!(milestone["value_field"], "id");
    }
}
