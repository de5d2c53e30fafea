//! Normalization of Notion page properties into plain values.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::SyncError;

/// Property types that duplicate entity metadata and are left out.
const METADATA_PROPERTIES: &[&str] = &[
    "created_by",
    "created_time",
    "last_edited_by",
    "last_edited_time",
    "title",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateValue {
    pub start: String,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileValue {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Person {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub email: Option<String>,
}

/// A property value reduced to plain data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Date(DateValue),
    File(FileValue),
    Person(Person),
    List(Vec<PropertyValue>),
}

/// Normalize every non-metadata property of a page.
pub fn normalize_properties(
    page_id: &str,
    properties: &BTreeMap<String, Value>,
) -> Result<BTreeMap<String, PropertyValue>, SyncError> {
    let mut normalized = BTreeMap::new();
    for (name, property) in properties {
        let kind = property_type(property).unwrap_or_default();
        if METADATA_PROPERTIES.contains(&kind) {
            continue;
        }
        normalized.insert(name.clone(), property_content(page_id, property)?);
    }
    Ok(normalized)
}

/// Plain text of the page's `title` property, empty when there is none.
pub fn title_of(properties: &BTreeMap<String, Value>) -> String {
    properties
        .values()
        .find(|p| property_type(p) == Some("title"))
        .map(|p| rich_text_plain(&p["title"]))
        .unwrap_or_default()
}

/// Concatenate `plain_text` of a rich text array.
pub fn rich_text_plain(value: &Value) -> String {
    value
        .as_array()
        .map(|spans| {
            spans
                .iter()
                .filter_map(|s| s["plain_text"].as_str())
                .collect()
        })
        .unwrap_or_default()
}

fn property_type(value: &Value) -> Option<&str> {
    value.get("type").and_then(Value::as_str)
}

/// Extract the content of a single property value.
pub fn property_content(page_id: &str, property: &Value) -> Result<PropertyValue, SyncError> {
    let Some(kind) = property_type(property) else {
        return Ok(PropertyValue::Null);
    };
    let body = &property[kind];
    let value = match kind {
        "title" | "rich_text" => PropertyValue::Text(rich_text_plain(body)),
        "number" => number(body),
        "select" | "status" => text(&body["name"]),
        "multi_select" => PropertyValue::List(
            items(body)
                .map(|option| text(&option["name"]))
                .collect(),
        ),
        "relation" => PropertyValue::List(items(body).map(|r| text(&r["id"])).collect()),
        "date" => date(body),
        "people" => PropertyValue::List(
            items(body)
                .filter_map(person)
                .map(PropertyValue::Person)
                .collect(),
        ),
        "files" => {
            let mut files = Vec::new();
            for file in items(body) {
                files.push(PropertyValue::File(FileValue {
                    name: file["name"].as_str().unwrap_or_default().to_string(),
                    url: file_url(page_id, file)?,
                }));
            }
            PropertyValue::List(files)
        }
        "checkbox" => body.as_bool().map(PropertyValue::Bool).unwrap_or(PropertyValue::Null),
        "url" | "email" | "phone_number" | "created_time" | "last_edited_time" => text(body),
        "formula" => formula(page_id, body)?,
        "rollup" => rollup(page_id, body)?,
        "unsupported" => PropertyValue::Null,
        other => {
            return Err(SyncError::UnsupportedProperty {
                id: page_id.to_string(),
                kind: other.to_string(),
            })
        }
    };
    Ok(value)
}

fn items(value: &Value) -> impl Iterator<Item = &Value> {
    value.as_array().into_iter().flatten()
}

fn text(value: &Value) -> PropertyValue {
    value
        .as_str()
        .map(|s| PropertyValue::Text(s.to_string()))
        .unwrap_or(PropertyValue::Null)
}

fn number(value: &Value) -> PropertyValue {
    value.as_f64().map(PropertyValue::Number).unwrap_or(PropertyValue::Null)
}

fn date(value: &Value) -> PropertyValue {
    serde_json::from_value::<DateValue>(value.clone())
        .map(PropertyValue::Date)
        .unwrap_or(PropertyValue::Null)
}

fn formula(page_id: &str, formula: &Value) -> Result<PropertyValue, SyncError> {
    match property_type(formula) {
        Some("string") => Ok(text(&formula["string"])),
        Some("number") => Ok(number(&formula["number"])),
        Some("boolean") => Ok(formula["boolean"]
            .as_bool()
            .map(PropertyValue::Bool)
            .unwrap_or(PropertyValue::Null)),
        Some("date") => Ok(date(&formula["date"])),
        other => Err(SyncError::UnsupportedProperty {
            id: page_id.to_string(),
            kind: format!("formula:{}", other.unwrap_or("none")),
        }),
    }
}

fn rollup(page_id: &str, rollup: &Value) -> Result<PropertyValue, SyncError> {
    match property_type(rollup) {
        Some("number") => Ok(number(&rollup["number"])),
        Some("date") => Ok(date(&rollup["date"])),
        Some("array") => items(&rollup["array"])
            .map(|item| property_content(page_id, item))
            .collect::<Result<Vec<_>, _>>()
            .map(PropertyValue::List),
        other => Err(SyncError::UnsupportedProperty {
            id: page_id.to_string(),
            kind: format!("rollup:{}", other.unwrap_or("none")),
        }),
    }
}

/// Resolve a hosted or external file reference to its url.
pub fn file_url(owner_id: &str, file: &Value) -> Result<String, SyncError> {
    match property_type(file) {
        Some(kind @ ("external" | "file")) => Ok(file[kind]["url"]
            .as_str()
            .unwrap_or_default()
            .to_string()),
        _ => Err(SyncError::UnknownFileKind {
            id: owner_id.to_string(),
        }),
    }
}

/// Accessible people become persons; bots resolve to the user who owns them.
fn person(user: &Value) -> Option<Person> {
    match property_type(user)? {
        "person" => Some(Person {
            name: user["name"].as_str().map(str::to_string),
            avatar: user["avatar_url"].as_str().map(str::to_string),
            email: user["person"]["email"].as_str().map(str::to_string),
        }),
        "bot" => {
            let owner = &user["bot"]["owner"];
            if property_type(owner) == Some("user") {
                person(&owner["user"])
            } else {
                None
            }
        }
        _ => None,
    }
}
