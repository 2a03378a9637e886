//! Parser for the structured reply: MWG regions, MWG collections and IPTC person details.

use std::path::Path;

use serde::Deserialize;

use crate::domain::{Collection, Person, RegionArea, RegionSpec};
use crate::error::{Error, Result};
use crate::reconcile::dedup_names;

/// Structured data attached to one asset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Structured {
    pub regions: Vec<RegionSpec>,
    pub collections: Vec<Collection>,
    pub persons: Vec<Person>,
}

/// The tool emits a bare object where a list has one element.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Payload {
    #[serde(default)]
    region_info: Option<RegionInfo>,
    #[serde(default)]
    collections: OneOrMany<CollectionEntry>,
    #[serde(default, rename = "PersonInImageWDetails")]
    persons: OneOrMany<PersonEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RegionInfo {
    #[serde(default)]
    region_list: OneOrMany<RegionEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RegionEntry {
    #[serde(default)]
    area: Option<AreaEntry>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "Type")]
    region_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AreaEntry {
    #[serde(default)]
    h: Option<String>,
    #[serde(default)]
    w: Option<String>,
    #[serde(default)]
    x: Option<String>,
    #[serde(default)]
    y: Option<String>,
    #[serde(default)]
    d: Option<String>,
    #[serde(default)]
    unit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CollectionEntry {
    #[serde(default, rename = "CollectionName")]
    name: Option<String>,
    #[serde(default, rename = "CollectionURI")]
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PersonEntry {
    #[serde(default, rename = "PersonName")]
    name: Option<String>,
    #[serde(default, rename = "PersonId")]
    ids: OneOrMany<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn coordinate(path: &Path, field: &str, value: Option<String>) -> Result<Option<f64>> {
    match non_empty(value) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<f64>()
            .map(Some)
            .map_err(|_| Error::StructuredParseFailed {
                path: path.to_path_buf(),
                message: format!("region {field} is not a number: {raw:?}"),
            }),
    }
}

/// Parse a normalized structured payload. Any malformed shape is a `StructuredParseFailed`.
pub fn parse(path: &Path, raw: &str) -> Result<Structured> {
    let payload: Payload = serde_json::from_str(raw).map_err(|e| Error::StructuredParseFailed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut regions = Vec::new();
    if let Some(info) = payload.region_info {
        for entry in info.region_list.into_vec() {
            let area = entry.area.unwrap_or_default();
            regions.push(RegionSpec {
                name: non_empty(entry.name),
                region_type: non_empty(entry.region_type),
                area: RegionArea {
                    unit: non_empty(area.unit),
                    h: coordinate(path, "H", area.h)?,
                    w: coordinate(path, "W", area.w)?,
                    x: coordinate(path, "X", area.x)?,
                    y: coordinate(path, "Y", area.y)?,
                    d: coordinate(path, "D", area.d)?,
                },
            });
        }
    }

    let mut collections: Vec<Collection> = Vec::new();
    for entry in payload.collections.into_vec() {
        let (name, uri) = (non_empty(entry.name), non_empty(entry.uri));
        if name.is_none() && uri.is_none() {
            continue;
        }
        let collection = Collection {
            name: name.unwrap_or_default(),
            uri: uri.unwrap_or_default(),
        };
        if !collections.contains(&collection) {
            collections.push(collection);
        }
    }

    let mut persons: Vec<Person> = Vec::new();
    for entry in payload.persons.into_vec() {
        let name = non_empty(entry.name).unwrap_or_default();
        let ids = dedup_names(entry.ids.into_vec());
        let candidates: Vec<Person> = if ids.is_empty() {
            vec![Person {
                name: name.clone(),
                identifier: String::new(),
            }]
        } else {
            ids.into_iter()
                .map(|identifier| Person {
                    name: name.clone(),
                    identifier,
                })
                .collect()
        };
        for person in candidates {
            if (person.name.is_empty() && person.identifier.is_empty()) || persons.contains(&person) {
                continue;
            }
            persons.push(person);
        }
    }

    Ok(Structured {
        regions,
        collections,
        persons,
    })
}
