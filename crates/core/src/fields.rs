//! Declarative mapping from group-qualified tool tags onto asset attributes.
//!
//! Every field lists its source tags in priority order; the first non-empty value wins.

use chrono::{DateTime, NaiveDateTime};
use serde_json::Value;

use crate::device;
use crate::domain::AssetFields;
use crate::exiftool::Metadata;
use crate::reconcile::dedup_names;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Description,
    Rating,
    DateTaken,
    TimeZone,
    Make,
    Model,
    Latitude,
    Longitude,
    Altitude,
    Location,
    City,
    StateProvince,
    Country,
    CountryCode,
    Creator,
    Copyright,
    FileCreateDate,
    FileModifyDate,
}

/// Scalar fields and their sources, highest priority first.
pub const SCALAR_SOURCES: &[(Field, &[&str])] = &[
    (Field::Title, &["XMP-dc:Title", "IPTC:ObjectName", "IPTC:Headline", "IFD0:XPTitle"]),
    (
        Field::Description,
        &[
            "XMP-dc:Description",
            "IPTC:Caption-Abstract",
            "IFD0:ImageDescription",
            "ExifIFD:UserComment",
            "XMP-tiff:ImageDescription",
            "IFD0:XPComment",
        ],
    ),
    (Field::Rating, &["IFD0:Rating", "XMP-xmp:Rating"]),
    (
        Field::DateTaken,
        &[
            "ExifIFD:DateTimeOriginal",
            "ExifIFD:CreateDate",
            "XMP-photoshop:DateCreated",
            "Composite:DateTimeCreated",
            "System:FileCreateDate",
        ],
    ),
    (Field::TimeZone, &["ExifIFD:OffsetTimeOriginal"]),
    (Field::Make, &["IFD0:Make"]),
    (Field::Model, &["IFD0:Model"]),
    (Field::Latitude, &["GPS:GPSLatitude", "Composite:GPSLatitude"]),
    (Field::Longitude, &["GPS:GPSLongitude", "Composite:GPSLongitude"]),
    (Field::Altitude, &["GPS:GPSAltitude", "Composite:GPSAltitude"]),
    (
        Field::Location,
        &[
            "XMP-iptcExt:LocationCreatedLocation",
            "XMP-iptcExt:LocationCreatedSublocation",
            "IPTC:Sub-location",
            "XMP-iptcCore:Location",
        ],
    ),
    (
        Field::City,
        &["XMP-iptcExt:LocationCreatedCity", "IPTC:City", "XMP-photoshop:City"],
    ),
    (
        Field::StateProvince,
        &[
            "XMP-iptcExt:LocationCreatedProvinceState",
            "IPTC:Province-State",
            "XMP-photoshop:State",
        ],
    ),
    (
        Field::Country,
        &[
            "XMP-iptcExt:LocationCreatedCountryName",
            "IPTC:Country-PrimaryLocationName",
            "XMP-photoshop:Country",
        ],
    ),
    (
        Field::CountryCode,
        &[
            "XMP-iptcExt:LocationCreatedCountryCode",
            "IPTC:Country-PrimaryLocationCode",
            "XMP-iptcCore:CountryCode",
        ],
    ),
    (
        Field::Creator,
        &["IFD0:Artist", "IPTC:By-line", "XMP-dc:Creator", "XMP-tiff:Artist"],
    ),
    (
        Field::Copyright,
        &["IFD0:Copyright", "IPTC:CopyrightNotice", "XMP-dc:Rights"],
    ),
    (Field::FileCreateDate, &["System:FileCreateDate"]),
    (Field::FileModifyDate, &["System:FileModifyDate"]),
];

/// Composite date that may carry a zone offset when no explicit offset tag exists.
const OFFSET_FALLBACK_SOURCE: &str = "Composite:DateTimeCreated";

/// People names: region display names, MWG region names, IPTC person-in-image.
pub const PEOPLE_SOURCES: &[&str] = &[
    "XMP-MP:RegionPersonDisplayName",
    "XMP-mwg-rs:RegionName",
    "XMP-iptcExt:PersonInImage",
];

/// Descriptive keywords.
pub const TAG_SOURCES: &[&str] = &["IPTC:Keywords", "XMP-dc:Subject", "IFD0:XPKeywords"];

pub const LOCATION_ID_SOURCES: &[&str] = &["XMP-iptcExt:LocationCreatedLocationId"];

/// Attributes plus the list-valued relations resolved from one payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolved {
    pub fields: AssetFields,
    pub people: Vec<String>,
    pub tags: Vec<String>,
    pub location_ids: Vec<String>,
}

/// String values of a tag, whether the tool emitted a scalar or a list.
fn values(meta: &Metadata, key: &str) -> Vec<String> {
    match meta.general.get(key) {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// First non-empty trimmed value among `keys`.
pub fn first_value(meta: &Metadata, keys: &[&str]) -> Option<String> {
    keys.iter()
        .flat_map(|key| values(meta, key))
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

pub fn scalar(meta: &Metadata, field: Field) -> Option<String> {
    SCALAR_SOURCES
        .iter()
        .find(|(f, _)| *f == field)
        .and_then(|(_, keys)| first_value(meta, keys))
}

/// Union of every source, de-duplicated, order kept. XP keywords are `;`-separated.
fn list(meta: &Metadata, keys: &[&str]) -> Vec<String> {
    let mut out = Vec::new();
    for key in keys {
        for value in values(meta, key) {
            if *key == "IFD0:XPKeywords" {
                out.extend(value.split(';').map(str::to_string));
            } else {
                out.push(value);
            }
        }
    }
    dedup_names(out)
}

fn number(meta: &Metadata, field: Field) -> Option<f64> {
    scalar(meta, field).and_then(|v| v.parse::<f64>().ok())
}

/// `YYYY:MM:DD HH:MM:SS[...]` rendered as `YYYY-MM-DD HH:MM:SS`. Anything else is kept raw.
pub fn format_date(raw: &str) -> String {
    let raw = raw.trim();
    raw.get(..19)
        .and_then(|head| NaiveDateTime::parse_from_str(head, "%Y:%m:%d %H:%M:%S").ok())
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// `-4` → `-04:00`, `4` → `+04:00`, `-04:00:00` → `-04:00`. Other shapes pass through.
pub fn format_timezone(raw: &str) -> String {
    let mut tz = raw.trim().to_string();

    if tz.contains(':') {
        let parts: Vec<&str> = tz.split(':').collect();
        tz = format!("{}:{}", parts[0], parts[1]);
    }

    match tz.parse::<i32>() {
        Ok(hours) if tz.starts_with('-') => format!("-{:02}:00", hours.abs()),
        Ok(hours) => format!("+{:02}:00", hours),
        Err(_) => tz,
    }
}

/// Offset embedded in a date like `2021:06:01 10:00:00-04:00`.
fn offset_of(raw: &str) -> Option<String> {
    let dt = DateTime::parse_from_str(raw.trim(), "%Y:%m:%d %H:%M:%S%:z").ok()?;
    let seconds = dt.offset().local_minus_utc();
    let sign = if seconds < 0 { '-' } else { '+' };
    let seconds = seconds.abs();
    Some(format!("{sign}{:02}:{:02}", seconds / 3600, (seconds % 3600) / 60))
}

/// Resolve every field and list from a general payload.
pub fn resolve(meta: &Metadata) -> Resolved {
    let time_zone = scalar(meta, Field::TimeZone)
        .or_else(|| first_value(meta, &[OFFSET_FALLBACK_SOURCE]).and_then(|d| offset_of(&d)))
        .map(|tz| format_timezone(&tz));

    let make = scalar(meta, Field::Make);
    let model = scalar(meta, Field::Model);

    let fields = AssetFields {
        title: scalar(meta, Field::Title),
        description: scalar(meta, Field::Description),
        rating: scalar(meta, Field::Rating),
        date_taken: scalar(meta, Field::DateTaken).map(|d| format_date(&d)),
        date_taken_tz: time_zone,
        device: device::normalize(make.as_deref(), model.as_deref()),
        latitude: number(meta, Field::Latitude),
        longitude: number(meta, Field::Longitude),
        altitude: number(meta, Field::Altitude),
        location: scalar(meta, Field::Location),
        city: scalar(meta, Field::City),
        state_province: scalar(meta, Field::StateProvince),
        country: scalar(meta, Field::Country),
        country_code: scalar(meta, Field::CountryCode),
        creator: scalar(meta, Field::Creator),
        copyright: scalar(meta, Field::Copyright),
    };

    Resolved {
        fields,
        people: list(meta, PEOPLE_SOURCES),
        tags: list(meta, TAG_SOURCES),
        location_ids: list(meta, LOCATION_ID_SOURCES),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(value: Value) -> Metadata {
        let Value::Object(general) = value else {
            panic!("expected object");
        };
        Metadata {
            general,
            structured: None,
        }
    }

    #[test]
    fn test_title_priority() {
        let m = meta(json!({
            "IFD0:XPTitle": "xp",
            "IPTC:Headline": "headline",
            "IPTC:ObjectName": "object",
            "XMP-dc:Title": "  dc  "
        }));
        assert_eq!(scalar(&m, Field::Title).as_deref(), Some("dc"));

        let m = meta(json!({"IFD0:XPTitle": "xp", "IPTC:Headline": "headline", "XMP-dc:Title": " "}));
        assert_eq!(scalar(&m, Field::Title).as_deref(), Some("headline"));
    }

    #[test]
    fn test_scalar_from_list_value() {
        let m = meta(json!({"XMP-dc:Creator": ["", "Ansel Adams", "Other"]}));
        assert_eq!(scalar(&m, Field::Creator).as_deref(), Some("Ansel Adams"));
    }

    #[test]
    fn test_date_taken_falls_back_to_file_create_date() {
        let m = meta(json!({"System:FileCreateDate": "2020:01:02 03:04:05+01:00"}));
        let resolved = resolve(&m);
        assert_eq!(resolved.fields.date_taken.as_deref(), Some("2020-01-02 03:04:05"));

        let m = meta(json!({
            "System:FileCreateDate": "2020:01:02 03:04:05+01:00",
            "ExifIFD:DateTimeOriginal": "2019:07:14 18:30:00"
        }));
        assert_eq!(resolve(&m).fields.date_taken.as_deref(), Some("2019-07-14 18:30:00"));
    }

    #[test]
    fn test_format_date_keeps_unparsable() {
        assert_eq!(format_date("2019:07:14 18:30:00.123"), "2019-07-14 18:30:00");
        assert_eq!(format_date("sometime in 2019"), "sometime in 2019");
        assert_eq!(format_date("0000:00:00 00:00:00"), "0000:00:00 00:00:00");
    }

    #[test]
    fn test_format_timezone() {
        assert_eq!(format_timezone("-4"), "-04:00");
        assert_eq!(format_timezone("4"), "+04:00");
        assert_eq!(format_timezone("+05:30"), "+05:30");
        assert_eq!(format_timezone("-04:00:00"), "-04:00");
        assert_eq!(format_timezone(" Z "), "Z");
    }

    #[test]
    fn test_timezone_from_composite_offset() {
        let m = meta(json!({"Composite:DateTimeCreated": "2021:06:01 10:00:00-04:00"}));
        assert_eq!(resolve(&m).fields.date_taken_tz.as_deref(), Some("-04:00"));

        let m = meta(json!({
            "Composite:DateTimeCreated": "2021:06:01 10:00:00-04:00",
            "ExifIFD:OffsetTimeOriginal": "+02:00"
        }));
        assert_eq!(resolve(&m).fields.date_taken_tz.as_deref(), Some("+02:00"));
    }

    #[test]
    fn test_gps_and_device() {
        let m = meta(json!({
            "GPS:GPSLatitude": "48.8566",
            "GPS:GPSLongitude": "2.3522",
            "GPS:GPSAltitude": "not a number",
            "IFD0:Make": "FUJIFILM",
            "IFD0:Model": "X-T4"
        }));
        let fields = resolve(&m).fields;
        assert_eq!(fields.latitude, Some(48.8566));
        assert_eq!(fields.longitude, Some(2.3522));
        assert_eq!(fields.altitude, None);
        assert_eq!(fields.device.as_deref(), Some("Fujifilm X-T4"));
    }

    #[test]
    fn test_lists_union_and_dedup() {
        let m = meta(json!({
            "XMP-MP:RegionPersonDisplayName": ["Alice", "Bob"],
            "XMP-mwg-rs:RegionName": "Alice",
            "XMP-iptcExt:PersonInImage": ["Carol"],
            "IPTC:Keywords": ["beach", "sunset"],
            "XMP-dc:Subject": "beach",
            "IFD0:XPKeywords": "holiday;sunset; family",
            "XMP-iptcExt:LocationCreatedLocationId": "geo:1"
        }));
        let resolved = resolve(&m);
        assert_eq!(resolved.people, vec!["Alice", "Bob", "Carol"]);
        assert_eq!(resolved.tags, vec!["beach", "sunset", "holiday", "family"]);
        assert_eq!(resolved.location_ids, vec!["geo:1"]);
    }

    #[test]
    fn test_every_scalar_field_has_sources() {
        for (field, keys) in SCALAR_SOURCES {
            assert!(!keys.is_empty(), "{field:?}");
        }
        let empty = meta(json!({}));
        assert_eq!(resolve(&empty), Resolved::default());
    }
}
