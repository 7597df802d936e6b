//! Structured answer schema: the reply text plus real-estate listings.
//!
//! Everything here is filled from model output, so deserialization never
//! fails on a listing field. Wrong types, unparseable numbers and dates
//! resolve to `None` (or an empty list) instead of rejecting the answer.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ─── Structured Answer ──────────────────────────────────────────────────────

/// Final answer of the synthesis call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredAnswer {
    pub response: String,
    #[serde(default, deserialize_with = "lenient_list")]
    pub result: Vec<RealEstateListing>,
}

// ─── Listing ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealEstateListing {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub address: Vec<Address>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub property_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub transaction_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub legal_status: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub price_unit: Option<String>,
    /// Square metres.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub area: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub direction: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub images: Vec<String>,
    #[serde(default, deserialize_with = "lenient_object")]
    pub contact_realtor: Option<ContactRealtor>,
    /// URL of the original listing.
    #[serde(default, deserialize_with = "lenient_string")]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RealEstateListing {
    /// District of the first address, if any.
    pub fn district(&self) -> Option<&str> {
        self.address.first().and_then(|a| a.district.as_deref())
    }
}

/// Postal address with optional coordinates.
///
/// Coordinates arrive either flat (`latitude` / `longitude`) or nested as
/// `coordinates: {lat, lng}`; both load into the flat fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawAddress")]
pub struct Address {
    pub street: Option<String>,
    pub ward: Option<String>,
    pub district: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Deserialize)]
struct RawAddress {
    #[serde(default, deserialize_with = "lenient_string")]
    street: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    ward: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    district: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    city: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    latitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    longitude: Option<f64>,
    #[serde(default, deserialize_with = "lenient_object")]
    coordinates: Option<Coordinates>,
}

#[derive(Deserialize)]
struct Coordinates {
    #[serde(default, deserialize_with = "lenient_f64")]
    lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    lng: Option<f64>,
}

impl From<RawAddress> for Address {
    fn from(raw: RawAddress) -> Self {
        let (lat, lng) = raw
            .coordinates
            .map(|c| (c.lat, c.lng))
            .unwrap_or((None, None));
        Self {
            street: raw.street,
            ward: raw.ward,
            district: raw.district,
            city: raw.city,
            latitude: raw.latitude.or(lat),
            longitude: raw.longitude.or(lng),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactRealtor {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub zalo: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: Option<String>,
}

// ─── Lenient field parsing ──────────────────────────────────────────────────

/// Strings pass through; numbers and booleans are stringified (phone
/// numbers often come back as integers). Blank strings become `None`.
fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace('_', "").parse::<f64>().ok(),
        _ => None,
    }
    .filter(|f| f.is_finite()))
}

/// `null` → empty, a lone object → one item, items that do not fit are
/// skipped.
fn lenient_list<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        single @ (Value::Object(_) | Value::String(_)) => {
            serde_json::from_value(single).map(|t| vec![t]).unwrap_or_default()
        }
        _ => Vec::new(),
    })
}

fn lenient_object<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(d)? {
        value @ Value::Object(_) => serde_json::from_value(value).ok(),
        _ => None,
    })
}

fn lenient_datetime<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => parse_timestamp(&s),
        _ => None,
    })
}

/// Parse RFC 3339, a naive `YYYY-MM-DD[ T]HH:MM:SS` (taken as UTC) or a
/// plain date in ISO or `DD/MM/YYYY` form (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    for fmt in ["%Y-%m-%d", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }
    None
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use serde_json::json;

    fn listing(value: Value) -> RealEstateListing {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_full_listing() {
        let l = listing(json!({
            "title": "Căn hộ 3PN Sunrise City",
            "address": [{"street": "23 Nguyễn Hữu Thọ", "ward": "Tân Hưng", "district": "Quận 7",
                         "city": "TP.HCM", "latitude": 10.74, "longitude": 106.70}],
            "propertyType": "apartment",
            "transactionType": "sale",
            "price": 5.2,
            "priceUnit": "tỷ",
            "area": 98,
            "images": ["https://img/1.jpg"],
            "contactRealtor": {"name": "Anh Minh", "phone": "0909123456", "zalo": null, "email": null},
            "source": "https://batdongsan.com.vn/x",
            "publishedAt": "2024-01-01T00:00:00Z"
        }));
        assert_eq!(l.district(), Some("Quận 7"));
        assert_eq!(l.price, Some(5.2));
        assert_eq!(l.area, Some(98.0));
        assert_eq!(l.contact_realtor.unwrap().phone.as_deref(), Some("0909123456"));
        assert_eq!(l.published_at.unwrap().year(), 2024);
        assert!(l.updated_at.is_none());
    }

    #[test]
    fn test_empty_object_is_all_none() {
        assert_eq!(listing(json!({})), RealEstateListing::default());
    }

    #[test]
    fn test_nulls_become_empty() {
        let l = listing(json!({"address": null, "images": null, "contactRealtor": null, "title": null}));
        assert!(l.address.is_empty());
        assert!(l.images.is_empty());
        assert!(l.contact_realtor.is_none());
        assert!(l.title.is_none());
    }

    #[test]
    fn test_numeric_strings_and_garbage() {
        let l = listing(json!({"price": "3500000000", "area": "thỏa thuận"}));
        assert_eq!(l.price, Some(3_500_000_000.0));
        assert!(l.area.is_none());
    }

    #[test]
    fn test_phone_as_number_is_stringified() {
        let l = listing(json!({"contactRealtor": {"phone": 909123456}}));
        assert_eq!(l.contact_realtor.unwrap().phone.as_deref(), Some("909123456"));
    }

    #[test]
    fn test_single_address_object_accepted() {
        let l = listing(json!({"address": {"district": "Quận 7"}}));
        assert_eq!(l.district(), Some("Quận 7"));
    }

    #[test]
    fn test_nested_coordinates() {
        let l = listing(json!({"address": [{"city": "Đà Nẵng", "coordinates": {"lat": 16.05, "lng": "108.2"}}]}));
        assert_eq!(l.address[0].latitude, Some(16.05));
        assert_eq!(l.address[0].longitude, Some(108.2));
    }

    #[test]
    fn test_flat_coordinates_win_over_nested() {
        let l = listing(json!({"address": [{"latitude": 1.0, "coordinates": {"lat": 2.0, "lng": 3.0}}]}));
        assert_eq!(l.address[0].latitude, Some(1.0));
        assert_eq!(l.address[0].longitude, Some(3.0));
    }

    #[test]
    fn test_timestamp_forms() {
        let plain = parse_timestamp("2024-03-15").unwrap();
        assert_eq!((plain.month(), plain.day(), plain.hour()), (3, 15, 0));

        let offset = parse_timestamp("2024-03-15T08:00:00+07:00").unwrap();
        assert_eq!(offset.hour(), 1);

        assert!(parse_timestamp("2024-03-15 10:30:00").is_some());
        assert_eq!(parse_timestamp("15/03/2024").unwrap().month(), 3);
        assert!(parse_timestamp("hôm qua").is_none());

        let l = listing(json!({"updatedAt": "not a date", "publishedAt": 12}));
        assert!(l.updated_at.is_none());
        assert!(l.published_at.is_none());
    }

    #[test]
    fn test_structured_answer_result_defaults_empty() {
        let answer: StructuredAnswer = serde_json::from_value(json!({"response": "Không có"})).unwrap();
        assert!(answer.result.is_empty());

        let answer: StructuredAnswer =
            serde_json::from_value(json!({"response": "x", "result": null})).unwrap();
        assert!(answer.result.is_empty());
    }

    #[test]
    fn test_bad_items_are_skipped() {
        let answer: StructuredAnswer = serde_json::from_value(json!({
            "response": "x",
            "result": [{"title": "ok"}, 42, "junk"]
        }))
        .unwrap();
        assert_eq!(answer.result.len(), 1);
        assert_eq!(answer.result[0].title.as_deref(), Some("ok"));
    }

    #[test]
    fn test_serializes_camel_case() {
        let l = RealEstateListing {
            property_type: Some("house".into()),
            ..Default::default()
        };
        let value = serde_json::to_value(&l).unwrap();
        assert_eq!(value["propertyType"], "house");
        assert!(value["contactRealtor"].is_null());
        assert_eq!(value["images"], json!([]));
    }
}
