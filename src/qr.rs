//! QR record schema and its response shapes.
//!
//! A record is minted unclaimed, claimed exactly once (`isClaimed` never
//! reverts), and may carry a movement path of timestamped samples once a
//! direct assignment has seeded it. `value` is the scan-side lookup key,
//! `_id` the administrative one. Timestamps are Unix milliseconds.

use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::user::UserView;

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PathSample {
    pub lat: f64,
    pub lng: f64,
    pub timestamp: i64,
}

impl PathSample {
    pub fn at(point: GeoPoint, timestamp: i64) -> Self {
        Self {
            lat: point.lat,
            lng: point.lng,
            timestamp,
        }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            lat: self.lat,
            lng: self.lng,
        }
    }
}

/// Persisted document, collection `qrcodes`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct QrRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<ObjectId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(rename = "isClaimed")]
    pub is_claimed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub path: Vec<PathSample>,
    pub timestamp: i64,
}

impl QrRecord {
    pub fn unclaimed(value: String, timestamp: i64) -> Self {
        Self {
            id: Some(ObjectId::new()),
            value,
            user: None,
            purpose: None,
            is_claimed: false,
            location: None,
            path: Vec::new(),
            timestamp,
        }
    }
}

/// Wire shape of a record: ids rendered as hex strings, `user` resolved to
/// display fields when the record is claimed.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct QrCodeView {
    pub id: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    pub is_claimed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
    pub path: Vec<PathSample>,
    pub timestamp: i64,
}

impl QrCodeView {
    pub fn new(record: QrRecord, user: Option<UserView>) -> Self {
        Self {
            id: record.id.map(|id| id.to_hex()).unwrap_or_default(),
            value: record.value,
            user,
            purpose: record.purpose,
            is_claimed: record.is_claimed,
            location: record.location,
            path: record.path,
            timestamp: record.timestamp,
        }
    }
}
