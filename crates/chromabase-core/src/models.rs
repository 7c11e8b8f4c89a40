//! Typed views of the built-in collections.
//!
//! The store itself is schemaless; these types are for callers that want
//! structs instead of JSON maps (the HTTP client, tests, tooling).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// A record type bound to a collection.
pub trait CollectionRecord: Serialize + DeserializeOwned + Send + Sync {
    /// Collection the record lives in.
    const COLLECTION: &'static str;
}

/// A record as returned by the service, with its server-managed fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stored<T> {
    pub id: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(flatten)]
    pub record: T,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub pipeline_stage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Campaign lifecycle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CampaignStatus {
    Planning,
    Active,
    Paused,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: CampaignStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversions: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpa: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roi: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctr: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversion_rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub title: String,
    pub content_type: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deliverable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
    pub client_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    pub status: String,
}

impl CollectionRecord for Client {
    const COLLECTION: &'static str = "clients";
}

impl CollectionRecord for Lead {
    const COLLECTION: &'static str = "leads";
}

impl CollectionRecord for Campaign {
    const COLLECTION: &'static str = "campaigns";
}

impl CollectionRecord for Content {
    const COLLECTION: &'static str = "content";
}

impl CollectionRecord for Deliverable {
    const COLLECTION: &'static str = "deliverables";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::CollectionCatalog;
    use serde_json::json;

    #[test]
    fn test_every_model_maps_to_a_default_collection() {
        let catalog = CollectionCatalog::default();
        for name in [
            Client::COLLECTION,
            Lead::COLLECTION,
            Campaign::COLLECTION,
            Content::COLLECTION,
            Deliverable::COLLECTION,
        ] {
            assert!(catalog.contains(name), "{name} missing from catalog");
        }
    }

    #[test]
    fn test_stored_flattens_record() {
        let stored: Stored<Lead> = serde_json::from_value(json!({
            "id": "l1",
            "created_at": "2024-05-01T10:00:00.000Z",
            "updated_at": "2024-05-01T10:00:00.000Z",
            "name": "Ann",
            "email": "ann@x.com",
            "pipeline_stage": "New",
            "value": 2500
        }))
        .unwrap();

        assert_eq!(stored.id, "l1");
        assert_eq!(stored.record.value, Some(2500.0));
        assert!(stored.record.source.is_none());
    }

    #[test]
    fn test_optional_fields_are_omitted() {
        let campaign = Campaign {
            client_id: None,
            name: "Launch".into(),
            description: None,
            status: CampaignStatus::Active,
            start_date: None,
            end_date: None,
            budget: Some(100.0),
            spent: None,
            conversions: None,
            cpa: None,
            roi: None,
            ctr: None,
            conversion_rate: None,
        };
        assert_eq!(
            serde_json::to_value(&campaign).unwrap(),
            json!({"name": "Launch", "status": "active", "budget": 100.0})
        );
        assert_eq!(CampaignStatus::Paused.to_string(), "paused");
    }
}
