//! Goods-introduction document submitted to the registry.
//!
//! Field names follow the registry's JSON; dates are plain `YYYY-MM-DD`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Document kinds accepted by the create endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    /// Introduction of goods produced in the country into circulation.
    #[default]
    LpIntroduceGoods,
}

/// Submitter block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDescription {
    #[serde(rename = "participantInn")]
    pub participant_inn: String,
}

/// One marked product line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_document: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_document_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_document_number: Option<String>,
    pub owner_inn: String,
    pub producer_inn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_inn: Option<String>,
    pub production_date: NaiveDate,
    pub tnved_code: String,
    pub uit_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uitu_code: Option<String>,
}

/// Registry document. Serialized as-is into the request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub description: DocumentDescription,
    pub doc_id: String,
    pub doc_status: String,
    #[serde(default)]
    pub doc_type: DocumentType,
    #[serde(rename = "importRequest", default = "default_import_request")]
    pub import_request: bool,
    pub owner_inn: String,
    pub participant_inn: String,
    pub producer_inn: String,
    pub production_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production_type: Option<String>,
    pub products: Vec<Product>,
    pub reg_date: NaiveDate,
    pub reg_number: String,
}

fn default_import_request() -> bool {
    true
}

impl Document {
    /// Serialize the document into the request body.
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn sample() -> Document {
        Document {
            description: DocumentDescription { participant_inn: "7700000001".into() },
            doc_id: "doc-1".into(),
            doc_status: "DRAFT".into(),
            doc_type: DocumentType::LpIntroduceGoods,
            import_request: true,
            owner_inn: "7700000002".into(),
            participant_inn: "7700000001".into(),
            producer_inn: "7700000003".into(),
            production_date: date(2024, 3, 1),
            production_type: None,
            products: vec![Product {
                certificate_document: Some("CONFORMITY_CERTIFICATE".into()),
                certificate_document_date: Some(date(2024, 2, 1)),
                certificate_document_number: Some("RU-123".into()),
                owner_inn: "7700000002".into(),
                producer_inn: "7700000003".into(),
                participant_inn: None,
                production_date: date(2024, 3, 1),
                tnved_code: "6403".into(),
                uit_code: "010460043993125621JgXJ5.T".into(),
                uitu_code: None,
            }],
            reg_date: date(2024, 3, 2),
            reg_number: "R-42".into(),
        }
    }

    #[test]
    fn payload_uses_registry_field_names() {
        let payload: Value = serde_json::from_slice(&sample().to_payload().unwrap()).unwrap();

        assert_eq!(payload["description"], json!({ "participantInn": "7700000001" }));
        assert_eq!(payload["doc_type"], "LP_INTRODUCE_GOODS");
        assert_eq!(payload["importRequest"], true);
        assert_eq!(payload["production_date"], "2024-03-01");
        assert_eq!(payload["reg_date"], "2024-03-02");
        assert_eq!(payload["products"][0]["certificate_document_date"], "2024-02-01");
        assert_eq!(payload["products"][0]["tnved_code"], "6403");
        assert!(payload.get("production_type").is_none());
        assert!(payload["products"][0].get("uitu_code").is_none());
    }

    #[test]
    fn missing_type_and_import_flag_take_defaults() {
        let mut payload = serde_json::to_value(sample()).unwrap();
        let object = payload.as_object_mut().unwrap();
        object.remove("doc_type");
        object.remove("importRequest");

        let doc: Document = serde_json::from_value(payload).unwrap();
        assert_eq!(doc.doc_type, DocumentType::LpIntroduceGoods);
        assert!(doc.import_request);
        assert_eq!(doc, sample());
    }
}
