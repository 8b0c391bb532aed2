//! Order snapshot line.
//!
//! An order stores the joined cart rows (product fields + quantity) as a JSON
//! array at the moment of checkout. The field names match the historic blob
//! layout (`imageUrl`, numeric `id`) so that orders written by earlier
//! deployments parse back into the same shape.

use serde::{Deserialize, Serialize};

use super::id::{ProductId, lenient_product_id};
use super::money::{Money, MoneyError};

/// One frozen line of an order snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    #[serde(deserialize_with = "lenient_product_id")]
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub quantity: i64,
}

impl OrderLine {
    /// `price × quantity` for this line.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::Overflow` if the product does not fit in an `i64`.
    pub fn line_total(&self) -> Result<Money, MoneyError> {
        self.price.times(self.quantity)
    }

    /// Serialize a snapshot to the JSON text stored in `orders.items`.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if serialization fails.
    pub fn encode_snapshot(lines: &[Self]) -> Result<String, serde_json::Error> {
        serde_json::to_string(lines)
    }

    /// Parse a stored snapshot.
    ///
    /// Empty text decodes to an empty list.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the text is not a valid snapshot.
    pub fn decode_snapshot(text: &str) -> Result<Vec<Self>, serde_json::Error> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(text)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_historic_blob() {
        let blob = r#"[{"id":1,"name":"Tent","price":1000,"description":null,
            "category":"캠핑","imageUrl":"/img/tent.png","quantity":2},
            {"id":"2","name":"Mug","price":500,"quantity":1}]"#;

        let lines = OrderLine::decode_snapshot(blob).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].image_url.as_deref(), Some("/img/tent.png"));
        assert_eq!(lines[1].id, ProductId::new(2));
        assert_eq!(lines[1].category, None);
    }

    #[test]
    fn test_encode_uses_historic_field_names() {
        let line = OrderLine {
            id: ProductId::new(3),
            name: "Lamp".to_owned(),
            price: Money::from_minor(1200),
            description: None,
            category: None,
            image_url: Some("/lamp.png".to_owned()),
            quantity: 1,
        };
        let text = OrderLine::encode_snapshot(&[line]).unwrap();
        assert!(text.contains("\"imageUrl\":\"/lamp.png\""));
        assert!(text.contains("\"id\":3"));
    }

    #[test]
    fn test_empty_text_is_empty_snapshot() {
        assert!(OrderLine::decode_snapshot("").unwrap().is_empty());
        assert!(OrderLine::decode_snapshot("{oops").is_err());
    }
}
