// ==============================================================================
// json.rs - Order Portal JSON Parser
// ==============================================================================
// Author: Matt Barham
// Created: 2026-10-19
// Modified: 2026-10-19
// Version: 1.0.0
// ==============================================================================

use std::path::Path;

use tracing::info;

use super::{Order, OrderError};

/// Parses orders posted by the order portal
#[derive(Debug, Default)]
pub struct JsonOrderformParser {
    pub order_name: Option<String>,
    pub customer_id: Option<String>,
}

impl JsonOrderformParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse_orderform(&mut self, order_data: serde_json::Value) -> Result<Order, OrderError> {
        let order: Order = serde_json::from_value(order_data)?;
        self.record(&order);
        Ok(order)
    }

    pub fn parse_str(&mut self, content: &str) -> Result<Order, OrderError> {
        let order: Order = serde_json::from_str(content)?;
        self.record(&order);
        Ok(order)
    }

    pub fn parse_file(&mut self, path: &Path) -> Result<Order, OrderError> {
        let content = std::fs::read_to_string(path)?;
        self.parse_str(&content)
    }

    fn record(&mut self, order: &Order) {
        info!("Parsed order {} with {} samples", order.name, order.samples.len());
        self.order_name = Some(order.name.clone());
        self.customer_id = Some(order.customer.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rml_order() -> serde_json::Value {
        json!({
            "name": "#123456",
            "customer": "cust000",
            "comment": "",
            "ticket": "123456",
            "samples": [
                {
                    "name": "sample1",
                    "pool": "pool1",
                    "application": "RMLP10R300",
                    "priority": "clinical trials",
                    "data_analysis": "fluffy",
                    "volume": 1,
                    "concentration": "2",
                    "index": "IDT DupSeq 10 bp Set B",
                    "index_number": 1,
                    "panels": null
                }
            ]
        })
    }

    #[test]
    fn test_parse_rml_orderform() {
        let mut parser = JsonOrderformParser::new();
        let order = parser.parse_orderform(rml_order()).unwrap();

        assert_eq!(parser.order_name.as_deref(), Some("#123456"));
        assert_eq!(parser.customer_id.as_deref(), Some("cust000"));
        assert_eq!(order.ticket, Some(123456));

        let sample = &order.samples[0];
        assert_eq!(sample.volume.as_deref(), Some("1"));
        assert_eq!(sample.index_number.as_deref(), Some("1"));
        assert!(sample.panels.is_empty());
    }

    #[test]
    fn test_missing_samples_is_an_error() {
        let mut parser = JsonOrderformParser::new();
        let err = parser
            .parse_str(r#"{"name": "order", "customer": "cust000"}"#)
            .unwrap_err();
        assert!(matches!(err, OrderError::Json(_)));
        assert!(parser.order_name.is_none());
    }
}
