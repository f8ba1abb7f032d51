//! CouchDB design-document rendering.
//!
//! The bucketing views ultimately run inside the key store's database, so a
//! [`DeriverConfig`] can be rendered back into the JavaScript map function the
//! view engine executes. The rendered function mirrors [`derive_bucket_key`]
//! for the same config: same type-tag pattern, same substring position, same
//! divisor.
//!
//! [`derive_bucket_key`]: crate::deriver::derive_bucket_key

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::deriver::{DeriverConfig, DigitOffset, DivisorCorrection, ValueSelector};

/// One view inside a design document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewDefinition {
    pub map: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reduce: Option<String>,
}

/// A CouchDB design document holding one or more views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignDocument {
    pub language: String,
    pub views: BTreeMap<String, ViewDefinition>,
}

/// Builds a design document with a single named bucketing view.
///
/// `with_count_reduce` attaches the builtin `_count` reducer so the view
/// materializes the per-bucket counts directly.
pub fn design_document(
    view_name: &str,
    config: &DeriverConfig,
    with_count_reduce: bool,
) -> DesignDocument {
    let view = ViewDefinition {
        map: render_map_function(config),
        reduce: with_count_reduce.then(|| "_count".to_string()),
    };

    let mut views = BTreeMap::new();
    views.insert(view_name.to_string(), view);

    DesignDocument {
        language: "javascript".to_string(),
        views,
    }
}

/// Renders the single-line JavaScript map function for `config`.
pub fn render_map_function(config: &DeriverConfig) -> String {
    let n = config.digit_count;
    let substr = match config.digit_offset {
        DigitOffset::FromStart => format!("identifier.substr(0, {n})"),
        DigitOffset::FromEnd => format!("identifier.substr(identifier.length - {n}, {n})"),
    };

    let range = (1u128 << (4 * n)) - 1;
    let divisor = match config.divisor_correction {
        DivisorCorrection::None => format!("0x{range:x}"),
        DivisorCorrection::PlusOne => format!("(1.0 + 0x{range:x})"),
    };

    let scaled = format!(
        "Math.floor(({}.0 * parseInt(digits)) / {})",
        config.bucket_count, divisor
    );
    let key = if config.key_offset == 0 {
        scaled
    } else {
        format!("{} + {}", config.key_offset, scaled)
    };

    let emitted = match config.value_selector {
        ValueSelector::SubObject => "value",
        ValueSelector::WholeDocument => "doc",
    };

    format!(
        "function(doc) {{ if (doc.type.match(/^creds_v\\d+\\.\\d+/i)) {{ \
         var identifier = \"\"; var value = \"\"; \
         if (doc.basic) {{ identifier = doc.basic.api_key; value = doc.basic }} \
         else {{ identifier = doc.mac.mac_key_identifier; value = doc.mac }}; \
         var digits = \"0x\" + {substr}; \
         var key = {key}; \
         emit(key, {emitted}) }} }}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_function_fine_spread() {
        let map = render_map_function(&DeriverConfig::fine_spread());

        assert!(map.contains("identifier.substr(0, 4)"));
        assert!(map.contains("1 + Math.floor((1000.0 * parseInt(digits)) / (1.0 + 0xffff))"));
        assert!(map.contains("emit(key, doc)"));
    }

    #[test]
    fn test_map_function_coarse_sample() {
        let map = render_map_function(&DeriverConfig::coarse_sample());

        assert!(map.contains("identifier.substr(identifier.length - 2, 2)"));
        assert!(map.contains("Math.floor((99.0 * parseInt(digits)) / 0xff)"));
        // 0-based keys take no additive offset
        assert!(!map.contains("0 + Math.floor"));
    }

    #[test]
    fn test_map_function_sub_object_emission() {
        let map = render_map_function(&DeriverConfig::percentile());
        assert!(map.contains("emit(key, value)"));
    }

    #[test]
    fn test_design_document_with_reduce() {
        let doc = design_document("random_set_of_creds", &DeriverConfig::sample_window(), true);

        assert_eq!(doc.language, "javascript");
        let view = &doc.views["random_set_of_creds"];
        assert_eq!(view.reduce.as_deref(), Some("_count"));

        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["views"]["random_set_of_creds"]["reduce"], "_count");
    }

    #[test]
    fn test_design_document_without_reduce_omits_field() {
        let doc = design_document("all", &DeriverConfig::fine_spread(), false);
        let json = serde_json::to_value(&doc).unwrap();

        assert!(json["views"]["all"].get("reduce").is_none());
        assert!(
            json["views"]["all"]["map"]
                .as_str()
                .unwrap()
                .starts_with("function(doc)")
        );
    }

    #[test]
    fn test_design_document_round_trips() {
        let doc = design_document("all", &DeriverConfig::percentile(), true);
        let json = serde_json::to_string(&doc).unwrap();
        let back: DesignDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(doc, back);
    }
}
