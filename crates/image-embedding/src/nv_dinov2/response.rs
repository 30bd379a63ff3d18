//! Extraction of an embedding vector from the service's JSON responses.
//!
//! The response shape is not versioned, so a few known layouts are tried in
//! a fixed order and anything else yields `None`.

use serde_json::Value;

use crate::EmbeddingOutput;

type Extractor = fn(&Value) -> Option<EmbeddingOutput>;

// first match wins
const EXTRACTORS: &[Extractor] = &[metadata_format, flat_format, wrapped_format];

/// Pull the embedding vector out of a response document.
///
/// Returns `None` for any unrecognized shape, including `{"error": …}`
/// documents; absence of a value is the only failure signal.
pub fn extract_embedding(response: &Value) -> Option<EmbeddingOutput> {
    EXTRACTORS.iter().find_map(|extract| extract(response))
}

// {"metadata": [{"embedding": [...]}], ...}
fn metadata_format(response: &Value) -> Option<EmbeddingOutput> {
    as_floats(response.get("metadata")?.as_array()?.first()?.get("embedding")?)
}

// {"embedding": [...]}
fn flat_format(response: &Value) -> Option<EmbeddingOutput> {
    as_floats(response.get("embedding")?)
}

// wrapped variants, e.g. {"data": [{"embedding": [...]}]}
fn wrapped_format(response: &Value) -> Option<EmbeddingOutput> {
    ["data", "outputs", "results"]
        .iter()
        .find_map(|key| as_floats(response.get(*key)?.as_array()?.first()?.get("embedding")?))
}

fn as_floats(value: &Value) -> Option<EmbeddingOutput> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn metadata_format_is_extracted() {
        let response = json!({ "metadata": [{ "embedding": [0.1, 0.2, 0.3] }] });
        assert_eq!(
            extract_embedding(&response),
            Some(vec![0.1_f32, 0.2, 0.3])
        );
    }

    #[test]
    fn flat_format_is_extracted() {
        let response = json!({ "embedding": [1.0, 2.0] });
        assert_eq!(extract_embedding(&response), Some(vec![1.0, 2.0]));
    }

    #[test]
    fn wrapped_formats_are_extracted() {
        for key in ["data", "outputs", "results"] {
            let response = json!({ key: [{ "embedding": [3.0, 4.0] }] });
            assert_eq!(extract_embedding(&response), Some(vec![3.0, 4.0]), "{key}");
        }
    }

    #[test]
    fn metadata_wins_over_flat() {
        let response = json!({
            "metadata": [{ "embedding": [1.0] }],
            "embedding": [2.0],
        });
        assert_eq!(extract_embedding(&response), Some(vec![1.0]));
    }

    #[test]
    fn empty_metadata_falls_through_to_flat() {
        let response = json!({ "metadata": [], "embedding": [2.0] });
        assert_eq!(extract_embedding(&response), Some(vec![2.0]));
    }

    #[test]
    fn error_document_yields_none() {
        assert_eq!(extract_embedding(&json!({ "error": "boom" })), None);
    }

    #[test]
    fn unrecognized_shapes_yield_none() {
        assert_eq!(extract_embedding(&json!({})), None);
        assert_eq!(extract_embedding(&json!([1.0, 2.0])), None);
        assert_eq!(extract_embedding(&json!("embedding")), None);
        assert_eq!(extract_embedding(&Value::Null), None);
    }

    #[test]
    fn non_numeric_embedding_yields_none() {
        assert_eq!(
            extract_embedding(&json!({ "embedding": ["a", "b"] })),
            None
        );
    }
}
