use svarflyt_core::types::{QueryResponse, Reference};

const MISSING_TITLE: &str = "Ingen tittel";
const MISSING_URL: &str = "Ingen URL";

/// Turn the results scoring at least `cutoff` into references.
///
/// Backend order is kept. Results without a score never qualify.
pub fn extract_references(response: &QueryResponse, cutoff: f64) -> Vec<Reference> {
    response
        .source_nodes
        .iter()
        .filter_map(|node| {
            let score = node.score.filter(|s| *s >= cutoff)?;
            Some(Reference {
                name: node
                    .metadata
                    .title
                    .as_deref()
                    .unwrap_or(MISSING_TITLE)
                    .trim_start()
                    .to_string(),
                url: node
                    .metadata
                    .url
                    .clone()
                    .unwrap_or_else(|| MISSING_URL.to_string()),
                relevance_index: score,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use svarflyt_core::types::{NodeMetadata, SourceNode};
    use svarflyt_test_utils::response_with_scores;

    #[test]
    fn test_filters_by_cutoff_and_keeps_order() {
        let response = response_with_scores("svar", &[0.9, 0.4, 0.95]);
        let refs = extract_references(&response, 0.5);

        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].name, "Doc 0");
        assert_eq!(refs[0].relevance_index, 0.9);
        assert_eq!(refs[1].name, "Doc 2");
        assert_eq!(refs[1].url, "https://example.no/2");
    }

    #[test]
    fn test_score_equal_to_cutoff_is_included() {
        let response = response_with_scores("svar", &[0.5]);
        assert_eq!(extract_references(&response, 0.5).len(), 1);
    }

    #[test]
    fn test_missing_metadata_and_score() {
        let response = QueryResponse {
            response: "svar".into(),
            source_nodes: vec![
                SourceNode {
                    score: None,
                    metadata: NodeMetadata::default(),
                },
                SourceNode::scored(0.7),
                SourceNode::scored(0.8).with_title("  Vilkår"),
            ],
        };
        let refs = extract_references(&response, 0.0);

        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].name, "Ingen tittel");
        assert_eq!(refs[0].url, "Ingen URL");
        assert_eq!(refs[1].name, "Vilkår");
    }
}
