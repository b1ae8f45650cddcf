//! Pod objects from the metadata service

use serde::Deserialize;
use std::collections::HashMap;

/// The part of a Kubernetes pod object the allocator lookup reads
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pod {
    /// Object metadata
    #[serde(default)]
    pub metadata: PodMetadata,
}

/// Pod metadata
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PodMetadata {
    /// Pod name
    #[serde(default)]
    pub name: String,
    /// Pod namespace
    #[serde(default)]
    pub namespace: String,
    /// Annotations
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

impl Pod {
    /// Value of an annotation
    #[must_use]
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata.annotations.get(key).map(String::as_str)
    }

    /// Candidate networks listed in `annotation`
    #[must_use]
    pub fn networks(&self, annotation: &str) -> Vec<String> {
        self.annotation(annotation)
            .map(candidate_networks)
            .unwrap_or_default()
    }
}

/// Split a comma-separated network list, dropping blanks
#[must_use]
pub fn candidate_networks(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|network| !network.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_networks() {
        assert_eq!(candidate_networks("app-a"), vec!["app-a"]);
        assert_eq!(
            candidate_networks(" app-a, app-b ,,app-c,"),
            vec!["app-a", "app-b", "app-c"]
        );
        assert!(candidate_networks("").is_empty());
        assert!(candidate_networks(" , ").is_empty());
    }

    #[test]
    fn test_pod_annotation() {
        let pod: Pod = serde_json::from_str(
            r#"{
                "apiVersion": "v1",
                "kind": "Pod",
                "metadata": {
                    "name": "nginx-test",
                    "namespace": "default",
                    "annotations": {"app_net": "app-a,app-b"}
                },
                "spec": {"containers": []}
            }"#,
        )
        .unwrap();

        assert_eq!(pod.metadata.name, "nginx-test");
        assert_eq!(pod.networks("app_net"), vec!["app-a", "app-b"]);
        assert!(pod.networks("other").is_empty());
    }

    #[test]
    fn test_pod_without_annotations() {
        let pod: Pod = serde_json::from_str(r#"{"metadata": {"name": "web"}}"#).unwrap();
        assert!(pod.annotation("app_net").is_none());
    }
}
