use quick_xml::se::to_string_with_root;
use serde::{Deserialize, Serialize};

use super::ArtifactCoordinate;
use crate::core::error::{PipelineError, PipelineResult};

const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Minimal POM model. Published game jars have no dependencies, so only
/// the identifying fields are written.
#[derive(Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PomDocument {
    #[serde(default)]
    pub model_version: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub artifact_id: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub packaging: Option<String>,
}

impl PomDocument {
    pub fn for_coordinate(coordinate: &ArtifactCoordinate) -> Self {
        Self {
            model_version: Some("4.0.0".to_string()),
            group_id: Some(coordinate.group_id.clone()),
            artifact_id: Some(coordinate.artifact_id.clone()),
            version: Some(coordinate.version.clone()),
            packaging: Some("jar".to_string()),
        }
    }

    pub fn to_xml(&self) -> PipelineResult<String> {
        let body =
            to_string_with_root("project", self).map_err(|e| PipelineError::PomWrite(e.to_string()))?;
        Ok(format!("{}\n{}\n", XML_HEADER, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::maven::CacheScope;
    use std::path::Path;

    #[test]
    fn writes_identifying_fields() {
        let coordinate = ArtifactCoordinate::new(
            "net.example",
            "game",
            "1.0",
            Some("merged-named"),
            CacheScope::Global,
            Path::new("/repo"),
        );
        let xml = PomDocument::for_coordinate(&coordinate).to_xml().unwrap();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<groupId>net.example</groupId>"));
        assert!(xml.contains("<modelVersion>4.0.0</modelVersion>"));

        let parsed: PomDocument = quick_xml::de::from_str(&xml).unwrap();
        assert_eq!(parsed.artifact_id.as_deref(), Some("game"));
    }
}
