// Serialization utilities for project persistence

use crate::project::ProjectError;
use crate::project::types::*;
use ron::ser::PrettyConfig;

/// Serialize project state to RON format
pub fn serialize_to_ron(project: &Project) -> Result<String, ProjectError> {
    ron::ser::to_string_pretty(project, PrettyConfig::default()).map_err(|e| {
        ProjectError::SerializationError(format!("Failed to serialize to RON: {}", e))
    })
}

/// Deserialize project state from RON format
pub fn deserialize_from_ron(ron_data: &str) -> Result<Project, ProjectError> {
    ron::from_str(ron_data)
        .map_err(|e| ProjectError::Parse(format!("Failed to deserialize from RON: {}", e)))
}

/// Serialize project metadata to JSON format
pub fn serialize_metadata_to_json(metadata: &ProjectMetadata) -> Result<String, ProjectError> {
    serde_json::to_string_pretty(metadata).map_err(|e| {
        ProjectError::SerializationError(format!("Failed to serialize metadata to JSON: {}", e))
    })
}

/// Deserialize project metadata from JSON format
pub fn deserialize_metadata_from_json(json_data: &str) -> Result<ProjectMetadata, ProjectError> {
    serde_json::from_str(json_data).map_err(|e| {
        ProjectError::Parse(format!("Failed to deserialize metadata from JSON: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::track::Track;

    #[test]
    fn test_ron_serialization() {
        let mut project = Project::new("RON");
        let mut track = Track::new("Bass");
        let pattern = track.add_pattern("Line", 0);
        project.arrangement.add_track(track);
        project.arrangement.add_trigger(0, pattern, 0, 384);

        let ron = serialize_to_ron(&project).unwrap();
        assert!(ron.contains("Bass"));
        let back = deserialize_from_ron(&ron).unwrap();
        assert_eq!(back, project);
    }

    #[test]
    fn test_json_metadata_serialization() {
        let metadata = ProjectMetadata::new("Meta");
        let json = serialize_metadata_to_json(&metadata).unwrap();
        assert!(json.contains("\"name\": \"Meta\""));
        assert_eq!(deserialize_metadata_from_json(&json).unwrap(), metadata);
    }

    #[test]
    fn test_corrupt_input_is_parse_error() {
        assert!(matches!(
            deserialize_from_ron("(metadata: oops"),
            Err(ProjectError::Parse(_))
        ));
        assert!(matches!(
            deserialize_metadata_from_json("{"),
            Err(ProjectError::Parse(_))
        ));
    }
}
