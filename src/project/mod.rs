// Project persistence for perfseq
// Implements ZIP container format for saving/loading songs

pub mod manager;
pub mod recent;
pub mod serialization;
pub mod types;

use crate::sequencer::timeline::{MAX_BPM, MIN_BPM};
use std::collections::HashSet;

pub use manager::{ProjectError, ProjectLoadOptions, ProjectManager};
pub use recent::RecentFiles;
pub use types::{Project, ProjectMetadata, ProjectVersion, SetlistInfo, TransportFile};

/// Helper function to validate project structure
pub fn validate_project(project: &Project) -> Result<(), ProjectError> {
    if project.metadata.name.len() > 255 {
        return Err(ProjectError::InvalidStructure(
            "Project name cannot exceed 255 characters".to_string(),
        ));
    }

    let transport = &project.transport;
    if !(MIN_BPM..=MAX_BPM).contains(&transport.bpm) {
        return Err(ProjectError::InvalidStructure(format!(
            "Tempo must be between {} and {} BPM",
            MIN_BPM, MAX_BPM
        )));
    }

    let signature = transport.settings.time_signature;
    if !(1..=32).contains(&signature.beats_per_measure) {
        return Err(ProjectError::InvalidStructure(
            "Time signature numerator must be between 1 and 32".to_string(),
        ));
    }
    if !signature.beat_width.is_power_of_two() || signature.beat_width > 32 {
        return Err(ProjectError::InvalidStructure(
            "Time signature denominator must be a power of 2 and <= 32".to_string(),
        ));
    }

    if transport.left_tick >= transport.right_tick {
        return Err(ProjectError::InvalidStructure(format!(
            "Left marker {} must be before right marker {}",
            transport.left_tick, transport.right_tick
        )));
    }

    for (index, track) in project.arrangement.tracks().iter().enumerate() {
        let mut pattern_ids = HashSet::new();
        for pattern in track.patterns() {
            if !pattern_ids.insert(pattern.id) {
                return Err(ProjectError::InvalidStructure(format!(
                    "Duplicate pattern ID {} on track {}",
                    pattern.id, index
                )));
            }
            if pattern.length() == 0 {
                return Err(ProjectError::InvalidStructure(format!(
                    "Pattern {} on track {} has zero length",
                    pattern.id, index
                )));
            }
            let events = pattern.events();
            if events.iter().any(|e| e.tick >= pattern.length())
                || events.windows(2).any(|pair| pair[0].tick > pair[1].tick)
            {
                return Err(ProjectError::InvalidStructure(format!(
                    "Pattern {} on track {} has events out of order or past its end",
                    pattern.id, index
                )));
            }
        }

        for trigger in track.triggers() {
            if trigger.start >= trigger.end {
                return Err(ProjectError::InvalidStructure(format!(
                    "Trigger at {} on track {} has no duration",
                    trigger.start, index
                )));
            }
            if !pattern_ids.contains(&trigger.pattern) {
                return Err(ProjectError::InvalidStructure(format!(
                    "Track {} references missing pattern {}",
                    index, trigger.pattern
                )));
            }
        }
    }

    for pair in project.tempo_markers.windows(2) {
        if pair[0].tick >= pair[1].tick {
            return Err(ProjectError::InvalidStructure(format!(
                "Tempo markers out of order at tick {}",
                pair[1].tick
            )));
        }
    }
    if let Some(marker) = project
        .tempo_markers
        .iter()
        .find(|m| !(MIN_BPM..=MAX_BPM).contains(&m.bpm))
    {
        return Err(ProjectError::InvalidStructure(format!(
            "Tempo marker at {} is out of range",
            marker.tick
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::tempo::TempoMarker;
    use crate::sequencer::timeline::TimeSignature;
    use crate::sequencer::track::Track;
    use crate::sequencer::trigger::Trigger;

    fn project_with_track() -> Project {
        let mut project = Project::new("Valid");
        let mut track = Track::new("Lead");
        let pattern = track.add_pattern("A", 0);
        project.arrangement.add_track(track);
        project.arrangement.add_trigger(0, pattern, 0, 384);
        project
    }

    #[test]
    fn test_validate_project_valid() {
        assert!(validate_project(&project_with_track()).is_ok());
        assert!(validate_project(&Project::default()).is_ok());
    }

    #[test]
    fn test_validate_project_invalid_tempo() {
        let mut project = Project::default();
        project.transport.bpm = 10.0;
        let err = validate_project(&project).unwrap_err();
        assert!(err.to_string().contains("Tempo must be between"));
    }

    #[test]
    fn test_validate_project_invalid_time_signature() {
        let mut project = Project::default();
        project.transport.settings.time_signature = TimeSignature {
            beats_per_measure: 0,
            beat_width: 4,
        };
        assert!(validate_project(&project).is_err());

        project.transport.settings.time_signature = TimeSignature {
            beats_per_measure: 4,
            beat_width: 6,
        };
        let err = validate_project(&project).unwrap_err();
        assert!(err.to_string().contains("power of 2"));
    }

    #[test]
    fn test_validate_project_markers() {
        let mut project = Project::default();
        project.transport.left_tick = 500;
        project.transport.right_tick = 500;
        assert!(validate_project(&project).is_err());

        let mut project = Project::default();
        project.tempo_markers = vec![TempoMarker::new(0, 120.0), TempoMarker::new(0, 130.0)];
        assert!(validate_project(&project).is_err());
    }

    #[test]
    fn test_validate_project_missing_pattern() {
        let mut project = project_with_track();
        if let Some(track) = project.arrangement.track_mut(0) {
            track.add_trigger(Trigger::new(99, 384, 768, 50).unwrap());
        }
        let err = validate_project(&project).unwrap_err();
        assert!(err.to_string().contains("references missing pattern"));
    }

    #[test]
    fn test_validate_project_zero_length_pattern() {
        let project = project_with_track();
        let length = format!("length:{}", project.arrangement.tracks()[0].patterns()[0].length());
        let text = ron::to_string(&project).unwrap().replace(&length, "length:0");
        let broken: Project = ron::from_str(&text).unwrap();

        let err = validate_project(&broken).unwrap_err();
        assert!(err.to_string().contains("zero length"));
    }
}
