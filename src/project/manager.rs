// Project manager for loading and saving projects
// ZIP container holding manifest.json and project.ron

use crate::project::serialization::*;
use crate::project::types::*;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zip::{ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const PROJECT_ENTRY: &str = "project.ron";

/// Project error types
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("File system error: {0}")]
    FileSystemError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid project structure: {0}")]
    InvalidStructure(String),

    #[error("Unsupported project format version {0}")]
    InvalidVersion(ProjectVersion),

    #[error("Missing required files in project")]
    MissingFiles,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProjectError {
    /// True for failures caused by the file contents rather than the file
    /// system
    pub fn is_parse_failure(&self) -> bool {
        matches!(
            self,
            ProjectError::Parse(_)
                | ProjectError::InvalidStructure(_)
                | ProjectError::InvalidVersion(_)
                | ProjectError::MissingFiles
                | ProjectError::Zip(_)
                | ProjectError::Json(_)
        )
    }
}

/// Options for loading a project
#[derive(Debug, Clone)]
pub struct ProjectLoadOptions {
    /// Whether to validate the project structure
    pub validate: bool,
}

impl Default for ProjectLoadOptions {
    fn default() -> Self {
        Self { validate: true }
    }
}

/// Project manager - handles saving/loading projects
#[derive(Debug, Default, Clone)]
pub struct ProjectManager;

impl ProjectManager {
    pub fn new() -> Self {
        Self
    }

    /// Create a new empty project
    pub fn create_new_project(&self, name: impl Into<String>) -> Project {
        Project::new(name)
    }

    /// Save project to a ZIP file
    ///
    /// The archive is written to a hidden sibling file first and renamed over
    /// the target only once complete, so a failed save never leaves a
    /// truncated project behind.
    pub fn save_project<P: AsRef<Path>>(
        &self,
        project: &Project,
        project_path: P,
    ) -> Result<(), ProjectError> {
        let project_path = project_path.as_ref();
        let project_dir = match project_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&project_dir).map_err(|e| {
            ProjectError::FileSystemError(format!("Failed to create project directory: {}", e))
        })?;

        let manifest_json = serialize_metadata_to_json(&project.metadata)?;
        let project_ron = serialize_to_ron(project)?;

        let temp_path = temp_path_for(project_path);
        let written = write_archive(&temp_path, &manifest_json, &project_ron)
            .and_then(|()| fs::rename(&temp_path, project_path).map_err(ProjectError::from));
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        log::info!("Saved project to {}", project_path.display());
        Ok(())
    }

    /// Load project from a ZIP file
    ///
    /// Nothing outside the returned value is touched, so a failure at any
    /// point leaves the caller's state as it was.
    pub fn load_project<P: AsRef<Path>>(
        &self,
        project_path: P,
        options: &ProjectLoadOptions,
    ) -> Result<Project, ProjectError> {
        let project_path = project_path.as_ref();

        let zip_file = File::open(project_path).map_err(|e| {
            ProjectError::FileSystemError(format!(
                "Failed to open project file {}: {}",
                project_path.display(),
                e
            ))
        })?;
        let mut zip_archive = ZipArchive::new(zip_file)?;

        let manifest_json = read_entry(&mut zip_archive, MANIFEST_ENTRY)?;
        let metadata = deserialize_metadata_from_json(&manifest_json)?;
        if !metadata.version.is_compatible() {
            return Err(ProjectError::InvalidVersion(metadata.version));
        }

        let project_ron = read_entry(&mut zip_archive, PROJECT_ENTRY)?;
        let mut project = deserialize_from_ron(&project_ron)?;

        // The manifest is authoritative for metadata
        project.metadata = metadata;

        if options.validate {
            crate::project::validate_project(&project)?;
        }

        log::info!("Loaded project from {}", project_path.display());
        Ok(project)
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}

fn write_archive(path: &Path, manifest_json: &str, project_ron: &str) -> Result<(), ProjectError> {
    let zip_file = File::create(path).map_err(|e| {
        ProjectError::FileSystemError(format!("Failed to create ZIP file: {}", e))
    })?;
    let mut zip_writer = ZipWriter::new(zip_file);
    let options: zip::write::FileOptions<()> = zip::write::FileOptions::default();

    zip_writer.start_file(MANIFEST_ENTRY, options)?;
    zip_writer.write_all(manifest_json.as_bytes())?;
    zip_writer.start_file(PROJECT_ENTRY, options)?;
    zip_writer.write_all(project_ron.as_bytes())?;

    let file = zip_writer.finish()?;
    file.sync_all()?;
    Ok(())
}

fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> Result<String, ProjectError> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Err(ProjectError::MissingFiles),
        Err(e) => return Err(e.into()),
    };
    let mut contents = String::new();
    entry.read_to_string(&mut contents)?;
    Ok(contents)
}
