use crate::types::{Dataset, DatasetError, SpatialUnit};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::info;

/// MIME types accepted by the upload form.
pub const ALLOWED_MIME_TYPES: [&str; 2] = ["application/json", "application/geo+json"];

/// User-correctable upload problems, phrased as the alert messages the
/// viewer shows.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("You have not selected a file")]
    NoFileSelected,
    #[error("Only one file can be uploaded at a time")]
    MultipleFiles,
    #[error("This file is not a geojson or json file")]
    NotGeoJson,
    #[error("Fail to parse geojson or json file")]
    MalformedJson,
    #[error("No select type of file")]
    NoUnitSelected,
    #[error("File name is not usable")]
    InvalidFileName,
}

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("failed to read dataset file {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    #[error("file is not valid JSON")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ListError {
    #[error("failed to list choropleth directory {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A file as handed over by the browser's file picker.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// The exact payload a validated upload produces: one file part and one
/// spatial-unit part, nothing else. Built only after every check passed, so
/// no request ever leaves with an invalid file attached.
#[derive(Debug, Clone)]
pub struct UploadForm {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub unit: SpatialUnit,
}

/// Validate a selection from the upload form. Checks run in the order the
/// user can fix them: file selected, supported type, parseable content,
/// target unit chosen.
pub fn build_upload_form(
    files: &[FileUpload],
    unit: Option<SpatialUnit>,
) -> Result<UploadForm, ValidationError> {
    let file = match files {
        [] => return Err(ValidationError::NoFileSelected),
        [file] => file,
        _ => return Err(ValidationError::MultipleFiles),
    };

    if !ALLOWED_MIME_TYPES.contains(&file.content_type.as_str()) {
        return Err(ValidationError::NotGeoJson);
    }
    if serde_json::from_slice::<serde_json::Value>(&file.bytes).is_err() {
        return Err(ValidationError::MalformedJson);
    }
    let unit = unit.ok_or(ValidationError::NoUnitSelected)?;

    Ok(UploadForm {
        file_name: file.file_name.clone(),
        bytes: file.bytes.clone(),
        unit,
    })
}

fn has_allowed_extension(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.ends_with(".json") || lower.ends_with(".geojson")
}

/// File name without its json/geojson extension, lowercased.
fn file_stem(name: &str) -> String {
    let id = name.to_lowercase();
    if let Some(stem) = id.strip_suffix(".geojson") {
        stem.to_string()
    } else if let Some(stem) = id.strip_suffix(".json") {
        stem.to_string()
    } else {
        id
    }
}

fn tidy(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '(' || c == ')' {
                c
            } else {
                ' '
            }
        })
        .collect()
}

fn capitalize_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Menu display name for a stored dataset file.
pub fn display_name(file_name: &str) -> String {
    capitalize_first(&tidy(&file_stem(file_name)))
}

/// Label for an entry of the property list.
pub fn property_label(property: &str) -> String {
    let lowered: String = property.chars().flat_map(char::to_lowercase).collect();
    capitalize_first(&tidy(&lowered))
}

/// Filesystem-backed dataset store. Uploaded choropleth files live under
/// `<root>/choropleth/<unit>/`.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> FsStore {
        FsStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn choropleth_dir(&self, unit: SpatialUnit) -> PathBuf {
        self.root.join("choropleth").join(unit.dir_name())
    }

    /// Names of the dataset files stored for a unit, json/geojson only,
    /// sorted for a stable menu order.
    pub async fn list_files(&self, unit: SpatialUnit) -> Result<Vec<String>, ListError> {
        let dir = self.choropleth_dir(unit);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(ListError::Io { path: dir, source }),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| ListError::Io { path: dir.clone(), source })?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if has_allowed_extension(&name) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Store a validated upload. The name is reduced to its final path
    /// component so a crafted file name cannot escape the unit directory.
    pub async fn save_upload(
        &self,
        form: &UploadForm,
    ) -> Result<PathBuf, std::io::Error> {
        let dir = self.choropleth_dir(form.unit);
        fs::create_dir_all(&dir).await?;
        let file_name = Path::new(&form.file_name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let path = dir.join(file_name);
        fs::write(&path, &form.bytes).await?;
        info!(path = %path.display(), "stored uploaded dataset");
        Ok(path)
    }

    pub async fn read_dataset(&self, unit: SpatialUnit, file_name: &str) -> Result<Dataset, ReadError> {
        let path = self.choropleth_dir(unit).join(file_name);
        let bytes = fs::read(&path)
            .await
            .map_err(|source| ReadError::Io { path: path.clone(), source })?;
        Ok(Dataset::from_slice(&bytes)?)
    }

    /// The stored file as plain JSON, for handing to a client that parses
    /// datasets itself.
    pub async fn read_json(&self, unit: SpatialUnit, file_name: &str) -> Result<serde_json::Value, ReadError> {
        let path = self.choropleth_dir(unit).join(file_name);
        let bytes = fs::read(&path)
            .await
            .map_err(|source| ReadError::Io { path: path.clone(), source })?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Reject stored-file names that are empty or try to traverse out of the
/// unit directory.
pub fn acceptable_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains('/')
        && !name.contains('\\')
        && name != "."
        && name != ".."
        && has_allowed_extension(name)
}
