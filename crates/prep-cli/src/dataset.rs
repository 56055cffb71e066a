//! JSON dataset files backing the in-memory store.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use prep_core::Dataset;

pub fn load_dataset(path: &Path) -> Result<Dataset> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read dataset {}", path.display()))?;
    let dataset: Dataset = serde_json::from_str(&contents)
        .with_context(|| format!("parse dataset {}", path.display()))?;
    tracing::debug!(
        path = %path.display(),
        patients = dataset.patients.len(),
        screening_types = dataset.screening_types.len(),
        screenings = dataset.screenings.len(),
        "loaded dataset"
    );
    Ok(dataset)
}

/// Write the dataset through a sibling temp file and rename it into place,
/// so a crash never leaves a half-written dataset behind.
pub fn save_dataset(dataset: &Dataset, path: &Path) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(dataset).context("serialize dataset")?;
    let temp_path = path.with_extension("json.tmp");

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }

    let mut file = File::create(&temp_path)
        .with_context(|| format!("create {}", temp_path.display()))?;
    file.write_all(&bytes)
        .with_context(|| format!("write {}", temp_path.display()))?;
    file.sync_all()
        .with_context(|| format!("sync {}", temp_path.display()))?;

    fs::rename(&temp_path, path).with_context(|| {
        format!(
            "rename {} to {}",
            temp_path.display(),
            path.display()
        )
    })?;
    tracing::info!(path = %path.display(), "saved dataset");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("clinic.json");
        save_dataset(&Dataset::default(), &path).unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(load_dataset(&path).unwrap(), Dataset::default());
    }

    #[test]
    fn load_reports_the_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        let err = load_dataset(&path).unwrap_err();
        assert!(format!("{err:#}").contains("broken.json"));
    }
}
