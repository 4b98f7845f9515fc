use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::AppError;
use crate::models::{AccountRecord, Credential, Item, Section, SectionResult};

/// Replaces every non-alphanumeric character with `_`.
pub fn safe_file_stem(identity: &str) -> String {
    identity
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointStatus {
    Missing,
    Clean,
    /// Persisted, but some covers are relative and need a repair run.
    Dirty { violations: usize },
    /// Present but not parseable; handled like a dirty checkpoint.
    Unreadable(String),
}

/// On-disk layout of one account.
#[derive(Debug, Serialize, Deserialize)]
struct CheckpointDocument {
    credentials: CredentialFields,
    #[serde(default)]
    resources: ResourceFields,
}

#[derive(Debug, Serialize, Deserialize)]
struct CredentialFields {
    login: String,
    password: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ResourceFields {
    #[serde(default)]
    ebooks: SectionFields,
    #[serde(default)]
    audiobooks: SectionFields,
    #[serde(default)]
    courses: SectionFields,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SectionFields {
    #[serde(default)]
    count: usize,
    #[serde(default)]
    items: Vec<Item>,
}

impl SectionFields {
    fn from_items(items: &[Item]) -> Self {
        Self {
            count: items.len(),
            items: items.to_vec(),
        }
    }
}

impl From<&AccountRecord> for CheckpointDocument {
    fn from(record: &AccountRecord) -> Self {
        Self {
            credentials: CredentialFields {
                login: record.credential.identity.clone(),
                password: record.credential.secret.clone(),
            },
            resources: ResourceFields {
                ebooks: SectionFields::from_items(record.items(Section::Ebooks)),
                audiobooks: SectionFields::from_items(record.items(Section::Audiobooks)),
                courses: SectionFields::from_items(record.items(Section::Courses)),
            },
        }
    }
}

impl From<CheckpointDocument> for AccountRecord {
    fn from(document: CheckpointDocument) -> Self {
        let mut record = AccountRecord::new(Credential::new(
            document.credentials.login,
            document.credentials.password,
        ));
        let ResourceFields {
            ebooks,
            audiobooks,
            courses,
        } = document.resources;
        // `count` is derived data; the item list is authoritative.
        for (section, fields) in [
            (Section::Ebooks, ebooks),
            (Section::Audiobooks, audiobooks),
            (Section::Courses, courses),
        ] {
            record.insert(SectionResult::new(section, fields.items));
        }
        record
    }
}

pub fn to_json(record: &AccountRecord) -> Result<String, AppError> {
    Ok(serde_json::to_string_pretty(&CheckpointDocument::from(record))?)
}

pub fn from_json(json: &str) -> Result<AccountRecord, AppError> {
    let document: CheckpointDocument = serde_json::from_str(json)?;
    Ok(document.into())
}

/// One JSON file per account under a single directory.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, identity: &str) -> PathBuf {
        self.dir.join(format!("{}.json", safe_file_stem(identity)))
    }

    pub fn backup_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".backup");
        PathBuf::from(name)
    }

    pub fn load_path(path: &Path) -> Result<AccountRecord, AppError> {
        let contents = fs::read_to_string(path)?;
        from_json(&contents)
    }

    pub fn status(&self, identity: &str) -> CheckpointStatus {
        let path = self.path_for(identity);
        if !path.exists() {
            return CheckpointStatus::Missing;
        }
        match Self::load_path(&path) {
            Ok(record) if record.is_complete() => CheckpointStatus::Clean,
            Ok(record) => CheckpointStatus::Dirty {
                violations: record.integrity_violations(),
            },
            Err(e) => CheckpointStatus::Unreadable(e.to_string()),
        }
    }

    /// Copies any previous version to `<file>.backup`, then replaces the file via a
    /// sibling temp file and rename, so a failed write never leaves a partial checkpoint.
    pub fn write(&self, record: &AccountRecord) -> Result<PathBuf, AppError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&record.credential.identity);
        let json = to_json(record)?;

        if path.exists() {
            let backup = Self::backup_path(&path);
            fs::copy(&path, &backup)?;
            info!("Backed up previous checkpoint to {}", backup.display());
        }

        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;

        debug!("Checkpoint written to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn record(cover: &str) -> AccountRecord {
        let mut record = AccountRecord::new(Credential::new("a@x.com", "pw"));
        record.insert(SectionResult::new(
            Section::Ebooks,
            vec![
                Item::new("Lem", "Solaris", Some(cover)),
                Item::new("Herbert", "Dune", None),
            ],
        ));
        record
    }

    #[test]
    fn file_stem_replaces_non_alphanumerics() {
        assert_eq!(safe_file_stem("a.b+c@x.com"), "a_b_c_x_com");
        assert_eq!(safe_file_stem("Plain123"), "Plain123");
    }

    #[test]
    fn document_follows_export_schema() {
        let json = to_json(&record("https://x/y.jpg")).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["credentials"]["login"], "a@x.com");
        assert_eq!(value["credentials"]["password"], "pw");
        assert_eq!(value["resources"]["ebooks"]["count"], 2);
        assert_eq!(value["resources"]["ebooks"]["items"][1]["cover"], "");
        assert_eq!(value["resources"]["audiobooks"]["count"], 0);
        assert_eq!(value["resources"]["courses"]["items"], Value::Array(vec![]));
    }

    #[test]
    fn count_always_matches_items() {
        let json = to_json(&record("https://x/y.jpg")).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        for section in Section::ALL {
            let fields = &value["resources"][section.as_str()];
            assert_eq!(
                fields["count"].as_u64().unwrap() as usize,
                fields["items"].as_array().unwrap().len()
            );
        }
    }

    #[test]
    fn status_reports_integrity() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        assert_eq!(store.status("a@x.com"), CheckpointStatus::Missing);

        store.write(&record("https://x/y.jpg")).unwrap();
        assert_eq!(store.status("a@x.com"), CheckpointStatus::Clean);

        store.write(&record("relative/path.jpg")).unwrap();
        assert_eq!(
            store.status("a@x.com"),
            CheckpointStatus::Dirty { violations: 1 }
        );
    }

    #[test]
    fn garbage_file_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());
        fs::write(store.path_for("a@x.com"), "{ not json").unwrap();
        assert!(matches!(
            store.status("a@x.com"),
            CheckpointStatus::Unreadable(_)
        ));
    }

    #[test]
    fn overwrite_keeps_a_backup_of_the_previous_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path());

        let first = store.write(&record("covers/1.jpg")).unwrap();
        assert!(!CheckpointStore::backup_path(&first).exists());

        store.write(&record("https://x/1.jpg")).unwrap();
        let backup = CheckpointStore::load_path(&CheckpointStore::backup_path(&first)).unwrap();
        assert_eq!(
            backup.items(Section::Ebooks)[0].resource_ref.as_deref(),
            Some("covers/1.jpg")
        );
        assert!(CheckpointStore::load_path(&first).unwrap().is_complete());
        assert!(!dir.path().join("a_x_com.json.tmp").exists());
    }

    #[test]
    fn missing_sections_load_as_empty() {
        let json = r#"{
            "credentials": { "login": "a@x.com", "password": "pw" },
            "resources": {
                "ebooks": { "count": 1, "items": [ { "author": "A", "title": "T" } ] }
            }
        }"#;
        let record = from_json(json).unwrap();
        assert_eq!(record.items(Section::Ebooks), &[Item::new("A", "T", None)]);
        assert!(record.items(Section::Courses).is_empty());
    }
}
