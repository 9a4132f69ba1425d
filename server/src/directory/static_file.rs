//! Directory adapter backed by a static JSON file
//!
//! Intended for small setups without an LDAP server and for development. The file contains a list
//! of person records:
//!
//! ```json
//! {"persons": [
//!     {"username": "jan", "email": "jan@example.nl", "photo": "photos/jan.jpg",
//!      "extra_attributes": {"fullName": {"information": "Jan Jansen", "icon": "FaUserCircle"}}}
//! ]}
//! ```
//!
//! Photo paths are relative to the directory of the JSON file.

use super::{photo_from_bytes, DirectoryAdapter, DirectoryEntry, DirectoryError};
use crate::data_store::models::ExtraAttributes;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct StaticDirectoryFile {
    persons: Vec<StaticPersonRecord>,
}

#[derive(Clone, Debug, Deserialize)]
struct StaticPersonRecord {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    extra_attributes: ExtraAttributes,
    #[serde(default)]
    photo: Option<PathBuf>,
}

pub struct StaticDirectory {
    persons: Vec<StaticPersonRecord>,
    base_path: PathBuf,
}

impl StaticDirectory {
    pub fn load(path: &Path) -> Result<Self, DirectoryError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DirectoryError::Fetch(format!("Could not read {}: {}", path.display(), e))
        })?;
        let file: StaticDirectoryFile = serde_json::from_str(&content).map_err(|e| {
            DirectoryError::InvalidEntry(format!("Could not parse {}: {}", path.display(), e))
        })?;
        Ok(Self {
            persons: file.persons,
            base_path: path
                .parent()
                .map(|p| p.to_owned())
                .unwrap_or_default(),
        })
    }
}

impl DirectoryAdapter for StaticDirectory {
    fn lookup(&mut self, search_key: &str) -> Result<DirectoryEntry, DirectoryError> {
        let is_email = search_key.contains('@');
        let matches: Vec<&StaticPersonRecord> = self
            .persons
            .iter()
            .filter(|p| {
                if is_email {
                    p.email.as_deref() == Some(search_key)
                } else {
                    p.username.as_deref() == Some(search_key)
                }
            })
            .collect();
        let record = match matches.len() {
            0 => return Err(DirectoryError::NotFound(search_key.to_owned())),
            1 => matches[0].clone(),
            n => {
                return Err(DirectoryError::Ambiguous {
                    search_key: search_key.to_owned(),
                    matches: n,
                })
            }
        };

        let photo = match &record.photo {
            Some(photo_path) => {
                let full_path = self.base_path.join(photo_path);
                let bytes = std::fs::read(&full_path).map_err(|e| {
                    DirectoryError::InvalidEntry(format!(
                        "Could not read photo {}: {}",
                        full_path.display(),
                        e
                    ))
                })?;
                Some(photo_from_bytes(bytes)?)
            }
            None => None,
        };

        Ok(DirectoryEntry {
            username: record.username,
            email: record.email,
            extra_attributes: record.extra_attributes,
            photo,
        })
    }
}
