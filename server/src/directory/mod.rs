//! Directory adapters: looking up the details (canonical identity, display attributes, photo) of
//! a person in a user directory

use crate::cli_error::CliError;
use crate::config::DirectoryConfig;
use crate::data_store::models::{ExtraAttributes, PersonDirectoryUpdate, PersonImageData};
use std::fmt::{Display, Formatter};
use std::io::Cursor;

pub mod ldap;
pub mod static_file;

/// The details of a person, as returned by the directory
#[derive(Clone, Debug, PartialEq)]
pub struct DirectoryEntry {
    pub username: Option<String>,
    pub email: Option<String>,
    pub extra_attributes: ExtraAttributes,
    pub photo: Option<PersonImageData>,
}

impl From<DirectoryEntry> for PersonDirectoryUpdate {
    fn from(value: DirectoryEntry) -> Self {
        Self {
            username: value.username,
            email: value.email,
            extra_attributes: value.extra_attributes,
            image: value.photo,
        }
    }
}

pub trait DirectoryAdapter {
    /// Look up a single person by username or email address (search keys containing an "@" are
    /// treated as email addresses).
    fn lookup(&mut self, search_key: &str) -> Result<DirectoryEntry, DirectoryError>;
}

#[derive(Debug)]
pub enum DirectoryError {
    /// The directory could not be reached or the query failed
    Fetch(String),
    /// No person matches the search key
    NotFound(String),
    /// More than one person matches the search key
    Ambiguous { search_key: String, matches: usize },
    /// The directory entry is missing required information or contains invalid data
    InvalidEntry(String),
}

impl Display for DirectoryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DirectoryError::Fetch(e) => write!(f, "Directory query failed: {}", e),
            DirectoryError::NotFound(key) => {
                write!(f, "No person found in directory for '{}'", key)
            }
            DirectoryError::Ambiguous {
                search_key,
                matches,
            } => write!(
                f,
                "Found {} persons in directory for '{}', expected exactly one",
                matches, search_key
            ),
            DirectoryError::InvalidEntry(e) => write!(f, "Invalid directory entry: {}", e),
        }
    }
}

impl std::error::Error for DirectoryError {}

/// Create the directory adapter selected in the board configuration
pub fn create_directory_adapter(
    config: Option<&DirectoryConfig>,
) -> Result<Box<dyn DirectoryAdapter>, CliError> {
    match config {
        Some(DirectoryConfig::Ldap(ldap_config)) => {
            let (bind_dn, password) = crate::setup::get_ldap_credentials_from_env()?;
            Ok(Box::new(ldap::LdapDirectory::new(
                ldap_config.clone(),
                bind_dn,
                password,
            )))
        }
        Some(DirectoryConfig::Static { path }) => Ok(Box::new(
            static_file::StaticDirectory::load(path)
                .map_err(|e| CliError::AdapterSetupError(e.to_string()))?,
        )),
        None => Err(CliError::ConfigError(
            "No directory configured. The person refresher requires a 'directory' section in the configuration.".to_owned(),
        )),
    }
}

/// Wrap raw photo bytes, determining the pixel dimensions from the image header
pub fn photo_from_bytes(image_bytes: Vec<u8>) -> Result<PersonImageData, DirectoryError> {
    let (width, height) = image::ImageReader::new(Cursor::new(&image_bytes))
        .with_guessed_format()
        .map_err(|e| DirectoryError::InvalidEntry(format!("Unreadable photo: {}", e)))?
        .into_dimensions()
        .map_err(|e| DirectoryError::InvalidEntry(format!("Invalid photo: {}", e)))?;
    Ok(PersonImageData {
        image_bytes,
        width: width as i32,
        height: height as i32,
    })
}
