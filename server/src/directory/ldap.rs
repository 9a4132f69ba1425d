//! LDAP directory adapter

use super::{photo_from_bytes, DirectoryAdapter, DirectoryEntry, DirectoryError};
use crate::config::{LdapAttributeMapping, LdapDirectoryConfig};
use crate::data_store::models::{ExtraAttribute, ExtraAttributes};
use ldap3::{ldap_escape, LdapConn, LdapConnSettings, LdapError, Scope, SearchEntry};
use log::{debug, warn};
use std::time::Duration;

const EMAIL_ATTRIBUTE: &str = "mail";
const PHOTO_ATTRIBUTE: &str = "jpegPhoto";

pub struct LdapDirectory {
    config: LdapDirectoryConfig,
    bind_dn: String,
    password: String,
    /// Bound connection, established lazily and dropped after any error
    connection: Option<LdapConn>,
}

impl LdapDirectory {
    pub fn new(config: LdapDirectoryConfig, bind_dn: String, password: String) -> Self {
        Self {
            config,
            bind_dn,
            password,
            connection: None,
        }
    }

    fn connect(&self) -> Result<LdapConn, LdapError> {
        debug!("Connecting to LDAP server {}", self.config.url);
        let settings = LdapConnSettings::new()
            .set_conn_timeout(Duration::from_secs(self.config.timeout_secs));
        let mut connection = LdapConn::with_settings(settings, &self.config.url)?;
        connection
            .with_timeout(Duration::from_secs(self.config.timeout_secs))
            .simple_bind(&self.bind_dn, &self.password)?
            .success()?;
        Ok(connection)
    }

    fn search(&mut self, search_key: &str) -> Result<Vec<SearchEntry>, LdapError> {
        let mut connection = match self.connection.take() {
            Some(connection) => connection,
            None => self.connect()?,
        };
        let base = format!("ou={},{}", self.config.user_ou, self.config.base_dn);
        let filter = search_filter(search_key, &self.config.account_attribute);
        let (entries, _result) = connection
            .with_timeout(Duration::from_secs(self.config.timeout_secs))
            .search(
                &base,
                Scope::Subtree,
                &filter,
                requested_attributes(&self.config.attributes),
            )?
            .success()?;
        // Only keep the connection for the next lookup if it did not fail
        self.connection = Some(connection);
        Ok(entries.into_iter().map(SearchEntry::construct).collect())
    }
}

impl DirectoryAdapter for LdapDirectory {
    fn lookup(&mut self, search_key: &str) -> Result<DirectoryEntry, DirectoryError> {
        let mut entries = self.search(search_key).map_err(|e| {
            warn!("LDAP query for '{}' failed: {}", search_key, e);
            DirectoryError::Fetch(e.to_string())
        })?;
        match entries.len() {
            0 => Err(DirectoryError::NotFound(search_key.to_owned())),
            1 => entry_to_directory_entry(entries.remove(0), &self.config.attributes),
            n => Err(DirectoryError::Ambiguous {
                search_key: search_key.to_owned(),
                matches: n,
            }),
        }
    }
}

fn search_filter(search_key: &str, account_attribute: &str) -> String {
    if search_key.contains('@') {
        format!("({}={})", EMAIL_ATTRIBUTE, ldap_escape(search_key))
    } else {
        format!("({}={})", account_attribute, ldap_escape(search_key))
    }
}

fn requested_attributes(mappings: &[LdapAttributeMapping]) -> Vec<String> {
    let mut attributes = vec![EMAIL_ATTRIBUTE.to_owned(), PHOTO_ATTRIBUTE.to_owned()];
    attributes.extend(mappings.iter().map(|m| m.ldap_attribute.clone()));
    attributes
}

/// Value of the first relative distinguished name, e.g. "jan" for "uid=jan,ou=people,dc=example"
fn first_rdn_value(dn: &str) -> Option<&str> {
    dn.split(',')
        .next()
        .and_then(|rdn| rdn.split_once('='))
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

fn entry_to_directory_entry(
    entry: SearchEntry,
    mappings: &[LdapAttributeMapping],
) -> Result<DirectoryEntry, DirectoryError> {
    let username = first_rdn_value(&entry.dn).map(|v| v.to_owned());
    let email = entry
        .attrs
        .get(EMAIL_ATTRIBUTE)
        .and_then(|values| values.first())
        .cloned();
    if username.is_none() && email.is_none() {
        return Err(DirectoryError::InvalidEntry(format!(
            "Entry {} has neither a username nor an email address",
            entry.dn
        )));
    }

    let mut extra_attributes = ExtraAttributes::default();
    for mapping in mappings {
        if let Some(value) = entry
            .attrs
            .get(&mapping.ldap_attribute)
            .and_then(|values| values.first())
        {
            extra_attributes.0.insert(
                mapping.name.clone(),
                ExtraAttribute::new(value.clone(), mapping.icon.clone()),
            );
        }
    }

    let photo = match entry
        .bin_attrs
        .get(PHOTO_ATTRIBUTE)
        .and_then(|values| values.first())
    {
        Some(bytes) => Some(photo_from_bytes(bytes.clone())?),
        None => None,
    };

    Ok(DirectoryEntry {
        username,
        email,
        extra_attributes,
        photo,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn default_mappings() -> Vec<LdapAttributeMapping> {
        vec![
            LdapAttributeMapping {
                name: "fullName".to_owned(),
                ldap_attribute: "cn".to_owned(),
                icon: Some("FaUserCircle".to_owned()),
            },
            LdapAttributeMapping {
                name: "location".to_owned(),
                ldap_attribute: "l".to_owned(),
                icon: Some("FaMapMarkerAlt".to_owned()),
            },
        ]
    }

    #[test]
    fn test_search_filter() {
        assert_eq!(search_filter("jan", "uid"), "(uid=jan)");
        assert_eq!(
            search_filter("jan@example.nl", "uid"),
            "(mail=jan@example.nl)"
        );
        assert_eq!(search_filter("j*n", "sAMAccountName"), "(sAMAccountName=j\\2an)");
    }

    #[test]
    fn test_first_rdn_value() {
        assert_eq!(first_rdn_value("uid=jan,ou=people,dc=example"), Some("jan"));
        assert_eq!(first_rdn_value("cn=Jan Jansen"), Some("Jan Jansen"));
        assert_eq!(first_rdn_value(""), None);
    }

    #[test]
    fn test_entry_to_directory_entry() {
        let entry = SearchEntry {
            dn: "uid=jan,ou=people,dc=example,dc=nl".to_owned(),
            attrs: HashMap::from([
                ("mail".to_owned(), vec!["jan@example.nl".to_owned()]),
                ("cn".to_owned(), vec!["Jan Jansen".to_owned()]),
            ]),
            bin_attrs: HashMap::from([(
                "jpegPhoto".to_owned(),
                vec![crate::directory::tests::png_bytes(4, 3)],
            )]),
        };

        let result = entry_to_directory_entry(entry, &default_mappings()).unwrap();
        assert_eq!(result.username.as_deref(), Some("jan"));
        assert_eq!(result.email.as_deref(), Some("jan@example.nl"));
        assert_eq!(result.extra_attributes.0.len(), 1);
        let full_name = &result.extra_attributes.0["fullName"];
        assert_eq!(full_name.information, "Jan Jansen");
        assert_eq!(full_name.icon, "FaUserCircle");
        let photo = result.photo.unwrap();
        assert_eq!((photo.width, photo.height), (4, 3));
    }

    #[test]
    fn test_entry_without_identity() {
        let entry = SearchEntry {
            dn: "".to_owned(),
            attrs: HashMap::new(),
            bin_attrs: HashMap::new(),
        };
        assert!(matches!(
            entry_to_directory_entry(entry, &default_mappings()),
            Err(DirectoryError::InvalidEntry(_))
        ));
    }
}
