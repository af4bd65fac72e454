//! Person record types
//!
//! `DirectoryRecord` is what reads produce; `ImportRecord` and `RecordEdit`
//! are what writes consume. Writes always pass through field-presence
//! filtering before they become directory changes.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{DirectoryError, DirectoryResult};

/// Common name used when neither the entry nor its DN carries one.
pub const UNKNOWN_COMMON_NAME: &str = "Unknown";

/// Canonical person entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryRecord {
    pub distinguished_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    pub common_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telephone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

impl DirectoryRecord {
    /// Record with only a DN and a common name.
    pub fn new(distinguished_name: impl Into<String>, common_name: impl Into<String>) -> Self {
        Self {
            distinguished_name: distinguished_name.into(),
            uid: None,
            common_name: common_name.into(),
            surname: None,
            given_name: None,
            display_name: None,
            account_name: None,
            mail: None,
            telephone_number: None,
            ip_phone: None,
            mobile: None,
            title: None,
            department: None,
            department_number: None,
            company: None,
        }
    }

    /// Name the list is ordered by: display name, else common name, else surname.
    pub fn sort_name(&self) -> &str {
        [
            self.display_name.as_deref(),
            Some(self.common_name.as_str()),
            self.surname.as_deref(),
        ]
        .into_iter()
        .flatten()
        .find(|name| !name.trim().is_empty())
        .unwrap_or("")
    }
}

/// Optional person attributes that imports and edits may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersonField {
    DisplayName,
    Mail,
    TelephoneNumber,
    IpPhone,
    Mobile,
    Title,
    Department,
    DepartmentNumber,
}

impl PersonField {
    pub const ALL: [PersonField; 8] = [
        PersonField::DisplayName,
        PersonField::Mail,
        PersonField::TelephoneNumber,
        PersonField::IpPhone,
        PersonField::Mobile,
        PersonField::Title,
        PersonField::Department,
        PersonField::DepartmentNumber,
    ];

    /// LDAP attribute name.
    pub fn attribute(&self) -> &'static str {
        match self {
            PersonField::DisplayName => "displayName",
            PersonField::Mail => "mail",
            PersonField::TelephoneNumber => "telephoneNumber",
            PersonField::IpPhone => "ipPhone",
            PersonField::Mobile => "mobile",
            PersonField::Title => "title",
            PersonField::Department => "department",
            PersonField::DepartmentNumber => "departmentNumber",
        }
    }

    pub fn is_phone(&self) -> bool {
        matches!(
            self,
            PersonField::TelephoneNumber | PersonField::IpPhone | PersonField::Mobile
        )
    }

    /// Trim, and for phone-like fields keep only digits and a leading `+`.
    ///
    /// Returns `None` when nothing writable is left.
    pub fn normalize(&self, raw: &str) -> Option<String> {
        let trimmed = raw.trim();
        let value = if self.is_phone() {
            let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
            if digits.is_empty() {
                return None;
            }
            if trimmed.starts_with('+') {
                format!("+{digits}")
            } else {
                digits
            }
        } else {
            trimmed.to_string()
        };
        (!value.is_empty()).then_some(value)
    }
}

/// One staged change to an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeChange {
    /// Replace all values with a single value.
    Replace { attribute: String, value: String },
    /// Remove the attribute entirely.
    Clear { attribute: String },
}

/// Candidate person record from the transport layer (CSV or JSON).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRecord {
    #[serde(
        rename = "cn",
        alias = "commonName",
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub common_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub mail: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub telephone_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub ip_phone: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub mobile: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub department_number: Option<String>,
}

impl ImportRecord {
    pub fn new(common_name: impl Into<String>) -> Self {
        Self {
            common_name: Some(common_name.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with(mut self, field: PersonField, value: impl Into<String>) -> Self {
        *self.slot(field) = Some(value.into());
        self
    }

    /// Key reported back in results; the raw common name.
    pub fn key(&self) -> &str {
        self.common_name.as_deref().unwrap_or("")
    }

    /// Trimmed common name, or a parse error when missing.
    pub fn require_common_name(&self) -> DirectoryResult<&str> {
        self.common_name
            .as_deref()
            .map(str::trim)
            .filter(|cn| !cn.is_empty())
            .ok_or_else(|| DirectoryError::parse("record has no common name (cn)"))
    }

    pub fn get(&self, field: PersonField) -> Option<&str> {
        match field {
            PersonField::DisplayName => self.display_name.as_deref(),
            PersonField::Mail => self.mail.as_deref(),
            PersonField::TelephoneNumber => self.telephone_number.as_deref(),
            PersonField::IpPhone => self.ip_phone.as_deref(),
            PersonField::Mobile => self.mobile.as_deref(),
            PersonField::Title => self.title.as_deref(),
            PersonField::Department => self.department.as_deref(),
            PersonField::DepartmentNumber => self.department_number.as_deref(),
        }
    }

    fn slot(&mut self, field: PersonField) -> &mut Option<String> {
        match field {
            PersonField::DisplayName => &mut self.display_name,
            PersonField::Mail => &mut self.mail,
            PersonField::TelephoneNumber => &mut self.telephone_number,
            PersonField::IpPhone => &mut self.ip_phone,
            PersonField::Mobile => &mut self.mobile,
            PersonField::Title => &mut self.title,
            PersonField::Department => &mut self.department,
            PersonField::DepartmentNumber => &mut self.department_number,
        }
    }

    /// Fields present and non-empty after normalization, in attribute order.
    pub fn present_fields(&self) -> Vec<(PersonField, String)> {
        PersonField::ALL
            .iter()
            .filter_map(|field| {
                let raw = self.get(*field)?;
                field.normalize(raw).map(|value| (*field, value))
            })
            .collect()
    }

    /// Replace-modifications for every present field.
    pub fn staged_changes(&self) -> Vec<AttributeChange> {
        Self::changes_for(&self.present_fields())
    }

    /// Replace-modifications for already normalized fields.
    pub fn changes_for(fields: &[(PersonField, String)]) -> Vec<AttributeChange> {
        fields
            .iter()
            .map(|(field, value)| AttributeChange::Replace {
                attribute: field.attribute().to_string(),
                value: value.clone(),
            })
            .collect()
    }
}

/// Interactive edit of an existing entry.
///
/// Omitted fields are left untouched; an empty string clears the attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEdit {
    #[serde(rename = "dn", alias = "distinguishedName")]
    pub distinguished_name: String,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub mail: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub telephone_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub ip_phone: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub mobile: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub department_number: Option<String>,
}

impl RecordEdit {
    pub fn new(distinguished_name: impl Into<String>) -> Self {
        Self {
            distinguished_name: distinguished_name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn set(mut self, field: PersonField, value: impl Into<String>) -> Self {
        let value = Some(value.into());
        match field {
            PersonField::DisplayName => self.display_name = value,
            PersonField::Mail => self.mail = value,
            PersonField::TelephoneNumber => self.telephone_number = value,
            PersonField::IpPhone => self.ip_phone = value,
            PersonField::Mobile => self.mobile = value,
            PersonField::Title => self.title = value,
            PersonField::Department => self.department = value,
            PersonField::DepartmentNumber => self.department_number = value,
        }
        self
    }

    fn get(&self, field: PersonField) -> Option<&str> {
        match field {
            PersonField::DisplayName => self.display_name.as_deref(),
            PersonField::Mail => self.mail.as_deref(),
            PersonField::TelephoneNumber => self.telephone_number.as_deref(),
            PersonField::IpPhone => self.ip_phone.as_deref(),
            PersonField::Mobile => self.mobile.as_deref(),
            PersonField::Title => self.title.as_deref(),
            PersonField::Department => self.department.as_deref(),
            PersonField::DepartmentNumber => self.department_number.as_deref(),
        }
    }

    /// Changes for the supplied fields only.
    pub fn changes(&self) -> DirectoryResult<Vec<AttributeChange>> {
        let mut changes = Vec::new();
        for field in PersonField::ALL {
            let Some(raw) = self.get(field) else {
                continue;
            };
            let attribute = field.attribute().to_string();
            if raw.trim().is_empty() {
                changes.push(AttributeChange::Clear { attribute });
                continue;
            }
            let value = field.normalize(raw).ok_or_else(|| {
                DirectoryError::parse(format!("{attribute} '{raw}' contains no digits"))
            })?;
            changes.push(AttributeChange::Replace { attribute, value });
        }
        Ok(changes)
    }
}

/// Outcome of reconciling one import record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconciliationStatus {
    Created,
    Updated,
    Error,
}

/// Per-record reconciliation result, positionally aligned with the input batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub key: String,
    pub status: ReconciliationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReconciliationResult {
    pub fn created(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            status: ReconciliationStatus::Created,
            error: None,
        }
    }

    pub fn updated(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            status: ReconciliationStatus::Updated,
            error: None,
        }
    }

    pub fn failed(key: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            status: ReconciliationStatus::Error,
            error: Some(error.into()),
        }
    }
}

/// Split a full name on its last space into `(given name, surname)`.
///
/// A single-word name is used for both.
pub fn split_name(common_name: &str) -> (String, String) {
    let name = common_name.trim();
    match name.rsplit_once(' ') {
        Some((given, surname)) if !given.trim().is_empty() && !surname.is_empty() => {
            (given.trim().to_string(), surname.to_string())
        }
        _ => (name.to_string(), name.to_string()),
    }
}

/// Login derived from a full name: lowercase letters and digits only (Latin or Cyrillic).
pub fn derive_login(common_name: &str) -> String {
    common_name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || ('а'..='я').contains(c) || *c == 'ё')
        .collect()
}

/// Accept strings and numbers; spreadsheets often turn phone numbers into numbers.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient {
        Text(String),
        Integer(i64),
        Float(f64),
    }

    Ok(match Option::<Lenient>::deserialize(deserializer)? {
        Some(Lenient::Text(s)) => Some(s),
        Some(Lenient::Integer(i)) => Some(i.to_string()),
        Some(Lenient::Float(f)) => Some(f.to_string()),
        None => None,
    })
}
