//! Raw directory entries and their normalization into [`DirectoryRecord`].
//!
//! Servers hand attributes back in two shapes: an ordered list of
//! `{type, values}` pairs or a name-to-value map whose values are either a
//! single string or a list. Both are accepted and folded the same way.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::dn::leaf_value;
use crate::record::{DirectoryRecord, UNKNOWN_COMMON_NAME};

/// Attribute value in map form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Single(String),
    Multi(Vec<String>),
}

impl AttributeValue {
    fn values(&self) -> &[String] {
        match self {
            AttributeValue::Single(value) => std::slice::from_ref(value),
            AttributeValue::Multi(values) => values,
        }
    }
}

/// Attribute in pair-list form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributePair {
    #[serde(rename = "type")]
    pub name: String,
    #[serde(default)]
    pub values: Vec<String>,
}

impl AttributePair {
    pub fn new(name: impl Into<String>, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// Attributes of a raw entry in either server shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawAttributes {
    Pairs(Vec<AttributePair>),
    Map(BTreeMap<String, AttributeValue>),
}

impl Default for RawAttributes {
    fn default() -> Self {
        RawAttributes::Pairs(Vec::new())
    }
}

impl RawAttributes {
    /// `(name, values)` in server order.
    fn iter(&self) -> Box<dyn Iterator<Item = (&str, &[String])> + '_> {
        match self {
            RawAttributes::Pairs(pairs) => Box::new(
                pairs
                    .iter()
                    .map(|pair| (pair.name.as_str(), pair.values.as_slice())),
            ),
            RawAttributes::Map(map) => {
                Box::new(map.iter().map(|(name, value)| (name.as_str(), value.values())))
            }
        }
    }
}

/// Entry as returned by the directory, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEntry {
    pub dn: String,
    #[serde(default)]
    pub attributes: RawAttributes,
}

impl RawEntry {
    pub fn new(dn: impl Into<String>, attributes: RawAttributes) -> Self {
        Self {
            dn: dn.into(),
            attributes,
        }
    }

    /// Entry from `(name, values)` pairs.
    pub fn from_pairs<N, V>(dn: impl Into<String>, pairs: impl IntoIterator<Item = (N, V)>) -> Self
    where
        N: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        let pairs = pairs
            .into_iter()
            .map(|(name, values)| AttributePair::new(name, values))
            .collect();
        Self::new(dn, RawAttributes::Pairs(pairs))
    }
}

/// Case-insensitive attribute view. Per name, the first occurrence holding a
/// non-blank value wins, and within it the first non-blank value.
struct FoldedAttributes(HashMap<String, String>);

impl FoldedAttributes {
    fn fold(attributes: &RawAttributes) -> Self {
        let mut folded = HashMap::new();
        for (name, values) in attributes.iter() {
            let key = name.to_lowercase();
            if folded.contains_key(&key) {
                continue;
            }
            if let Some(value) = values.iter().map(|v| v.trim()).find(|v| !v.is_empty()) {
                folded.insert(key, value.to_string());
            }
        }
        Self(folded)
    }

    fn get(&self, name: &str) -> Option<String> {
        self.0.get(&name.to_lowercase()).cloned()
    }
}

/// Fold a raw entry into a canonical record.
///
/// Multi-valued attributes collapse to their first non-blank value; blank
/// values are skipped, not returned. Identity fields named by the DN's leaf
/// RDN take precedence over the corresponding attributes.
pub fn normalize(entry: &RawEntry) -> DirectoryRecord {
    let attrs = FoldedAttributes::fold(&entry.attributes);

    let common_name = leaf_value(&entry.dn, "cn")
        .or_else(|| attrs.get("cn"))
        .unwrap_or_else(|| UNKNOWN_COMMON_NAME.to_string());

    DirectoryRecord {
        distinguished_name: entry.dn.clone(),
        uid: leaf_value(&entry.dn, "uid").or_else(|| attrs.get("uid")),
        common_name,
        surname: attrs.get("sn"),
        given_name: attrs.get("givenName"),
        display_name: attrs.get("displayName"),
        account_name: attrs.get("sAMAccountName"),
        mail: attrs.get("mail"),
        telephone_number: attrs.get("telephoneNumber"),
        ip_phone: attrs.get("ipPhone"),
        mobile: attrs.get("mobile"),
        title: attrs.get("title"),
        department: attrs.get("department"),
        department_number: attrs.get("departmentNumber"),
        company: attrs.get("company"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ATTRIBUTES: &[&str] = &[
        "cn",
        "uid",
        "sn",
        "givenName",
        "displayName",
        "sAMAccountName",
        "mail",
        "telephoneNumber",
        "ipPhone",
        "mobile",
        "title",
        "department",
        "departmentNumber",
        "company",
    ];

    #[test]
    fn test_normalize_pairs() {
        let entry = RawEntry::from_pairs(
            "CN=Иван Петров,OU=Users,DC=example,DC=com",
            [
                ("cn", vec!["Иван Петров"]),
                ("sn", vec!["Петров"]),
                ("mail", vec!["ipetrov@example.com", "alias@example.com"]),
                ("telephoneNumber", vec!["1234"]),
                ("sAMAccountName", vec!["ipetrov"]),
            ],
        );
        let record = normalize(&entry);

        assert_eq!(record.distinguished_name, "CN=Иван Петров,OU=Users,DC=example,DC=com");
        assert_eq!(record.common_name, "Иван Петров");
        assert_eq!(record.surname.as_deref(), Some("Петров"));
        assert_eq!(record.mail.as_deref(), Some("ipetrov@example.com"));
        assert_eq!(record.telephone_number.as_deref(), Some("1234"));
        assert_eq!(record.account_name.as_deref(), Some("ipetrov"));
        assert_eq!(record.uid, None);
        assert_eq!(record.title, None);
    }

    #[test]
    fn test_normalize_map_shape_single_and_multi() {
        let json = r#"{
            "dn": "cn=Anna Smirnova,ou=users,dc=example,dc=com",
            "attributes": {
                "cn": "Anna Smirnova",
                "title": ["Engineer", "Lead"],
                "mobile": "+79001234567"
            }
        }"#;
        let entry: RawEntry = serde_json::from_str(json).unwrap();
        assert!(matches!(entry.attributes, RawAttributes::Map(_)));

        let record = normalize(&entry);
        assert_eq!(record.title.as_deref(), Some("Engineer"));
        assert_eq!(record.mobile.as_deref(), Some("+79001234567"));
    }

    #[test]
    fn test_normalize_pair_shape_from_json() {
        let json = r#"{
            "dn": "cn=x,dc=y",
            "attributes": [{"type": "mail", "values": ["x@y"]}]
        }"#;
        let entry: RawEntry = serde_json::from_str(json).unwrap();
        assert_eq!(normalize(&entry).mail.as_deref(), Some("x@y"));
    }

    #[test]
    fn test_attribute_names_are_case_insensitive_first_wins() {
        let entry = RawEntry::from_pairs(
            "cn=x,dc=y",
            [
                ("TELEPHONENUMBER", vec!["111"]),
                ("telephoneNumber", vec!["222"]),
                ("Mail", vec!["", "second@y"]),
            ],
        );
        let record = normalize(&entry);
        assert_eq!(record.telephone_number.as_deref(), Some("111"));
        assert_eq!(record.mail.as_deref(), Some("second@y"));
    }

    #[test]
    fn test_leaf_rdn_overrides_attributes() {
        let entry = RawEntry::from_pairs(
            "uid=ivanov,cn=guest,ou=users,dc=example,dc=com",
            [("uid", vec!["other"]), ("cn", vec!["Иванов И.И."])],
        );
        let record = normalize(&entry);
        assert_eq!(record.uid.as_deref(), Some("ivanov"));
        assert_eq!(record.common_name, "Иванов И.И.");
    }

    #[test]
    fn test_multi_valued_leaf_rdn() {
        let entry = RawEntry::from_pairs(
            "cn=Ivan Petrov+uid=ipetrov,ou=users,dc=example",
            [("cn", vec!["ignored"])],
        );
        let record = normalize(&entry);
        assert_eq!(record.common_name, "Ivan Petrov");
        assert_eq!(record.uid.as_deref(), Some("ipetrov"));
    }

    #[test]
    fn test_common_name_from_dn_when_attribute_missing() {
        let entry = RawEntry::from_pairs("cn=Doe\\, John,dc=x", Vec::<(&str, Vec<&str>)>::new());
        assert_eq!(normalize(&entry).common_name, "Doe, John");
    }

    #[test]
    fn test_unknown_common_name_fallback() {
        let entry = RawEntry::from_pairs(
            "uid=ghost,dc=x",
            [("mail", vec!["ghost@x"])],
        );
        let record = normalize(&entry);
        assert_eq!(record.common_name, UNKNOWN_COMMON_NAME);
        assert_eq!(record.uid.as_deref(), Some("ghost"));
    }

    #[test]
    fn test_blank_values_are_skipped() {
        let entry = RawEntry::from_pairs(
            "cn=x,dc=y",
            [("title", vec!["  ", "Lead"]), ("mobile", vec![" "])],
        );
        let record = normalize(&entry);
        assert_eq!(record.title.as_deref(), Some("Lead"));
        assert_eq!(record.mobile, None);
    }

    proptest! {
        #[test]
        fn prop_pairs_and_map_normalize_identically(
            attributes in prop::collection::btree_map(
                prop::sample::select(ATTRIBUTES.to_vec()),
                prop::collection::vec("[ a-zA-Zа-я0-9@.+]{0,8}", 0..3),
                0..ATTRIBUTES.len(),
            ),
            single_when_possible in any::<bool>(),
        ) {
            let pairs = RawEntry::from_pairs("ou=users,dc=example", attributes.clone());
            let map = attributes
                .iter()
                .map(|(name, values)| {
                    let value = match values.as_slice() {
                        [only] if single_when_possible => AttributeValue::Single(only.clone()),
                        _ => AttributeValue::Multi(values.clone()),
                    };
                    (name.to_string(), value)
                })
                .collect();
            let map = RawEntry::new("ou=users,dc=example", RawAttributes::Map(map));

            prop_assert_eq!(normalize(&pairs), normalize(&map));
        }
    }
}
