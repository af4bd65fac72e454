//! Search filter construction
//!
//! Compiles a free-text query and the configured base predicate into an
//! RFC 4515 filter string. User text is always escaped; the base predicate
//! is trusted configuration and passed through as-is.

use std::borrow::Cow;

/// Attributes matched by a free-text query.
pub const SEARCHABLE_ATTRIBUTES: &[&str] = &[
    "cn",
    "sn",
    "givenName",
    "displayName",
    "uid",
    "sAMAccountName",
    "mail",
    "telephoneNumber",
    "mobile",
    "ipPhone",
    "title",
    "department",
    "company",
    "departmentNumber",
];

/// Filter expression tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    /// Substring match `(attr=*value*)`; the value is escaped on render.
    Contains { attribute: String, value: String },
    /// Pre-built filter text, rendered verbatim.
    Raw(String),
}

impl Filter {
    pub fn contains(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Contains {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Render to LDAP filter syntax.
    pub fn to_ldap(&self) -> String {
        match self {
            Filter::And(filters) => {
                let inner: Vec<String> = filters.iter().map(Filter::to_ldap).collect();
                format!("(&{})", inner.join(""))
            }
            Filter::Or(filters) => {
                let inner: Vec<String> = filters.iter().map(Filter::to_ldap).collect();
                format!("(|{})", inner.join(""))
            }
            Filter::Contains { attribute, value } => {
                format!("({}=*{}*)", attribute, escape_filter_value(value))
            }
            Filter::Raw(text) => wrap_predicate(text).into_owned(),
        }
    }
}

/// Build the search filter for a query.
///
/// Empty or whitespace-only text returns the base predicate unchanged.
pub fn build_filter(base_predicate: &str, free_text: Option<&str>) -> String {
    let text = free_text.map(str::trim).unwrap_or_default();
    if text.is_empty() {
        return base_predicate.to_string();
    }

    let any_attribute = Filter::Or(
        SEARCHABLE_ATTRIBUTES
            .iter()
            .map(|attr| Filter::contains(*attr, text))
            .collect(),
    );

    Filter::And(vec![Filter::Raw(base_predicate.to_string()), any_attribute]).to_ldap()
}

/// Escape special characters in filter values (RFC 4515).
///
/// `*`, `(`, `)`, `\` and NUL become `\2a`, `\28`, `\29`, `\5c`, `\00`.
pub fn escape_filter_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\5c"),
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// A configured predicate written without outer parentheses gets them added.
fn wrap_predicate(predicate: &str) -> Cow<'_, str> {
    let trimmed = predicate.trim();
    if trimmed.starts_with('(') && trimmed.ends_with(')') {
        Cow::Borrowed(trimmed)
    } else {
        Cow::Owned(format!("({trimmed})"))
    }
}
