//! In-memory directory
//!
//! A [`DirectoryConnector`] over a process-local entry map, compiled only for
//! tests and the `test-util` feature. It evaluates the filter subset the phonebook emits,
//! tracks open sessions so leaks are observable, and can inject bind delays,
//! search delays and per-DN write failures.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::SearchScope;
use crate::entry::{AttributePair, RawAttributes, RawEntry};
use crate::error::{DirectoryError, DirectoryResult, Operation};
use crate::record::AttributeChange;
use crate::session::{BindCredentials, DirectoryConnector, DirectorySession, NewEntryAttributes, SearchRequest};

const NO_SUCH_OBJECT: u32 = 32;
const INVALID_CREDENTIALS: u32 = 49;
const UNWILLING_TO_PERFORM: u32 = 53;
const ALREADY_EXISTS: u32 = 68;

#[derive(Debug, Clone)]
struct StoredEntry {
    dn: String,
    attributes: Vec<(String, Vec<String>)>,
}

impl StoredEntry {
    fn values(&self, name: &str) -> Option<&[String]> {
        self.attributes
            .iter()
            .find(|(attr, _)| attr.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
    }

    fn replace(&mut self, name: &str, values: Vec<String>) {
        self.attributes.retain(|(attr, _)| !attr.eq_ignore_ascii_case(name));
        if !values.is_empty() {
            self.attributes.push((name.to_string(), values));
        }
    }
}

#[derive(Default)]
struct Counters {
    open: AtomicUsize,
    opened_total: AtomicUsize,
    unbinds: AtomicUsize,
    aborts: AtomicUsize,
}

struct Inner {
    credentials: BindCredentials,
    entries: Mutex<BTreeMap<String, StoredEntry>>,
    failing_writes: Mutex<HashSet<String>>,
    operations: Mutex<Vec<(Operation, String)>>,
    bind_delay: Duration,
    search_delay: Duration,
    counters: Counters,
}

/// Process-local directory.
#[derive(Clone)]
pub struct InMemoryDirectory {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn dn_key(dn: &str) -> String {
    dn.split(',')
        .map(|rdn| rdn.trim().to_lowercase())
        .collect::<Vec<_>>()
        .join(",")
}

impl InMemoryDirectory {
    /// Empty directory accepting a single service identity.
    pub fn new(identity: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                credentials: BindCredentials::new(identity, credential),
                entries: Mutex::new(BTreeMap::new()),
                failing_writes: Mutex::new(HashSet::new()),
                operations: Mutex::new(Vec::new()),
                bind_delay: Duration::ZERO,
                search_delay: Duration::ZERO,
                counters: Counters::default(),
            }),
        }
    }

    fn rebuild(self, f: impl FnOnce(&mut Inner)) -> Self {
        let mut inner = match Arc::try_unwrap(self.inner) {
            Ok(inner) => inner,
            Err(shared) => Inner {
                credentials: shared.credentials.clone(),
                entries: Mutex::new(lock(&shared.entries).clone()),
                failing_writes: Mutex::new(lock(&shared.failing_writes).clone()),
                operations: Mutex::new(Vec::new()),
                bind_delay: shared.bind_delay,
                search_delay: shared.search_delay,
                counters: Counters::default(),
            },
        };
        f(&mut inner);
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Delay every bind by `delay`.
    #[must_use]
    pub fn with_bind_delay(self, delay: Duration) -> Self {
        self.rebuild(|inner| inner.bind_delay = delay)
    }

    /// Delay every search by `delay`.
    #[must_use]
    pub fn with_search_delay(self, delay: Duration) -> Self {
        self.rebuild(|inner| inner.search_delay = delay)
    }

    /// Seed an entry.
    #[must_use]
    pub fn with_entry<N, V>(self, dn: &str, attributes: impl IntoIterator<Item = (N, V)>) -> Self
    where
        N: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        self.insert(dn, attributes);
        self
    }

    pub fn insert<N, V>(&self, dn: &str, attributes: impl IntoIterator<Item = (N, V)>)
    where
        N: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        let attributes = attributes
            .into_iter()
            .map(|(name, values)| (name.into(), values.into_iter().map(Into::into).collect()))
            .collect();
        lock(&self.inner.entries).insert(
            dn_key(dn),
            StoredEntry {
                dn: dn.to_string(),
                attributes,
            },
        );
    }

    /// Make modify and add on `dn` fail with "unwilling to perform".
    pub fn fail_writes_for(&self, dn: &str) {
        lock(&self.inner.failing_writes).insert(dn_key(dn));
    }

    pub fn contains(&self, dn: &str) -> bool {
        lock(&self.inner.entries).contains_key(&dn_key(dn))
    }

    /// All values of `attribute` on `dn`.
    pub fn attribute(&self, dn: &str, attribute: &str) -> Option<Vec<String>> {
        lock(&self.inner.entries)
            .get(&dn_key(dn))
            .and_then(|entry| entry.values(attribute).map(<[String]>::to_vec))
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sessions currently open (bound or binding, not yet closed).
    pub fn open_sessions(&self) -> usize {
        self.inner.counters.open.load(Ordering::SeqCst)
    }

    pub fn sessions_opened(&self) -> usize {
        self.inner.counters.opened_total.load(Ordering::SeqCst)
    }

    pub fn unbind_count(&self) -> usize {
        self.inner.counters.unbinds.load(Ordering::SeqCst)
    }

    pub fn abort_count(&self) -> usize {
        self.inner.counters.aborts.load(Ordering::SeqCst)
    }

    /// Write operations received, in order.
    pub fn operations(&self) -> Vec<(Operation, String)> {
        lock(&self.inner.operations).clone()
    }

    fn record(&self, operation: Operation, dn: &str) {
        lock(&self.inner.operations).push((operation, dn.to_string()));
    }

    fn check_writable(&self, operation: Operation, dn: &str) -> DirectoryResult<()> {
        if lock(&self.inner.failing_writes).contains(&dn_key(dn)) {
            return Err(DirectoryError::rejected(
                operation,
                dn,
                UNWILLING_TO_PERFORM,
                "Server is unwilling to perform",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl DirectoryConnector for InMemoryDirectory {
    async fn connect(
        &self,
        credentials: &BindCredentials,
    ) -> DirectoryResult<Box<dyn DirectorySession>> {
        let session = MemorySession::open(self.clone());

        if !self.inner.bind_delay.is_zero() {
            tokio::time::sleep(self.inner.bind_delay).await;
        }
        let expected = &self.inner.credentials;
        if credentials.identity != expected.identity || credentials.credential != expected.credential {
            return Err(DirectoryError::bind(format!(
                "invalid credentials (result code {INVALID_CREDENTIALS})"
            )));
        }
        Ok(Box::new(session))
    }
}

struct MemorySession {
    directory: InMemoryDirectory,
    closed: bool,
}

impl MemorySession {
    fn open(directory: InMemoryDirectory) -> Self {
        let counters = &directory.inner.counters;
        counters.open.fetch_add(1, Ordering::SeqCst);
        counters.opened_total.fetch_add(1, Ordering::SeqCst);
        Self {
            directory,
            closed: false,
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.directory.inner.counters.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.close();
    }
}

#[async_trait]
impl DirectorySession for MemorySession {
    async fn search(&mut self, request: &SearchRequest) -> DirectoryResult<Vec<RawEntry>> {
        if !self.directory.inner.search_delay.is_zero() {
            tokio::time::sleep(self.directory.inner.search_delay).await;
        }
        let filter = FilterNode::parse(&request.filter).ok_or_else(|| {
            DirectoryError::operation(Operation::Search, &request.base_dn, "Bad search filter")
        })?;
        let base = dn_key(&request.base_dn);
        let entries = lock(&self.directory.inner.entries);
        let results = entries
            .iter()
            .filter(|(key, _)| in_scope(key, &base, request.scope))
            .filter(|(_, entry)| filter.matches(entry))
            .map(|(_, entry)| project(entry, &request.attributes))
            .collect();
        Ok(results)
    }

    async fn add(&mut self, dn: &str, attributes: &NewEntryAttributes) -> DirectoryResult<()> {
        self.directory.record(Operation::Add, dn);
        self.directory.check_writable(Operation::Add, dn)?;
        if self.directory.contains(dn) {
            return Err(DirectoryError::rejected(
                Operation::Add,
                dn,
                ALREADY_EXISTS,
                "Already exists",
            ));
        }
        self.directory.insert(dn, attributes.iter().cloned());
        Ok(())
    }

    async fn modify(&mut self, dn: &str, changes: &[AttributeChange]) -> DirectoryResult<()> {
        self.directory.record(Operation::Modify, dn);
        self.directory.check_writable(Operation::Modify, dn)?;
        let mut entries = lock(&self.directory.inner.entries);
        let entry = entries.get_mut(&dn_key(dn)).ok_or_else(|| {
            DirectoryError::rejected(Operation::Modify, dn, NO_SUCH_OBJECT, "No such object")
        })?;
        for change in changes {
            match change {
                AttributeChange::Replace { attribute, value } => {
                    entry.replace(attribute, vec![value.clone()]);
                }
                AttributeChange::Clear { attribute } => entry.replace(attribute, Vec::new()),
            }
        }
        Ok(())
    }

    async fn delete(&mut self, dn: &str) -> DirectoryResult<()> {
        self.directory.record(Operation::Delete, dn);
        lock(&self.directory.inner.entries)
            .remove(&dn_key(dn))
            .map(|_| ())
            .ok_or_else(|| {
                DirectoryError::rejected(Operation::Delete, dn, NO_SUCH_OBJECT, "No such object")
            })
    }

    async fn unbind(&mut self) -> DirectoryResult<()> {
        if !self.closed {
            self.directory.inner.counters.unbinds.fetch_add(1, Ordering::SeqCst);
        }
        self.close();
        Ok(())
    }

    fn abort(&mut self) {
        if !self.closed {
            self.directory.inner.counters.aborts.fetch_add(1, Ordering::SeqCst);
        }
        self.close();
    }
}

fn in_scope(key: &str, base: &str, scope: SearchScope) -> bool {
    if base.is_empty() {
        return true;
    }
    let Some(relative) = key.strip_suffix(base).and_then(|rest| rest.strip_suffix(',')) else {
        return key == base && scope == SearchScope::Subtree;
    };
    match scope {
        SearchScope::Subtree => true,
        SearchScope::SingleLevel => !relative.contains(','),
    }
}

fn project(entry: &StoredEntry, requested: &[String]) -> RawEntry {
    let pairs = entry
        .attributes
        .iter()
        .filter(|(name, _)| {
            requested.is_empty() || requested.iter().any(|r| r.eq_ignore_ascii_case(name))
        })
        .map(|(name, values)| AttributePair::new(name.clone(), values.clone()))
        .collect();
    RawEntry::new(entry.dn.clone(), RawAttributes::Pairs(pairs))
}

const MATCHING_RULE_BIT_AND: &str = "1.2.840.113556.1.4.803";
const MATCHING_RULE_BIT_OR: &str = "1.2.840.113556.1.4.804";

/// Parsed search filter.
///
/// Extensible matches support only the AD bitwise rules; any other rule
/// never matches. `~=` is treated as equality.
#[derive(Debug)]
enum FilterNode {
    And(Vec<FilterNode>),
    Or(Vec<FilterNode>),
    Not(Box<FilterNode>),
    Present(String),
    Equal(String, String),
    Substring(String, Vec<String>),
    GreaterOrEqual(String, String),
    LessOrEqual(String, String),
    Bitwise { attribute: String, mask: u64, all: bool },
    Never,
}

impl FilterNode {
    fn parse(filter: &str) -> Option<Self> {
        let chars: Vec<char> = filter.trim().chars().collect();
        let mut pos = 0;
        let node = Self::parse_node(&chars, &mut pos)?;
        (pos == chars.len()).then_some(node)
    }

    fn parse_node(chars: &[char], pos: &mut usize) -> Option<Self> {
        if chars.get(*pos) != Some(&'(') {
            return None;
        }
        *pos += 1;
        let node = match chars.get(*pos)? {
            '&' | '|' => {
                let op = chars[*pos];
                *pos += 1;
                let mut children = Vec::new();
                while chars.get(*pos) == Some(&'(') {
                    children.push(Self::parse_node(chars, pos)?);
                }
                if op == '&' {
                    FilterNode::And(children)
                } else {
                    FilterNode::Or(children)
                }
            }
            '!' => {
                *pos += 1;
                FilterNode::Not(Box::new(Self::parse_node(chars, pos)?))
            }
            _ => {
                let start = *pos;
                while chars.get(*pos).is_some_and(|c| *c != ')' && *c != '(') {
                    *pos += 1;
                }
                Self::parse_item(&chars[start..*pos].iter().collect::<String>())?
            }
        };
        if chars.get(*pos) != Some(&')') {
            return None;
        }
        *pos += 1;
        Some(node)
    }

    fn parse_item(item: &str) -> Option<Self> {
        let (attr, value) = item.split_once('=')?;
        if attr.is_empty() {
            return None;
        }
        if attr.contains(':') {
            return Some(Self::parse_extensible(attr, value));
        }
        if let Some(attr) = attr.strip_suffix('>') {
            return Some(FilterNode::GreaterOrEqual(attr.to_string(), unescape(value)?));
        }
        if let Some(attr) = attr.strip_suffix('<') {
            return Some(FilterNode::LessOrEqual(attr.to_string(), unescape(value)?));
        }
        let attr = attr.strip_suffix('~').unwrap_or(attr).to_string();
        if value == "*" {
            return Some(FilterNode::Present(attr));
        }
        if value.contains('*') {
            let parts = value.split('*').map(unescape).collect::<Option<Vec<_>>>()?;
            return Some(FilterNode::Substring(attr, parts));
        }
        Some(FilterNode::Equal(attr, unescape(value)?))
    }

    fn parse_extensible(attr: &str, value: &str) -> Self {
        let mut parts = attr.trim_end_matches(':').split(':');
        let attribute = parts.next().unwrap_or_default().to_string();
        let rule = parts.last().unwrap_or_default();
        match (rule, value.trim().parse::<u64>()) {
            (MATCHING_RULE_BIT_AND, Ok(mask)) => FilterNode::Bitwise {
                attribute,
                mask,
                all: true,
            },
            (MATCHING_RULE_BIT_OR, Ok(mask)) => FilterNode::Bitwise {
                attribute,
                mask,
                all: false,
            },
            _ => FilterNode::Never,
        }
    }

    fn matches(&self, entry: &StoredEntry) -> bool {
        let values = |attr: &str| -> Vec<String> {
            entry
                .values(attr)
                .map(|values| values.iter().map(|v| v.to_lowercase()).collect())
                .unwrap_or_default()
        };
        match self {
            FilterNode::And(children) => children.iter().all(|c| c.matches(entry)),
            FilterNode::Or(children) => children.iter().any(|c| c.matches(entry)),
            FilterNode::Not(child) => !child.matches(entry),
            FilterNode::Present(attr) => !values(attr).is_empty(),
            FilterNode::Never => false,
            FilterNode::GreaterOrEqual(attr, bound) => {
                let bound = bound.to_lowercase();
                values(attr).iter().any(|v| *v >= bound)
            }
            FilterNode::LessOrEqual(attr, bound) => {
                let bound = bound.to_lowercase();
                values(attr).iter().any(|v| *v <= bound)
            }
            FilterNode::Bitwise {
                attribute,
                mask,
                all,
            } => values(attribute).iter().any(|v| {
                v.parse::<u64>().is_ok_and(|flags| {
                    if *all {
                        flags & mask == *mask
                    } else {
                        flags & mask != 0
                    }
                })
            }),
            FilterNode::Equal(attr, expected) => {
                let expected = expected.to_lowercase();
                values(attr).iter().any(|v| *v == expected)
            }
            FilterNode::Substring(attr, parts) => {
                values(attr).iter().any(|v| substring_match(v, parts))
            }
        }
    }
}

fn substring_match(value: &str, parts: &[String]) -> bool {
    let parts: Vec<String> = parts.iter().map(|p| p.to_lowercase()).collect();
    let (Some(initial), Some(last)) = (parts.first(), parts.last()) else {
        return true;
    };
    let Some(mut rest) = value.strip_prefix(initial.as_str()) else {
        return false;
    };
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part.as_str()) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }
    rest.ends_with(last.as_str())
}

/// Decode RFC 4515 `\XX` escapes.
fn unescape(value: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            let hex: String = chars.by_ref().take(2).collect();
            bytes.push(u8::from_str_radix(&hex, 16).ok()?);
        } else {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
        }
    }
    String::from_utf8(bytes).ok()
}
