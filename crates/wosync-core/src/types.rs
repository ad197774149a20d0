//! Shared types used across wosync.
//!
//! This module defines the work items routed to scrape workers, the results
//! they produce, and the identity used to log into the portal.

use crate::error::WosyncError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;
use zeroize::Zeroizing;

/// Field name to extracted value. A `None` value marks a field whose locator
/// missed on the results page.
pub type FieldMap = BTreeMap<String, Option<String>>;

const REQUEST_FIELDS: &[&str] = &[
    "room",
    "status",
    "building",
    "tag",
    "accept_date",
    "reject_date",
    "reject_reason",
    "location",
    "item_description",
    "work_order_num",
    "area_description",
    "requested_action",
];

const ORDER_FIELDS: &[&str] = &[
    "facility",
    "building",
    "location_id",
    "priority",
    "request_date",
    "schedule_date",
    "work_status",
    "date_closed",
    "main_charge_account",
    "task_code",
    "reference_number",
    "tag_number",
    "item_description",
    "request_time",
    "date_last_posted",
    "trade",
    "contractor_name",
    "est_completion_date",
    "task_description",
    "requested_action",
    "corrective_action",
];

/// The two record kinds retrievable from the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Work order request, identified by a plain number
    Request,
    /// Work order, identified by an alphanumeric prefix plus a number
    Order,
}

impl ItemKind {
    /// Value of the portal's search-category dropdown for this kind.
    #[must_use]
    pub fn category_code(self) -> &'static str {
        match self {
            Self::Request => "WR",
            Self::Order => "WO",
        }
    }

    /// The fixed set of fields extracted for this kind, in page order.
    #[must_use]
    pub fn field_names(self) -> &'static [&'static str] {
        match self {
            Self::Request => REQUEST_FIELDS,
            Self::Order => ORDER_FIELDS,
        }
    }

    /// Lowercase name used in logs and on the command line.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Order => "order",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single record to scrape. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    number: u64,
    kind: ItemKind,
    prefix: String,
}

impl WorkItem {
    /// A work order request with the given id.
    #[must_use]
    pub fn request(number: u64) -> Self {
        Self {
            number,
            kind: ItemKind::Request,
            prefix: String::new(),
        }
    }

    /// A work order rendered as `prefix + number`.
    #[must_use]
    pub fn order(prefix: impl Into<String>, number: u64) -> Self {
        Self {
            number,
            kind: ItemKind::Order,
            prefix: prefix.into(),
        }
    }

    /// Numeric part of the identifier, used for partitioning.
    #[must_use]
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Record kind.
    #[must_use]
    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    /// Order prefix (empty for requests).
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Identifier as submitted to the portal search box and stored as the key.
    #[must_use]
    pub fn key(&self) -> String {
        match self.kind {
            ItemKind::Request => self.number.to_string(),
            ItemKind::Order => format!("{}{}", self.prefix, self.number),
        }
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.key())
    }
}

/// Validate a work order prefix: ASCII letters, digits, and hyphens only.
///
/// # Errors
/// Returns `WosyncError::Validation` for any other character.
pub fn validate_order_prefix(prefix: &str) -> Result<(), WosyncError> {
    static PREFIX_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex =
        PREFIX_REGEX.get_or_init(|| Regex::new(r"^[A-Za-z0-9-]{0,16}$").expect("valid regex"));

    if regex.is_match(prefix) {
        Ok(())
    } else {
        Err(WosyncError::Validation(format!(
            "invalid order prefix '{prefix}': expected up to 16 letters, digits or hyphens"
        )))
    }
}

/// Outcome of scraping one work item.
///
/// A result is produced for every item, including ones that could not be
/// located: those carry `found == false` and a null value for every field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeResult {
    /// Rendered item identifier (`WorkItem::key`)
    pub item_id: String,
    /// Record kind
    pub kind: ItemKind,
    /// Every field of the kind, `None` where extraction missed
    pub fields: FieldMap,
    /// False for a placeholder standing in for an item that was not found
    pub found: bool,
}

impl ScrapeResult {
    /// Build a result for a located item. Fields of the kind that are absent
    /// from `extracted` are recorded as null; unknown names are dropped.
    #[must_use]
    pub fn found(item: &WorkItem, mut extracted: FieldMap) -> Self {
        let fields = item
            .kind()
            .field_names()
            .iter()
            .map(|name| ((*name).to_string(), extracted.remove(*name).flatten()))
            .collect();

        Self {
            item_id: item.key(),
            kind: item.kind(),
            fields,
            found: true,
        }
    }

    /// Empty placeholder for an item that could not be located.
    #[must_use]
    pub fn placeholder(item: &WorkItem) -> Self {
        Self {
            item_id: item.key(),
            kind: item.kind(),
            fields: item
                .kind()
                .field_names()
                .iter()
                .map(|name| ((*name).to_string(), None))
                .collect(),
            found: false,
        }
    }

    /// Value of a field, if it was extracted.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_deref())
    }
}

/// One-way hash of a portal username, used to namespace on-disk profiles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityHash(String);

impl IdentityHash {
    /// Hash a username with SHA-256 and hex-encode it.
    #[must_use]
    pub fn of(username: &str) -> Self {
        let digest = Sha256::digest(username.as_bytes());
        Self(hex::encode(digest))
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Portal credentials, supplied once per run and shared read-only by every
/// worker. The secret is zeroized on drop and never printed.
#[derive(Clone, Serialize, Deserialize)]
pub struct Identity {
    username: String,
    secret: Zeroizing<String>,
    secret_hidden: bool,
}

impl Identity {
    /// Create an identity.
    #[must_use]
    pub fn new(username: impl Into<String>, secret: impl Into<String>, secret_hidden: bool) -> Self {
        Self {
            username: username.into(),
            secret: Zeroizing::new(secret.into()),
            secret_hidden,
        }
    }

    /// Portal username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Portal password.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Whether the secret was entered with hidden input.
    #[must_use]
    pub fn secret_hidden(&self) -> bool {
        self.secret_hidden
    }

    /// Profile namespace for this identity.
    #[must_use]
    pub fn hash(&self) -> IdentityHash {
        IdentityHash::of(&self.username)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("secret_hidden", &self.secret_hidden)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_item_keys() {
        assert_eq!(WorkItem::request(101).key(), "101");
        assert_eq!(WorkItem::order("WO", 5).key(), "WO5");
        assert_eq!(WorkItem::order("", 7).key(), "7");
        assert_eq!(WorkItem::order("HM", 12).to_string(), "order HM12");
    }

    #[test]
    fn test_category_codes() {
        assert_eq!(ItemKind::Request.category_code(), "WR");
        assert_eq!(ItemKind::Order.category_code(), "WO");
    }

    #[test]
    fn test_validate_order_prefix() {
        assert!(validate_order_prefix("WO").is_ok());
        assert!(validate_order_prefix("").is_ok());
        assert!(validate_order_prefix("HM-2").is_ok());
        assert!(validate_order_prefix("WO'; drop").is_err());
        assert!(validate_order_prefix("ABCDEFGHIJKLMNOPQ").is_err());
    }

    #[test]
    fn test_placeholder_has_every_field_null() {
        let item = WorkItem::request(9);
        let result = ScrapeResult::placeholder(&item);

        assert!(!result.found);
        assert_eq!(result.item_id, "9");
        assert_eq!(result.fields.len(), ItemKind::Request.field_names().len());
        assert!(result.fields.values().all(Option::is_none));
    }

    #[test]
    fn test_found_result_fills_missing_fields() {
        let item = WorkItem::order("WO", 3);
        let mut extracted = FieldMap::new();
        extracted.insert("facility".to_string(), Some("Unit 1".to_string()));
        extracted.insert("priority".to_string(), None);
        extracted.insert("not_a_field".to_string(), Some("x".to_string()));

        let result = ScrapeResult::found(&item, extracted);

        assert!(result.found);
        assert_eq!(result.field("facility"), Some("Unit 1"));
        assert_eq!(result.field("priority"), None);
        assert!(result.fields.contains_key("corrective_action"));
        assert!(!result.fields.contains_key("not_a_field"));
        assert_eq!(result.fields.len(), ItemKind::Order.field_names().len());
    }

    #[test]
    fn test_identity_hash_is_stable_and_ignores_secret() {
        let a = Identity::new("oski", "first", true);
        let b = Identity::new("oski", "second", false);

        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.hash().as_str().len(), 64);
        assert!(!a.hash().as_str().contains("oski"));
        assert_ne!(a.hash(), IdentityHash::of("other"));
    }

    #[test]
    fn test_identity_debug_redacts_secret() {
        let identity = Identity::new("oski", "hunter2", true);
        let debug = format!("{identity:?}");
        assert!(debug.contains("oski"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_work_item_serde() {
        let item = WorkItem::order("WO", 77);
        let json = serde_json::to_string(&item).expect("serialize item");
        let parsed: WorkItem = serde_json::from_str(&json).expect("parse item");
        assert_eq!(parsed, item);
        assert!(json.contains("\"order\""));
    }
}
