//! Catalog and subscription entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::data::errors::HexiesError;
use crate::data::identifiers::{ItemId, UserId};

/// Fixed set of catalog categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Methods,
    Teams,
    Product,
    Leadership,
    AntiPatterns,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Methods,
        Category::Teams,
        Category::Product,
        Category::Leadership,
        Category::AntiPatterns,
    ];

    /// Wire identifier, as used by the backend's `category` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Methods => "methods",
            Category::Teams => "teams",
            Category::Product => "product",
            Category::Leadership => "leadership",
            Category::AntiPatterns => "anti-patterns",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Methods => "Methods",
            Category::Teams => "Teams",
            Category::Product => "Product",
            Category::Leadership => "Leadership",
            Category::AntiPatterns => "Anti-patterns",
        }
    }

    /// Fill colour used for the front face of widgets in this category.
    pub fn color(&self) -> &'static str {
        match self {
            Category::Methods => "#4285f4",
            Category::Teams => "#34a853",
            Category::Product => "#fbbc04",
            Category::Leadership => "#ea4335",
            Category::AntiPatterns => "#9c27b0",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Category::Methods => "🔧",
            Category::Teams => "👥",
            Category::Product => "📦",
            Category::Leadership => "👑",
            Category::AntiPatterns => "⚠️",
        }
    }

    pub fn parse(value: &str) -> Option<Category> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(value.trim()))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category filter applied to the catalog: exact match or everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl CategoryFilter {
    pub fn matches(&self, category: Category) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(c) => *c == category,
        }
    }

    pub fn category(&self) -> Option<Category> {
        match self {
            CategoryFilter::All => None,
            CategoryFilter::Only(c) => Some(*c),
        }
    }
}

impl From<Option<Category>> for CategoryFilter {
    fn from(value: Option<Category>) -> Self {
        value.map(CategoryFilter::Only).unwrap_or_default()
    }
}

/// A reusable content card the user can browse or place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: ItemId,
    pub title: String,
    pub category: Category,
    #[serde(default)]
    pub icon: String,
    pub summary: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default, alias = "reference_url")]
    pub reference: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(alias = "free")]
    pub is_free: bool,
    #[serde(default)]
    pub is_user_created: bool,
    #[serde(default, alias = "user_id")]
    pub owner_id: Option<UserId>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl CatalogItem {
    /// Checks the ownership invariant: user-created items always carry an owner.
    pub fn validate(&self) -> Result<(), HexiesError> {
        if self.is_user_created && self.owner_id.is_none() {
            return Err(HexiesError::InvalidItem(format!(
                "user-created item {} has no owner",
                self.id
            )));
        }
        Ok(())
    }

    pub fn is_owned_by(&self, user: Option<&UserId>) -> bool {
        match (self.owner_id.as_ref(), user) {
            (Some(owner), Some(user)) => owner == user,
            _ => false,
        }
    }

    /// Case-insensitive match against title, summary, details and tags.
    /// `needle` must already be lowercase.
    pub fn matches_search(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        self.title.to_lowercase().contains(needle)
            || self.summary.to_lowercase().contains(needle)
            || self
                .details
                .as_deref()
                .map(|d| d.to_lowercase().contains(needle))
                .unwrap_or(false)
            || self.tags.iter().any(|t| t.to_lowercase().contains(needle))
    }

    /// Builds the locally held, not yet persisted version of a user item.
    pub fn provisional(draft: &CatalogDraft, owner: UserId) -> Self {
        Self {
            id: ItemId::provisional(),
            title: draft.title.clone(),
            category: draft.category,
            icon: draft.icon.clone(),
            summary: draft.summary.clone(),
            details: draft.details.clone(),
            reference: draft.reference.clone(),
            tags: draft.tags.clone(),
            is_free: false,
            is_user_created: true,
            owner_id: Some(owner),
            created_at: Utc::now(),
        }
    }
}

pub const MAX_TITLE_LEN: usize = 100;
pub const MAX_SUMMARY_LEN: usize = 200;
pub const MAX_ICON_LEN: usize = 10;

/// User input for a new catalog item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogDraft {
    pub title: String,
    pub category: Category,
    #[serde(default)]
    pub icon: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CatalogDraft {
    pub fn new(title: impl Into<String>, category: Category, summary: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            category,
            icon: category.icon().to_string(),
            summary: summary.into(),
            details: None,
            reference: None,
            tags: Vec::new(),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Trims fields, drops blank and duplicate tags and checks length limits.
    pub fn normalized(mut self) -> Result<Self, HexiesError> {
        self.title = self.title.trim().to_string();
        self.summary = self.summary.trim().to_string();
        self.icon = self.icon.trim().to_string();
        self.details = self.details.map(|d| d.trim().to_string()).filter(|d| !d.is_empty());
        self.reference = self.reference.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());

        let mut tags: Vec<String> = Vec::with_capacity(self.tags.len());
        for tag in self.tags.drain(..) {
            let tag = tag.trim().to_string();
            if !tag.is_empty() && !tags.iter().any(|t| t.eq_ignore_ascii_case(&tag)) {
                tags.push(tag);
            }
        }
        self.tags = tags;

        if self.title.is_empty() || self.title.chars().count() > MAX_TITLE_LEN {
            return Err(HexiesError::InvalidDraft(format!(
                "title must be 1 to {} characters",
                MAX_TITLE_LEN
            )));
        }
        if self.summary.is_empty() || self.summary.chars().count() > MAX_SUMMARY_LEN {
            return Err(HexiesError::InvalidDraft(format!(
                "summary must be 1 to {} characters",
                MAX_SUMMARY_LEN
            )));
        }
        if self.icon.chars().count() > MAX_ICON_LEN {
            return Err(HexiesError::InvalidDraft(format!(
                "icon must be at most {} characters",
                MAX_ICON_LEN
            )));
        }
        if self.icon.is_empty() {
            self.icon = self.category.icon().to_string();
        }
        Ok(self)
    }
}

/// Subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanId {
    Free,
    #[serde(alias = "premium")]
    Pro,
    Lifetime,
    Enterprise,
    #[serde(other)]
    Unknown,
}

impl PlanId {
    pub fn parse(value: &str) -> PlanId {
        match value.trim().to_ascii_lowercase().as_str() {
            "free" => PlanId::Free,
            "pro" | "premium" => PlanId::Pro,
            "lifetime" => PlanId::Lifetime,
            "enterprise" => PlanId::Enterprise,
            _ => PlanId::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Canceled,
}

/// Subscription state of the current user as reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub plan_id: PlanId,
    pub status: SubscriptionStatus,
    #[serde(default, alias = "hexie_count")]
    pub user_item_count: u32,
    /// -1 means unlimited.
    #[serde(default = "default_item_limit", alias = "hexie_limit")]
    pub user_item_limit: i64,
}

fn default_item_limit() -> i64 {
    -1
}

impl SubscriptionRecord {
    pub const UNLIMITED: i64 = -1;

    /// The synthetic record used in fallback mode.
    pub fn free_tier(limit: i64) -> Self {
        Self {
            plan_id: PlanId::Free,
            status: SubscriptionStatus::Active,
            user_item_count: 0,
            user_item_limit: limit,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }

    pub fn is_unlimited(&self) -> bool {
        self.user_item_limit == Self::UNLIMITED
    }
}

/// Plan-gated features beyond catalog access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    PremiumItems,
    UnlimitedCustom,
    Export,
    Analytics,
    TeamManagement,
}

impl Feature {
    pub fn plans(&self) -> &'static [PlanId] {
        match self {
            Feature::PremiumItems | Feature::UnlimitedCustom | Feature::Export => {
                &[PlanId::Pro, PlanId::Lifetime, PlanId::Enterprise]
            }
            Feature::Analytics | Feature::TeamManagement => &[PlanId::Enterprise],
        }
    }
}

/// Profile of the authenticated backend user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_item_accepts_backend_field_names() {
        let item: CatalogItem = serde_json::from_value(json!({
            "id": "u-1",
            "title": "Pairing",
            "category": "anti-patterns",
            "summary": "Two people, one keyboard",
            "free": false,
            "is_user_created": true,
            "user_id": "user-9",
            "reference_url": "https://example.com"
        }))
        .unwrap();

        assert_eq!(item.category, Category::AntiPatterns);
        assert_eq!(item.owner_id, Some(UserId::new("user-9")));
        assert_eq!(item.reference.as_deref(), Some("https://example.com"));
        assert!(item.validate().is_ok());
    }

    #[test]
    fn test_user_item_without_owner_is_invalid() {
        let mut item = crate::defaults::default_catalog().remove(0);
        item.is_user_created = true;
        item.owner_id = None;
        assert!(matches!(item.validate(), Err(HexiesError::InvalidItem(_))));
    }

    #[test]
    fn test_search_matches_every_text_field() {
        let item = CatalogItem {
            id: ItemId::new("x"),
            title: "Retrospective".into(),
            category: Category::Methods,
            icon: "🔍".into(),
            summary: "Reflect and improve".into(),
            details: Some("A collaborative SESSION".into()),
            reference: None,
            tags: vec!["Agile".into()],
            is_free: true,
            is_user_created: false,
            owner_id: None,
            created_at: Utc::now(),
        };
        assert!(item.matches_search("retro"));
        assert!(item.matches_search("improve"));
        assert!(item.matches_search("session"));
        assert!(item.matches_search("agile"));
        assert!(!item.matches_search("kanban"));
    }

    #[test]
    fn test_draft_normalization() {
        let draft = CatalogDraft::new("  Mob review ", Category::Teams, "Review as a group ")
            .with_tags(["review", " Review ", "", "team"])
            .normalized()
            .unwrap();
        assert_eq!(draft.title, "Mob review");
        assert_eq!(draft.tags, vec!["review".to_string(), "team".to_string()]);

        let err = CatalogDraft::new("", Category::Teams, "x").normalized().unwrap_err();
        assert!(matches!(err, HexiesError::InvalidDraft(_)));
    }

    #[test]
    fn test_unknown_plan_deserializes() {
        let record: SubscriptionRecord = serde_json::from_value(json!({
            "plan_id": "platinum",
            "status": "active",
            "hexie_count": 2
        }))
        .unwrap();
        assert_eq!(record.plan_id, PlanId::Unknown);
        assert_eq!(record.user_item_count, 2);
        assert!(record.is_unlimited());
    }

    #[test]
    fn test_category_parse_is_case_insensitive() {
        assert_eq!(Category::parse("Anti-Patterns"), Some(Category::AntiPatterns));
        assert_eq!(Category::parse("misc"), None);
    }
}
