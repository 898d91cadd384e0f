//! Tiered code-to-label resolution.
//!
//! Strategies run in a fixed order and the first one that answers wins:
//!
//! 1. [`Tier::ById`]: the numeric id against the cached list.
//! 2. [`Tier::ByCode`]: the fallback code against the cached list.
//! 3. [`Tier::StaticTable`]: built-in well-known codes, only when the cache
//!    holds nothing for the scope.
//! 4. [`Tier::TitleCase`]: the raw code with its first letter capitalised.
//!
//! Resolution never fails. With neither an id hit nor a code, the label is
//! `"Unknown"`.

use serde::Serialize;

use crate::item::{TYPE_ROLE, TYPE_STATUS};
use crate::{ReferenceDataCache, ReferenceItem};

pub const DEFAULT_COLOR_CLASS: &str = "bg-gray-100 text-gray-800";
const UNKNOWN_LABEL: &str = "Unknown";

/// Which strategy produced a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    ById,
    ByCode,
    StaticTable,
    TitleCase,
    Unknown,
}

/// What to resolve.
#[derive(Debug, Clone, Copy)]
pub struct ResolveRequest<'a> {
    pub item_type: &'a str,
    pub module: &'a str,
    pub id: Option<i64>,
    pub code: Option<&'a str>,
}

impl<'a> ResolveRequest<'a> {
    pub fn new(item_type: &'a str, module: &'a str) -> Self {
        Self {
            item_type,
            module,
            id: None,
            code: None,
        }
    }

    pub fn id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn code(mut self, code: &'a str) -> Self {
        self.code = Some(code).filter(|c| !c.trim().is_empty());
        self
    }
}

/// Label plus render descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedLabel {
    pub display_name: String,
    pub color_class: String,
    pub icon: String,
    pub tier: Tier,
}

type Strategy = fn(&ReferenceDataCache, &ResolveRequest<'_>) -> Option<ResolvedLabel>;

const STRATEGIES: &[Strategy] = &[by_id, by_code, static_table, title_case];

/// Resolve a stored code into display metadata.
pub fn resolve(cache: &ReferenceDataCache, request: &ResolveRequest<'_>) -> ResolvedLabel {
    STRATEGIES
        .iter()
        .find_map(|strategy| strategy(cache, request))
        .unwrap_or_else(|| ResolvedLabel {
            display_name: UNKNOWN_LABEL.to_string(),
            color_class: DEFAULT_COLOR_CLASS.to_string(),
            icon: default_icon(request.item_type).to_string(),
            tier: Tier::Unknown,
        })
}

fn default_icon(item_type: &str) -> &'static str {
    match item_type {
        TYPE_ROLE => "User",
        TYPE_STATUS => "XCircle",
        _ => "Tag",
    }
}

fn from_item(item: ReferenceItem, tier: Tier) -> ResolvedLabel {
    let icon = item
        .icon_name
        .unwrap_or_else(|| default_icon(&item.item_type).to_string());
    ResolvedLabel {
        display_name: item.display_name,
        color_class: item
            .color_code
            .unwrap_or_else(|| DEFAULT_COLOR_CLASS.to_string()),
        icon,
        tier,
    }
}

fn by_id(cache: &ReferenceDataCache, req: &ResolveRequest<'_>) -> Option<ResolvedLabel> {
    let item = cache.get_item_by_id(req.item_type, req.id?, req.module)?;
    Some(from_item(item, Tier::ById))
}

fn by_code(cache: &ReferenceDataCache, req: &ResolveRequest<'_>) -> Option<ResolvedLabel> {
    let item = cache.get_item_by_code(req.item_type, req.code?, req.module)?;
    Some(from_item(item, Tier::ByCode))
}

/// `(code, display name, color class, icon)`.
type StaticEntry = (&'static str, &'static str, &'static str, &'static str);

const STATIC_ROLES: &[StaticEntry] = &[
    ("admin", "Admin", "bg-blue-100 text-blue-800", "Shield"),
    ("user", "User", "bg-green-100 text-green-800", "User"),
    ("operator", "Operator", "bg-purple-100 text-purple-800", "UserCog"),
    ("viewer", "Viewer", "bg-gray-100 text-gray-800", "CircleUser"),
];

const STATIC_STATUSES: &[StaticEntry] = &[
    ("active", "Active", "bg-green-100 text-green-800", "CheckCircle"),
    ("inactive", "Inactive", "bg-gray-100 text-gray-800", "XCircle"),
    ("suspended", "Suspended", "bg-amber-100 text-amber-800", "UserCheck"),
];

fn static_table(cache: &ReferenceDataCache, req: &ResolveRequest<'_>) -> Option<ResolvedLabel> {
    if !cache.is_scope_empty(req.item_type, req.module) {
        return None;
    }
    let table = match req.item_type {
        TYPE_ROLE => STATIC_ROLES,
        TYPE_STATUS => STATIC_STATUSES,
        _ => return None,
    };
    let code = req.code?.trim().to_ascii_lowercase();
    let (_, name, color, icon) = table.iter().find(|(c, ..)| *c == code)?;
    tracing::debug!(item_type = req.item_type, code = %code, "reference cache empty; using built-in label");
    Some(ResolvedLabel {
        display_name: (*name).to_string(),
        color_class: (*color).to_string(),
        icon: (*icon).to_string(),
        tier: Tier::StaticTable,
    })
}

fn title_case(_: &ReferenceDataCache, req: &ResolveRequest<'_>) -> Option<ResolvedLabel> {
    let code = req.code?.trim();
    let mut chars = code.chars();
    let first = chars.next()?;
    Some(ResolvedLabel {
        display_name: first.to_uppercase().chain(chars).collect(),
        color_class: DEFAULT_COLOR_CLASS.to_string(),
        icon: default_icon(req.item_type).to_string(),
        tier: Tier::TitleCase,
    })
}
