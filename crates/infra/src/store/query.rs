//! Incident query types: filters, pagination and summaries.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_auth::{IncidentStatus, IncidentType, SecurityIncident};
use warden_core::UserId;

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

/// Filter and page selection for incident listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncidentQuery {
    #[serde(rename = "type")]
    pub incident_type: Option<IncidentType>,
    pub status: Option<IncidentStatus>,
    pub user_id: Option<UserId>,
    /// Inclusive lower bound on `created_at`.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `created_at`.
    pub to: Option<DateTime<Utc>>,
    /// 1-based; 0 is treated as 1.
    pub page: u32,
    /// Defaults to 20, capped at 100.
    pub per_page: u32,
}

impl IncidentQuery {
    pub fn page(&self) -> u32 {
        self.page.max(1)
    }

    pub fn per_page(&self) -> u32 {
        match self.per_page {
            0 => DEFAULT_PER_PAGE,
            n => n.min(MAX_PER_PAGE),
        }
    }

    pub fn matches(&self, incident: &SecurityIncident) -> bool {
        self.incident_type.is_none_or(|t| incident.incident_type == t)
            && self.status.is_none_or(|s| incident.status == s)
            && self.user_id.is_none_or(|u| incident.user_id == Some(u))
            && self.from.is_none_or(|from| incident.created_at >= from)
            && self.to.is_none_or(|to| incident.created_at < to)
    }

    /// Apply filter, newest-first ordering and paging to `incidents`.
    pub fn paginate<'a, I>(&self, incidents: I) -> IncidentPage
    where
        I: IntoIterator<Item = &'a SecurityIncident>,
    {
        let mut matching: Vec<&SecurityIncident> = incidents.into_iter().filter(|i| self.matches(i)).collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let page = self.page();
        let per_page = self.per_page();
        let total = matching.len() as u64;
        let start = (u64::from(page - 1) * u64::from(per_page)).min(total) as usize;
        let items = matching
            .into_iter()
            .skip(start)
            .take(per_page as usize)
            .cloned()
            .collect();

        IncidentPage {
            items,
            total,
            page,
            per_page,
            total_pages: total.div_ceil(u64::from(per_page)),
        }
    }
}

/// One page of incidents, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncidentPage {
    pub items: Vec<SecurityIncident>,
    /// Matching incidents across all pages.
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u64,
}

/// Counts across the whole incident log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IncidentSummary {
    pub total: u64,
    pub by_type: BTreeMap<IncidentType, u64>,
    pub by_status: BTreeMap<IncidentStatus, u64>,
}

impl IncidentSummary {
    pub fn from_incidents<'a, I>(incidents: I) -> Self
    where
        I: IntoIterator<Item = &'a SecurityIncident>,
    {
        let mut summary = Self::default();
        for incident in incidents {
            summary.total += 1;
            *summary.by_type.entry(incident.incident_type).or_default() += 1;
            *summary.by_status.entry(incident.status).or_default() += 1;
        }
        summary
    }
}
