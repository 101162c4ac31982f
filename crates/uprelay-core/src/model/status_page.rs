// ── Status page and incident domain types ──

use serde::Serialize;

use super::{Entity, EntityId};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPage {
    pub id: EntityId,
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub theme: Option<String>,
    pub published: bool,
    pub domain_names: Vec<String>,
}

impl Entity for StatusPage {
    fn entity_id(&self) -> &EntityId {
        &self.id
    }
}

/// An incident pinned to a status page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: EntityId,
    pub title: String,
    pub content: Option<String>,
    pub style: String,
    pub pinned: bool,
    pub status_page_id: Option<EntityId>,
}

impl Entity for Incident {
    fn entity_id(&self) -> &EntityId {
        &self.id
    }
}
