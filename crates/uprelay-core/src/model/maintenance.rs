// ── Maintenance window domain type ──

use serde::Serialize;

use super::{Entity, EntityId};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Maintenance {
    pub id: EntityId,
    pub title: String,
    pub description: Option<String>,
    /// `manual`, `single`, `cron`, ...
    pub strategy: String,
    pub active: bool,
    /// `scheduled`, `under-maintenance`, `ended`, ... as reported upstream.
    pub status: Option<String>,
}

impl Entity for Maintenance {
    fn entity_id(&self) -> &EntityId {
        &self.id
    }
}
