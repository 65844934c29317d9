use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pharmacist {
    pub id: Uuid,
    pub name: String,
    pub active: bool,
    pub location: GeoPoint,
    pub updated_at: DateTime<Utc>,
}

/// Registry row; the live position feed is the agent geo index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub name: String,
    pub online: bool,
    pub location: GeoPoint,
    pub updated_at: DateTime<Utc>,
}
