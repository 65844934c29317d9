use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const EARTH_RADIUS_KM: f64 = 6_371.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackedPosition {
    pub point: GeoPoint,
    pub updated_at: DateTime<Utc>,
}

/// Live-position set for one actor role. Entries older than the optional
/// TTL are invisible to queries but stay until overwritten or removed.
pub struct GeoIndex {
    positions: DashMap<Uuid, TrackedPosition>,
    ttl: Option<Duration>,
}

impl GeoIndex {
    pub fn new() -> Self {
        Self {
            positions: DashMap::new(),
            ttl: None,
        }
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            positions: DashMap::new(),
            ttl: Some(ttl),
        }
    }

    pub fn upsert(&self, id: Uuid, point: GeoPoint) {
        self.positions.insert(
            id,
            TrackedPosition {
                point,
                updated_at: Utc::now(),
            },
        );
    }

    pub fn remove(&self, id: &Uuid) {
        self.positions.remove(id);
    }

    pub fn position(&self, id: &Uuid) -> Option<TrackedPosition> {
        self.positions.get(id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    fn is_fresh(&self, position: &TrackedPosition, now: DateTime<Utc>) -> bool {
        match self.ttl {
            Some(ttl) => {
                let age = now.signed_duration_since(position.updated_at);
                age.to_std().map(|age| age <= ttl).unwrap_or(true)
            }
            None => true,
        }
    }

    pub fn nearest_within(&self, origin: &GeoPoint, radius_km: f64) -> Option<(Uuid, f64)> {
        self.nearest_k_within(origin, radius_km, 1).into_iter().next()
    }

    /// Up to `k` ids within `radius_km` of `origin`, nearest first.
    pub fn nearest_k_within(
        &self,
        origin: &GeoPoint,
        radius_km: f64,
        k: usize,
    ) -> Vec<(Uuid, f64)> {
        let now = Utc::now();
        let mut matches: Vec<(Uuid, f64)> = self
            .positions
            .iter()
            .filter(|entry| self.is_fresh(entry.value(), now))
            .filter_map(|entry| {
                let distance_km = haversine_km(origin, &entry.value().point);
                (distance_km <= radius_km).then_some((*entry.key(), distance_km))
            })
            .collect();

        matches.sort_by(|a, b| a.1.total_cmp(&b.1));
        matches.truncate(k);
        matches
    }
}

impl Default for GeoIndex {
    fn default() -> Self {
        Self::new()
    }
}
