use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::config::Config;
use crate::geo::{GeoPoint, haversine_km};
use crate::models::order::Order;
use crate::state::AppState;

/// Failure of an out-of-process collaborator. Always converted to a
/// fallback at the call boundary, never propagated to an order operation.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{service} unavailable: {detail}")]
    Unavailable {
        service: &'static str,
        detail: String,
    },
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<GeoPoint, ServiceError>;
}

#[async_trait]
pub trait EtaService: Send + Sync {
    async fn eta_minutes(&self, origin: &GeoPoint, dest: &GeoPoint) -> Result<u32, ServiceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentVerdict {
    Approved,
    Rejected,
}

/// Advisory only: the order state machine decides what a verdict means.
#[async_trait]
pub trait PaymentVerifier: Send + Sync {
    async fn verify(&self, order_ref: &str, payment_ref: &str, signature: &str) -> PaymentVerdict;
}

#[async_trait]
pub trait WeatherService: Send + Sync {
    async fn is_raining(&self, city: &str) -> Result<bool, ServiceError>;
}

#[async_trait]
pub trait InvoiceRenderer: Send + Sync {
    async fn render(&self, order: &Order) -> Result<String, ServiceError>;
}

pub struct ExternalServices {
    pub geocoder: Arc<dyn Geocoder>,
    pub eta: Arc<dyn EtaService>,
    pub payments: Arc<dyn PaymentVerifier>,
    pub weather: Arc<dyn WeatherService>,
    pub invoices: Arc<dyn InvoiceRenderer>,
}

impl ExternalServices {
    /// Deterministic local wiring for when no real gateway, maps, or
    /// weather credentials exist.
    pub fn local_stack(config: &Config) -> Self {
        Self {
            geocoder: Arc::new(StaticGeocoder {
                point: config.geocode_fallback(),
            }),
            eta: Arc::new(HeuristicEta { speed_kmh: 25.0 }),
            payments: Arc::new(MockPaymentVerifier {
                secret: config.payment_secret.clone(),
            }),
            weather: Arc::new(DryWeather),
            invoices: Arc::new(StubInvoiceRenderer),
        }
    }
}

pub async fn geocode_or_fallback(state: &AppState, address: &str) -> GeoPoint {
    match state.services.geocoder.geocode(address).await {
        Ok(point) => point,
        Err(err) => {
            state
                .metrics
                .external_fallbacks_total
                .with_label_values(&["geocoder"])
                .inc();
            warn!(error = %err, "geocoder failed, using fallback center");
            state.config.geocode_fallback()
        }
    }
}

pub async fn eta_or_default(state: &AppState, origin: &GeoPoint, dest: &GeoPoint) -> u32 {
    match state.services.eta.eta_minutes(origin, dest).await {
        Ok(minutes) => minutes.max(1),
        Err(err) => {
            state
                .metrics
                .external_fallbacks_total
                .with_label_values(&["eta"])
                .inc();
            warn!(error = %err, "eta service failed, using default eta");
            state.config.default_eta_minutes
        }
    }
}

pub struct StaticGeocoder {
    pub point: GeoPoint,
}

#[async_trait]
impl Geocoder for StaticGeocoder {
    async fn geocode(&self, _address: &str) -> Result<GeoPoint, ServiceError> {
        Ok(self.point.clone())
    }
}

pub struct HeuristicEta {
    pub speed_kmh: f64,
}

#[async_trait]
impl EtaService for HeuristicEta {
    async fn eta_minutes(&self, origin: &GeoPoint, dest: &GeoPoint) -> Result<u32, ServiceError> {
        let distance_km = haversine_km(origin, dest);
        let minutes = (distance_km / self.speed_kmh * 60.0).round() as u32;
        Ok(minutes.max(1))
    }
}

pub struct MockPaymentVerifier {
    pub secret: String,
}

impl MockPaymentVerifier {
    /// Deterministic stand-in for a gateway HMAC.
    pub fn signature_for(order_ref: &str, payment_ref: &str, secret: &str) -> String {
        let mut hasher = DefaultHasher::new();
        (order_ref, payment_ref, secret).hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }
}

#[async_trait]
impl PaymentVerifier for MockPaymentVerifier {
    async fn verify(&self, order_ref: &str, payment_ref: &str, signature: &str) -> PaymentVerdict {
        if signature == Self::signature_for(order_ref, payment_ref, &self.secret) {
            PaymentVerdict::Approved
        } else {
            PaymentVerdict::Rejected
        }
    }
}

pub struct DryWeather;

#[async_trait]
impl WeatherService for DryWeather {
    async fn is_raining(&self, _city: &str) -> Result<bool, ServiceError> {
        Ok(false)
    }
}

pub struct StubInvoiceRenderer;

#[async_trait]
impl InvoiceRenderer for StubInvoiceRenderer {
    async fn render(&self, order: &Order) -> Result<String, ServiceError> {
        Ok(format!("invoice://{}", order.order_number))
    }
}
