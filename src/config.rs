use std::env;
use std::time::Duration;

use crate::error::AppError;
use crate::geo::GeoPoint;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub notice_queue_size: usize,
    pub event_buffer_size: usize,

    pub free_delivery_min: f64,
    pub delivery_fee: f64,
    pub handling_fee: f64,

    pub surge_city: String,
    pub surge_recompute_secs: u64,

    pub pharmacist_radius_km: f64,
    pub pharmacist_fanout: usize,
    pub agent_radius_km: f64,
    pub agent_location_ttl_secs: u64,
    pub location_throttle_secs: u64,

    pub default_eta_minutes: u32,
    pub otp_ttl_secs: u64,
    pub otp_sweep_secs: u64,

    pub refund_settle_delay_secs: u64,
    pub settlement_poll_secs: u64,

    pub payment_secret: String,
    pub geocode_fallback_lat: f64,
    pub geocode_fallback_lng: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            notice_queue_size: 1024,
            event_buffer_size: 256,

            free_delivery_min: 99.0,
            delivery_fee: 30.0,
            handling_fee: 10.0,

            surge_city: "Hyderabad".to_string(),
            surge_recompute_secs: 300,

            pharmacist_radius_km: 5.0,
            pharmacist_fanout: 5,
            agent_radius_km: 10.0,
            agent_location_ttl_secs: 180,
            location_throttle_secs: 5,

            default_eta_minutes: 30,
            otp_ttl_secs: 300,
            otp_sweep_secs: 60,

            refund_settle_delay_secs: 86_400,
            settlement_poll_secs: 30,

            payment_secret: "dev-secret".to_string(),
            // Where unparseable addresses land.
            geocode_fallback_lat: 20.5937,
            geocode_fallback_lng: 78.9629,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let base = Config::default();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", base.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(base.log_level),
            notice_queue_size: parse_or_default("NOTICE_QUEUE_SIZE", base.notice_queue_size)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", base.event_buffer_size)?,

            free_delivery_min: parse_or_default("FREE_DELIVERY_MIN", base.free_delivery_min)?,
            delivery_fee: parse_or_default("DELIVERY_FEE", base.delivery_fee)?,
            handling_fee: parse_or_default("HANDLING_FEE", base.handling_fee)?,

            surge_city: env::var("SURGE_CITY").unwrap_or(base.surge_city),
            surge_recompute_secs: parse_or_default(
                "SURGE_RECOMPUTE_SECS",
                base.surge_recompute_secs,
            )?,

            pharmacist_radius_km: parse_or_default(
                "PHARMACIST_RADIUS_KM",
                base.pharmacist_radius_km,
            )?,
            pharmacist_fanout: parse_or_default("PHARMACIST_FANOUT", base.pharmacist_fanout)?,
            agent_radius_km: parse_or_default("AGENT_RADIUS_KM", base.agent_radius_km)?,
            agent_location_ttl_secs: parse_or_default(
                "AGENT_LOCATION_TTL_SECS",
                base.agent_location_ttl_secs,
            )?,
            location_throttle_secs: parse_or_default(
                "LOCATION_THROTTLE_SECS",
                base.location_throttle_secs,
            )?,

            default_eta_minutes: parse_or_default("DEFAULT_ETA_MINUTES", base.default_eta_minutes)?,
            otp_ttl_secs: parse_or_default("OTP_TTL_SECS", base.otp_ttl_secs)?,
            otp_sweep_secs: parse_or_default("OTP_SWEEP_SECS", base.otp_sweep_secs)?,

            refund_settle_delay_secs: parse_or_default(
                "REFUND_SETTLE_DELAY_SECS",
                base.refund_settle_delay_secs,
            )?,
            settlement_poll_secs: parse_or_default(
                "SETTLEMENT_POLL_SECS",
                base.settlement_poll_secs,
            )?,

            payment_secret: env::var("PAYMENT_SECRET").unwrap_or(base.payment_secret),
            geocode_fallback_lat: parse_or_default(
                "GEOCODE_FALLBACK_LAT",
                base.geocode_fallback_lat,
            )?,
            geocode_fallback_lng: parse_or_default(
                "GEOCODE_FALLBACK_LNG",
                base.geocode_fallback_lng,
            )?,
        })
    }

    pub fn geocode_fallback(&self) -> GeoPoint {
        GeoPoint {
            lat: self.geocode_fallback_lat,
            lng: self.geocode_fallback_lng,
        }
    }

    pub fn otp_ttl(&self) -> Duration {
        Duration::from_secs(self.otp_ttl_secs)
    }

    pub fn refund_settle_delay(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.refund_settle_delay_secs as i64)
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
