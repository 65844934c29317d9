use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveTime};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::external::WeatherService;
use crate::state::AppState;

pub const RAIN_SURGE_AMOUNT: f64 = 20.0;

/// Snapshot read at checkout; orders freeze the amount they saw.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurgeQuote {
    pub amount: f64,
    pub reason: Option<String>,
    pub active: bool,
}

impl SurgeQuote {
    pub fn inactive() -> Self {
        Self {
            amount: 0.0,
            reason: None,
            active: false,
        }
    }

    fn applied(amount: f64, reason: &str) -> Self {
        Self {
            amount,
            reason: Some(reason.to_string()),
            active: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PeakWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub amount: f64,
    pub reason: &'static str,
}

impl PeakWindow {
    /// Inclusive on both ends. A window whose end precedes its start
    /// wraps midnight (22:30..=01:00 covers 23:59 and 00:30 alike).
    fn contains(&self, t: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= t && t <= self.end
        } else {
            t >= self.start || t <= self.end
        }
    }
}

fn default_peak_windows() -> Vec<PeakWindow> {
    let at = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
    vec![
        PeakWindow {
            start: at(7, 0),
            end: at(11, 0),
            amount: 15.0,
            reason: "MORNING_PEAK",
        },
        PeakWindow {
            start: at(18, 0),
            end: at(22, 30),
            amount: 20.0,
            reason: "EVENING_PEAK",
        },
        PeakWindow {
            start: at(22, 30),
            end: at(1, 0),
            amount: 35.0,
            reason: "LATE_NIGHT_EMERGENCY",
        },
    ]
}

/// The operator override always wins and survives recomputes until cleared.
pub struct SurgeController {
    auto: RwLock<SurgeQuote>,
    manual: RwLock<Option<SurgeQuote>>,
    windows: Vec<PeakWindow>,
}

impl Default for SurgeController {
    fn default() -> Self {
        Self::new(default_peak_windows())
    }
}

impl SurgeController {
    pub fn new(windows: Vec<PeakWindow>) -> Self {
        Self {
            auto: RwLock::new(SurgeQuote::inactive()),
            manual: RwLock::new(None),
            windows,
        }
    }

    pub async fn current(&self) -> SurgeQuote {
        if let Some(overridden) = self.manual.read().await.clone() {
            return overridden;
        }
        self.auto.read().await.clone()
    }

    pub async fn set_manual(&self, amount: f64, reason: String) {
        *self.manual.write().await = Some(SurgeQuote {
            amount,
            reason: Some(reason),
            active: true,
        });
    }

    pub async fn clear_manual(&self) {
        *self.manual.write().await = None;
    }

    /// Priority: rain, then the first matching peak window, then none.
    /// A weather probe failure counts as dry.
    pub async fn recompute(&self, weather: &dyn WeatherService, city: &str, now: NaiveTime) {
        let raining = match weather.is_raining(city).await {
            Ok(raining) => raining,
            Err(err) => {
                warn!(error = %err, city, "weather probe failed, surge fails open");
                false
            }
        };

        let next = if raining {
            SurgeQuote::applied(RAIN_SURGE_AMOUNT, "RAIN")
        } else if let Some(window) = self.windows.iter().find(|w| w.contains(now)) {
            SurgeQuote::applied(window.amount, window.reason)
        } else {
            SurgeQuote::inactive()
        };

        *self.auto.write().await = next;
    }
}

pub async fn run_recompute_loop(state: Arc<AppState>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(state.config.surge_recompute_secs));
    loop {
        ticker.tick().await;
        state
            .surge
            .recompute(
                state.services.weather.as_ref(),
                &state.config.surge_city,
                Local::now().time(),
            )
            .await;
        let quote = state.surge.current().await;
        state.metrics.surge_fee_amount.set(quote.amount);
        debug!(amount = quote.amount, reason = ?quote.reason, "surge recomputed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{DryWeather, ServiceError};
    use async_trait::async_trait;

    struct Raining;

    #[async_trait]
    impl WeatherService for Raining {
        async fn is_raining(&self, _city: &str) -> Result<bool, ServiceError> {
            Ok(true)
        }
    }

    struct BrokenFeed;

    #[async_trait]
    impl WeatherService for BrokenFeed {
        async fn is_raining(&self, _city: &str) -> Result<bool, ServiceError> {
            Err(ServiceError::Unavailable {
                service: "weather",
                detail: "timeout".to_string(),
            })
        }
    }

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[tokio::test]
    async fn off_peak_dry_weather_means_no_surge() {
        let surge = SurgeController::default();
        surge.recompute(&DryWeather, "Hyderabad", at(13, 0)).await;

        let quote = surge.current().await;
        assert!(!quote.active);
        assert_eq!(quote.amount, 0.0);
        assert_eq!(quote.reason, None);
    }

    #[tokio::test]
    async fn peak_windows_are_inclusive_at_both_edges() {
        let surge = SurgeController::default();

        surge.recompute(&DryWeather, "Hyderabad", at(7, 0)).await;
        assert_eq!(surge.current().await.reason.as_deref(), Some("MORNING_PEAK"));

        surge.recompute(&DryWeather, "Hyderabad", at(11, 0)).await;
        assert_eq!(surge.current().await.reason.as_deref(), Some("MORNING_PEAK"));

        surge.recompute(&DryWeather, "Hyderabad", at(19, 45)).await;
        let quote = surge.current().await;
        assert_eq!(quote.amount, 20.0);
        assert_eq!(quote.reason.as_deref(), Some("EVENING_PEAK"));
    }

    #[tokio::test]
    async fn late_night_window_wraps_midnight() {
        let surge = SurgeController::default();

        surge.recompute(&DryWeather, "Hyderabad", at(23, 30)).await;
        let before = surge.current().await;
        assert_eq!(before.amount, 35.0);
        assert_eq!(before.reason.as_deref(), Some("LATE_NIGHT_EMERGENCY"));

        surge.recompute(&DryWeather, "Hyderabad", at(0, 30)).await;
        let after = surge.current().await;
        assert_eq!(after.amount, 35.0);
        assert_eq!(after.reason.as_deref(), Some("LATE_NIGHT_EMERGENCY"));

        surge.recompute(&DryWeather, "Hyderabad", at(1, 1)).await;
        assert!(!surge.current().await.active);
    }

    #[tokio::test]
    async fn rain_outranks_peak_windows() {
        let surge = SurgeController::default();
        surge.recompute(&Raining, "Hyderabad", at(19, 0)).await;

        let quote = surge.current().await;
        assert_eq!(quote.amount, RAIN_SURGE_AMOUNT);
        assert_eq!(quote.reason.as_deref(), Some("RAIN"));
    }

    #[tokio::test]
    async fn manual_override_outranks_and_survives_recompute() {
        let surge = SurgeController::default();
        surge.set_manual(50.0, "FESTIVAL_RUSH".to_string()).await;

        surge.recompute(&Raining, "Hyderabad", at(19, 0)).await;
        let quote = surge.current().await;
        assert_eq!(quote.amount, 50.0);
        assert_eq!(quote.reason.as_deref(), Some("FESTIVAL_RUSH"));

        surge.clear_manual().await;
        surge.recompute(&Raining, "Hyderabad", at(19, 0)).await;
        assert_eq!(surge.current().await.reason.as_deref(), Some("RAIN"));
    }

    #[tokio::test]
    async fn weather_failure_falls_back_to_time_rules() {
        let surge = SurgeController::default();

        surge.recompute(&BrokenFeed, "Hyderabad", at(8, 0)).await;
        assert_eq!(surge.current().await.reason.as_deref(), Some("MORNING_PEAK"));

        surge.recompute(&BrokenFeed, "Hyderabad", at(13, 0)).await;
        assert!(!surge.current().await.active);
    }
}
