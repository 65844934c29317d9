use prometheus::{
    Encoder, Gauge, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub transitions_total: IntCounterVec,
    pub dispatch_total: IntCounterVec,
    pub dispatch_latency_seconds: HistogramVec,
    pub notices_total: IntCounterVec,
    pub otp_verify_total: IntCounterVec,
    pub refunds_settled_total: IntCounter,
    pub external_fallbacks_total: IntCounterVec,
    pub surge_fee_amount: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let transitions_total = IntCounterVec::new(
            Opts::new("transitions_total", "Order status transitions by outcome"),
            &["outcome"],
        )
        .expect("valid transitions_total metric");

        let dispatch_total = IntCounterVec::new(
            Opts::new("dispatch_total", "Dispatch attempts by kind and outcome"),
            &["kind", "outcome"],
        )
        .expect("valid dispatch_total metric");

        let dispatch_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "dispatch_latency_seconds",
                "Latency of dispatch processing in seconds",
            ),
            &["kind"],
        )
        .expect("valid dispatch_latency_seconds metric");

        let notices_total = IntCounterVec::new(
            Opts::new("notices_total", "Notices by queue outcome"),
            &["outcome"],
        )
        .expect("valid notices_total metric");

        let otp_verify_total = IntCounterVec::new(
            Opts::new("otp_verify_total", "Handoff code verifications by outcome"),
            &["outcome"],
        )
        .expect("valid otp_verify_total metric");

        let refunds_settled_total =
            IntCounter::new("refunds_settled_total", "Refunds settled to the gateway")
                .expect("valid refunds_settled_total metric");

        let external_fallbacks_total = IntCounterVec::new(
            Opts::new(
                "external_fallbacks_total",
                "External collaborator failures absorbed by a fallback",
            ),
            &["service"],
        )
        .expect("valid external_fallbacks_total metric");

        let surge_fee_amount = Gauge::new("surge_fee_amount", "Currently quoted surge fee")
            .expect("valid surge_fee_amount metric");

        registry
            .register(Box::new(transitions_total.clone()))
            .expect("register transitions_total");
        registry
            .register(Box::new(dispatch_total.clone()))
            .expect("register dispatch_total");
        registry
            .register(Box::new(dispatch_latency_seconds.clone()))
            .expect("register dispatch_latency_seconds");
        registry
            .register(Box::new(notices_total.clone()))
            .expect("register notices_total");
        registry
            .register(Box::new(otp_verify_total.clone()))
            .expect("register otp_verify_total");
        registry
            .register(Box::new(refunds_settled_total.clone()))
            .expect("register refunds_settled_total");
        registry
            .register(Box::new(external_fallbacks_total.clone()))
            .expect("register external_fallbacks_total");
        registry
            .register(Box::new(surge_fee_amount.clone()))
            .expect("register surge_fee_amount");

        Self {
            registry,
            transitions_total,
            dispatch_total,
            dispatch_latency_seconds,
            notices_total,
            otp_verify_total,
            refunds_settled_total,
            external_fallbacks_total,
            surge_fee_amount,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
