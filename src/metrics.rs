//! Prometheus metrics and tracing span helpers.

#[cfg(feature = "metrics")]
pub use instruments::{render_metrics, LedgerMetrics, METRICS};

#[cfg(feature = "metrics")]
mod instruments {
    use once_cell::sync::Lazy;
    use opentelemetry::metrics::{Counter, Histogram, MeterProvider as _};
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use prometheus::{Encoder, Registry, TextEncoder};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    pub static METRICS: Lazy<LedgerMetrics> = Lazy::new(LedgerMetrics::init);

    pub struct LedgerMetrics {
        pub registry: Registry,
        _provider: SdkMeterProvider,
        pub queries_total: Counter<u64>,
        pub query_errors_total: Counter<u64>,
        pub query_duration: Histogram<f64>,
        pub pool_wait_duration: Histogram<f64>,
        pub mutations_total: Counter<u64>,
        pub alerts_raised_total: Counter<u64>,
        pub idle_connections: Arc<AtomicUsize>,
    }

    impl LedgerMetrics {
        pub fn init() -> Self {
            let registry = Registry::new();
            let exporter = opentelemetry_prometheus::exporter()
                .with_registry(registry.clone())
                .build()
                .expect("failed to build prometheus exporter");
            let provider = SdkMeterProvider::builder().with_reader(exporter).build();
            let meter = provider.meter("stockledger");

            let queries_total = meter
                .u64_counter("stockledger_queries_total")
                .with_description("Total queries executed")
                .build();

            let query_errors_total = meter
                .u64_counter("stockledger_query_errors_total")
                .with_description("Queries that returned an error")
                .build();

            let query_duration = meter
                .f64_histogram("stockledger_query_duration_seconds")
                .with_description("Duration of queries")
                .build();

            let pool_wait_duration = meter
                .f64_histogram("stockledger_pool_wait_seconds")
                .with_description("Time spent waiting for a pooled connection")
                .build();

            let mutations_total = meter
                .u64_counter("stockledger_mutations_total")
                .with_description("Committed ledger mutations by operation")
                .build();

            let alerts_raised_total = meter
                .u64_counter("stockledger_alerts_raised_total")
                .with_description("Stock alerts raised by type")
                .build();

            let idle_connections = Arc::new(AtomicUsize::new(0));
            let idle_clone = Arc::clone(&idle_connections);

            let _gauge = meter
                .u64_observable_gauge("stockledger_pool_idle_connections")
                .with_description("Connections parked in the pool")
                .with_callback(move |observer| {
                    observer.observe(idle_clone.load(Ordering::Relaxed) as u64, &[]);
                })
                .build();

            Self {
                registry,
                _provider: provider,
                queries_total,
                query_errors_total,
                query_duration,
                pool_wait_duration,
                mutations_total,
                alerts_raised_total,
                idle_connections,
            }
        }

        pub fn record_query(&self, elapsed: Duration) {
            self.queries_total.add(1, &[]);
            self.query_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_query_error(&self) {
            self.query_errors_total.add(1, &[]);
        }

        pub fn record_pool_wait(&self, elapsed: Duration) {
            self.pool_wait_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn set_idle_connections(&self, idle: usize) {
            self.idle_connections.store(idle, Ordering::Relaxed);
        }

        pub fn record_mutation(&self, operation: &'static str) {
            self.mutations_total
                .add(1, &[KeyValue::new("operation", operation)]);
        }

        pub fn record_alert(&self, alert_type: &'static str) {
            self.alerts_raised_total
                .add(1, &[KeyValue::new("alert_type", alert_type)]);
        }
    }

    /// Prometheus text exposition of every registered metric
    pub fn render_metrics() -> String {
        let families = METRICS.registry.gather();
        let mut buf = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&families, &mut buf) {
            log::warn!("Failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{info_span, Span};

    pub fn connect_span() -> Span {
        info_span!("stockledger.connect")
    }

    pub fn acquire_connection_span() -> Span {
        info_span!("stockledger.pool.acquire")
    }

    pub fn execute_query_span(query: &str) -> Span {
        info_span!("stockledger.query", db.statement = query)
    }

    pub fn begin_transaction_span() -> Span {
        info_span!("stockledger.transaction.begin")
    }

    pub fn commit_transaction_span() -> Span {
        info_span!("stockledger.transaction.commit")
    }

    pub fn rollback_transaction_span() -> Span {
        info_span!("stockledger.transaction.rollback")
    }

    /// Span around one ledger operation. Without an id the `material_id`
    /// field stays empty until the operation records it.
    pub fn ledger_operation_span(operation: &'static str, material_id: Option<i64>) -> Span {
        let span = info_span!(
            "stockledger.ledger",
            operation,
            material_id = tracing::field::Empty
        );
        if let Some(id) = material_id {
            span.record("material_id", id);
        }
        span
    }
}

#[cfg(all(test, feature = "tracing"))]
mod span_tests {
    use super::tracing_helpers::ledger_operation_span;
    use std::fmt;
    use std::sync::{Arc, Mutex};
    use tracing::field::{Field, Visit};
    use tracing::span::{Attributes, Id, Record};
    use tracing::{Event, Metadata, Subscriber};

    type Recorded = Arc<Mutex<Vec<(String, i64)>>>;

    struct Ints<'a>(&'a mut Vec<(String, i64)>);

    impl Visit for Ints<'_> {
        fn record_i64(&mut self, field: &Field, value: i64) {
            self.0.push((field.name().to_string(), value));
        }

        fn record_debug(&mut self, _field: &Field, _value: &dyn fmt::Debug) {}
    }

    struct IntRecorder(Recorded);

    impl Subscriber for IntRecorder {
        fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
            true
        }

        fn new_span(&self, span: &Attributes<'_>) -> Id {
            let mut recorded = self.0.lock().unwrap();
            span.record(&mut Ints(&mut recorded));
            Id::from_u64(1)
        }

        fn record(&self, _span: &Id, values: &Record<'_>) {
            let mut recorded = self.0.lock().unwrap();
            values.record(&mut Ints(&mut recorded));
        }

        fn record_follows_from(&self, _span: &Id, _follows: &Id) {}
        fn event(&self, _event: &Event<'_>) {}
        fn enter(&self, _span: &Id) {}
        fn exit(&self, _span: &Id) {}
    }

    fn recorded_ids(body: impl FnOnce()) -> Vec<i64> {
        let recorded: Recorded = Arc::default();
        tracing::subscriber::with_default(IntRecorder(Arc::clone(&recorded)), body);
        let recorded = recorded.lock().unwrap();
        recorded
            .iter()
            .filter(|(name, _)| name == "material_id")
            .map(|(_, id)| *id)
            .collect()
    }

    #[test]
    fn test_known_material_id_is_recorded() {
        let ids = recorded_ids(|| {
            let _span = ledger_operation_span("record_transaction", Some(42));
        });
        assert_eq!(ids, vec![42]);
    }

    #[test]
    fn test_unknown_material_id_is_recorded_later() {
        let ids = recorded_ids(|| {
            let span = ledger_operation_span("create_material", None);
            let _entered = span.enter();
            tracing::Span::current().record("material_id", 7_i64);
        });
        assert_eq!(ids, vec![7]);
    }
}
