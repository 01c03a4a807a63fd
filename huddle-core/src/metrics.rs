//! Prometheus metrics for the signaling service
//!
//! Metrics live on a private registry and are rendered by [`gather`] for the
//! `/metrics` endpoint.

use prometheus::{
    register_int_counter_vec_with_registry, register_int_gauge_with_registry, Encoder,
    IntCounterVec, IntGauge, Registry, TextEncoder,
};

/// Global metrics registry
pub static REGISTRY: std::sync::LazyLock<Registry> = std::sync::LazyLock::new(Registry::new);

/// Connected signaling peers
pub static ACTIVE_PEERS: std::sync::LazyLock<IntGauge> = std::sync::LazyLock::new(|| {
    register_int_gauge_with_registry!(
        "huddle_active_peers",
        "Current number of connected signaling peers",
        REGISTRY.clone()
    )
    .expect("Failed to register ACTIVE_PEERS")
});

/// Rooms with at least one member
pub static ACTIVE_ROOMS: std::sync::LazyLock<IntGauge> = std::sync::LazyLock::new(|| {
    register_int_gauge_with_registry!(
        "huddle_active_rooms",
        "Current number of rooms with at least one member",
        REGISTRY.clone()
    )
    .expect("Failed to register ACTIVE_ROOMS")
});

/// Inbound signaling messages by event name
pub static SIGNALING_MESSAGES: std::sync::LazyLock<IntCounterVec> =
    std::sync::LazyLock::new(|| {
        register_int_counter_vec_with_registry!(
            "huddle_signaling_messages_total",
            "Total number of inbound signaling messages",
            &["event"],
            REGISTRY.clone()
        )
        .expect("Failed to register SIGNALING_MESSAGES")
    });

/// Error replies by error code
pub static SIGNALING_ERRORS: std::sync::LazyLock<IntCounterVec> =
    std::sync::LazyLock::new(|| {
        register_int_counter_vec_with_registry!(
            "huddle_signaling_errors_total",
            "Total number of structured error replies",
            &["code"],
            REGISTRY.clone()
        )
        .expect("Failed to register SIGNALING_ERRORS")
    });

/// Producers created, by media kind
pub static PRODUCERS_CREATED: std::sync::LazyLock<IntCounterVec> =
    std::sync::LazyLock::new(|| {
        register_int_counter_vec_with_registry!(
            "huddle_producers_total",
            "Total number of producers created",
            &["kind"],
            REGISTRY.clone()
        )
        .expect("Failed to register PRODUCERS_CREATED")
    });

/// Render all registered metrics in the Prometheus text format
#[must_use]
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_includes_registered_metrics() {
        SIGNALING_MESSAGES.with_label_values(&["joinRoom"]).inc();
        ACTIVE_PEERS.set(3);

        let output = gather();
        assert!(output.contains("huddle_signaling_messages_total"));
        assert!(output.contains("huddle_active_peers"));
    }
}
