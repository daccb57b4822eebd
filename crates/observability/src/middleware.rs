//! HTTP-Tracing fuer die Observability-Endpunkte

use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::TraceLayer;

/// Erstellt den Tracing-Layer: loggt jede Anfrage mit Methode, Pfad,
/// Statuscode und Dauer als Span.
pub fn request_timing_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
}
