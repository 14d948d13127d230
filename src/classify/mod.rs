pub mod composite;
pub mod manufacturer;

pub use composite::{classify_by_port_fingerprint, ClassificationResult, CompositeClassifier, SignalBundle};
pub use manufacturer::{classify_by_manufacturer, is_infrastructure_type};
