//! Observability for the ALB authenticator.
//!
//! Metric recording helpers. Exporting them is left to the embedding
//! service, which installs a `metrics` recorder of its choice.

pub mod metrics;
