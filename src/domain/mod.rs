// Domain layer - Channels, samples and dashboard models
pub mod channel;
pub mod dashboard;
pub mod telemetry;
