// Domain layer - Traffic dashboard models
pub mod chart;
pub mod dashboard;
pub mod time_range;
pub mod traffic;
