// Application layer - Use cases and ports
pub mod dashboard_service;
pub mod data_shaper;
pub mod range_resolver;
pub mod traffic_repository;
