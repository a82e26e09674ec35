// Presentation layer - HTTP routes and rendering
pub mod app_state;
pub mod error;
pub mod handlers;
pub mod router;
pub mod view;
