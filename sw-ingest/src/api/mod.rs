//! HTTP API handlers for sw-ingest

pub mod health;
pub mod logs;
pub mod sessions;
pub mod species;
pub mod sse;
pub mod ui;

pub use health::health_routes;
pub use logs::log_routes;
pub use sessions::session_routes;
pub use species::species_routes;
pub use sse::event_routes;
pub use ui::ui_routes;
