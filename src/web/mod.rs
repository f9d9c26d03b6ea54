pub mod auth;
pub mod dashboard;
pub mod router;
pub mod social;
pub mod state;
pub mod templates;

pub use auth::{AuthUser, SESSION_COOKIE, SESSION_TTL_DAYS};
pub use state::AppState;
pub use templates::{escape_html, render_footer};
