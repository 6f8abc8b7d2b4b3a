mod session;
mod token;

pub use session::{load_user, AdminSession, Session};
pub use token::{AuthToken, AUTH_TOKEN_COOKIE};
