//! Authentication: anonymous sessions and JWT.

mod handlers;
mod jwt;

pub use handlers::{anonymous, AnonymousRequest, AnonymousResponse};
pub use jwt::{Claims, JwtSecret};
