pub mod cookies;
pub mod extractor;
pub mod jwt;
pub mod tokens;

pub use extractor::{AdminPrincipal, AuthPrincipal};
pub use jwt::SecretSigner;
