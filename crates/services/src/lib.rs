pub mod auth;

pub use auth::{AuthFlow, AuthOptions, AuthenticationProvider};
