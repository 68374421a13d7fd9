// API Middleware
//
// Portal sign-in for the host application plus the local cookie session
// that signed-in identities are handed to.

pub mod portal_auth;
pub mod session;

// Re-export commonly used items
pub use portal_auth::{
    portal_auth_middleware, request_context, ChallengeRequest, PortalAuthState, SignOutRequest,
};
pub use session::{
    session_middleware, CookieSessionStore, CurrentIdentity, SessionSigner,
    COOKIE_AUTHENTICATION_SCHEME,
};
