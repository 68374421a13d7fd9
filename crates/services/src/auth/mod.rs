pub mod flow;
pub mod options;
pub mod portal;
pub mod ports;
pub mod profile;
pub mod provider;
pub mod state;

pub use flow::{access_denied_uri, AuthFlow, Challenge, CorrelationCookie};
pub use options::{AuthOptions, AuthOptionsBuilder, Backchannel, ClientSecret};
pub use portal::PortalClient;
pub use ports::*;
pub use profile::{map_identity, UserProfile};
pub use provider::{
    ApplyRedirectContext, AuthenticatedContext, AuthenticationProvider,
    DefaultAuthenticationProvider, ReturnEndpointContext,
};
pub use state::{generate_correlation_id, EncryptedStateFormat, StateError};
