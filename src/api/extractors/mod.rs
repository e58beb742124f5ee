pub mod client_identity;
pub mod host_auth;
