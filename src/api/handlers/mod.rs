pub mod guest_pass;
pub mod health;
pub mod host;
