pub mod guest_pass;
pub mod nonce_ledger;
