pub mod sqlite_guest_pass_repo;
pub mod postgres_guest_pass_repo;
