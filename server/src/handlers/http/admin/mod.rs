pub mod users;

pub use users::handle_revoke_sessions;
