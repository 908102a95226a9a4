pub mod get;

pub use get::handle_get_profile;
