pub mod monitor;
pub mod profile;
pub mod template;
