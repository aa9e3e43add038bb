pub mod midir;
pub mod stubs;
