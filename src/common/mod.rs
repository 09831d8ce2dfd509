pub mod config;
pub mod distro;
