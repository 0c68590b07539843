pub mod admin;
pub mod api;
pub mod auth;
pub mod client;
pub(crate) mod form;
pub mod media;
