//! HTTP handlers for catalog entities, the person aggregate, auth and users.

pub mod auth;
pub mod entity;
pub mod person;
pub mod users;
