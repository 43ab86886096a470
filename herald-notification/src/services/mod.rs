pub mod admin;
pub mod creation;
pub mod notification_service;
