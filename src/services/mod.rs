pub mod auth_service;
pub mod chat_hub;
pub mod gateway;
pub mod health_service;
