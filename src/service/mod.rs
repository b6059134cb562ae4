pub mod auth_service;
pub mod capability_service;
pub mod chat_service;
pub mod workflow_service;
