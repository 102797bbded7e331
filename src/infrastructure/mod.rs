pub mod config;
pub mod context_store;
pub mod db;
pub mod llm_clients;
pub mod response;
