pub mod api_client;
pub mod error_handler;
pub mod loading;
pub mod operadoras_store;
pub mod request_sequence;
