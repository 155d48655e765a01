pub mod broker;
pub mod cli;
pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod routes;
pub mod websocket;
