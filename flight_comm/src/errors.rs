//thiserror-based error types
use link_protocol::ProtocolError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommError {
    #[error("queue full")] QueueFull,
    #[error("Protocol: {0}")] Protocol(#[from] ProtocolError),
    #[error("IO: {0}")] Io(#[from] std::io::Error),
    #[error("Config: {0}")] Config(#[from] config::ConfigError),
}
