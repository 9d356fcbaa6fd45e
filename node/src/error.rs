use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("network error: {0}")]
    Network(#[from] murmur_network::NetworkError),

    #[error("config error: {0}")]
    Config(String),
}
