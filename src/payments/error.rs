use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Failures talking to the UPI gateway.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Gateway not configured: {message}")]
    NotConfigured { message: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Rate limit exceeded: {message}")]
    RateLimitError { message: String },

    #[error("Invalid gateway response: {message}")]
    InvalidResponse { message: String },

    #[error("Gateway error: provider={provider}, message={message}")]
    ProviderError {
        provider: String,
        message: String,
        provider_code: Option<String>,
        retryable: bool,
    },
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::NotConfigured { .. } => false,
            GatewayError::NetworkError { .. } => true,
            GatewayError::RateLimitError { .. } => true,
            GatewayError::InvalidResponse { .. } => false,
            GatewayError::ProviderError { retryable, .. } => *retryable,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            GatewayError::NotConfigured { .. } => {
                "Online payment is not available right now".to_string()
            }
            GatewayError::NetworkError { .. } | GatewayError::RateLimitError { .. } => {
                "Payment gateway is temporarily unavailable. Please try again".to_string()
            }
            GatewayError::InvalidResponse { .. } | GatewayError::ProviderError { .. } => {
                "Payment gateway returned an error. Please try again".to_string()
            }
        }
    }
}
