use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by every component in the order core.
///
/// Validation and state errors are raised before any write happens; callers
/// can rely on the store being untouched when they see one. Provider
/// rejections carry the provider's message verbatim.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        requested: i64,
        available: i64,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    State(String),

    #[error("{0}")]
    Payment(String),

    #[error("Invalid webhook signature: {0}")]
    Signature(String),

    #[error("Storage failure: {0}")]
    Persistence(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        Error::State(msg.into())
    }

    pub fn payment(msg: impl Into<String>) -> Self {
        Error::Payment(msg.into())
    }

    pub fn signature(msg: impl Into<String>) -> Self {
        Error::Signature(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Error::Persistence(msg.into())
    }

    pub fn invalid_transition(from: &str, to: &str) -> Self {
        Error::State(format!("Invalid status transition from {} to {}", from, to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_message_passes_through_verbatim() {
        let err = Error::payment("Your card was declined");
        assert_eq!(err.to_string(), "Your card was declined");
    }

    #[test]
    fn test_transition_message() {
        let err = Error::invalid_transition("PENDING", "FULFILLED");
        assert_eq!(
            err.to_string(),
            "Invalid status transition from PENDING to FULFILLED"
        );
    }
}
