use crate::domain::provider::Provider;
use crate::domain::token::TokenId;
use serde::{Deserialize, Serialize};

const MAX_TOKEN_LEN: usize = 4096;

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub token: String,
    pub system: Provider,
}

impl TokenRequest {
    /// Validates the token registration payload.
    ///
    /// # Errors
    /// Returns an error if the token is empty or excessively large.
    pub fn validate(&self) -> Result<(), String> {
        if self.token.trim().is_empty() {
            return Err("Token cannot be empty".into());
        }
        if self.token.chars().count() > MAX_TOKEN_LEN {
            return Err(format!("Token is too long (max {MAX_TOKEN_LEN} characters)"));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewTokenResponse {
    pub id: TokenId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_token_success() {
        let req = TokenRequest { token: "valid_fcm_token_123".into(), system: Provider::Fcm };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_validate_token_empty() {
        let req = TokenRequest { token: "   ".into(), system: Provider::Apns };
        assert_eq!(req.validate().unwrap_err(), "Token cannot be empty");
    }

    #[test]
    fn test_validate_token_too_long() {
        let req = TokenRequest { token: "A".repeat(4097), system: Provider::WebPush };
        assert_eq!(req.validate().unwrap_err(), "Token is too long (max 4096 characters)");
        let req = TokenRequest { token: "A".repeat(4096), system: Provider::WebPush };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_system_is_uppercase_on_the_wire() {
        let req: TokenRequest = serde_json::from_str(r#"{"token":"t","system":"WEBPUSH"}"#).unwrap();
        assert_eq!(req.system, Provider::WebPush);
        assert!(serde_json::from_str::<TokenRequest>(r#"{"token":"t","system":"GCM"}"#).is_err());
    }
}
