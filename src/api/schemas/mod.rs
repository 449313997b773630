use serde::{Deserialize, Serialize};

pub mod push_tokens;

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}
