use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ConfirmStepUpDto {
    /// Current six-digit one-time code
    #[validate(length(equal = 6))]
    pub code: String,
}

/// Returned exactly once, at enrollment time.
#[derive(Debug, Serialize, ToSchema)]
pub struct EnrollmentResponseDto {
    pub secret: String,
    pub otpauth_url: String,
}
