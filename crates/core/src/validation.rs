//! Input validation for crack submissions.

use crate::digest::HashAlgorithm;
use crate::error::CoreError;
use crate::partition::MAX_CANDIDATE_LENGTH;

/// Validate a target digest: lowercase hex of the algorithm's length.
pub fn validate_hash(hash: &str, algorithm: HashAlgorithm) -> Result<(), CoreError> {
    if hash.is_empty() {
        return Err(CoreError::Validation("Missing hash".to_string()));
    }
    algorithm.decode_target(hash)?;
    Ok(())
}

/// Validate the maximum candidate length.
pub fn validate_max_length(max_length: u32) -> Result<(), CoreError> {
    if max_length == 0 || max_length > MAX_CANDIDATE_LENGTH {
        return Err(CoreError::Validation(format!(
            "maxLength must be between 1 and {MAX_CANDIDATE_LENGTH}"
        )));
    }
    Ok(())
}
