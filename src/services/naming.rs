//! Bucket/file name rules and chunk naming.
//!
//! Chunk names join bucket, sequence number and file with [`DELIMITER`].
//! Because neither bucket nor file may contain the delimiter, the mapping
//! from `(bucket, file, seq)` to chunk name is injective.

use crate::services::meta_authority::{MetaError, MetaResult};

/// Reserved character, forbidden in bucket and file names.
pub const DELIMITER: char = '_';

/// Reject empty names and names containing [`DELIMITER`].
///
/// `what` names the thing being validated ("bucket", "file") for the message.
pub fn validate_name(what: &str, name: &str) -> MetaResult<()> {
    if name.is_empty() {
        return Err(MetaError::InvalidArgument(format!(
            "name of {} must be non-empty",
            what
        )));
    }
    if name.contains(DELIMITER) {
        return Err(MetaError::InvalidArgument(format!(
            "name of {} `{}` must not contain delimiter symbol `{}`",
            what, name, DELIMITER
        )));
    }
    Ok(())
}

pub fn chunk_name(bucket: &str, file: &str, seq: usize) -> String {
    format!("{bucket}{DELIMITER}{seq}{DELIMITER}{file}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::meta_authority::ErrorKind;

    #[test]
    fn chunk_names_follow_upload_order() {
        assert_eq!(chunk_name("b", "f", 0), "b_0_f");
        assert_eq!(chunk_name("b", "f", 1), "b_1_f");
        assert_eq!(chunk_name("photos", "cat.png", 12), "photos_12_cat.png");
    }

    #[test]
    fn rejects_empty_and_delimited_names() {
        assert_eq!(
            validate_name("bucket", "").unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            validate_name("file", "a_b").unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert!(validate_name("file", "report.pdf").is_ok());
        assert!(validate_name("bucket", "a:b").is_ok());
    }
}
