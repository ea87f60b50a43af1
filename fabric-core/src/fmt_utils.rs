use std::fmt;

use crate::envs::{FABRIC_LOG_FULL_ENV, is_env_var_set};

/// Bytes of a value shown before [`AbbreviateHexBytes`] cuts it off
const ABBREVIATE_AFTER: usize = 32;

pub fn log_full_enabled() -> bool {
    thread_local!(static LOG_FULL: bool = is_env_var_set(FABRIC_LOG_FULL_ENV));
    LOG_FULL.with(|x| *x)
}

/// Hex form of signatures, hashes and serialized messages for logs
///
/// Values longer than 32 bytes are cut and suffixed with their length,
/// unless [`FABRIC_LOG_FULL_ENV`] is set.
pub struct AbbreviateHexBytes<'a>(pub &'a [u8]);

impl fmt::Display for AbbreviateHexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.get(..ABBREVIATE_AFTER) {
            Some(head) if self.0.len() > ABBREVIATE_AFTER && !log_full_enabled() => {
                write!(f, "{}..({} bytes)", hex::encode(head), self.0.len())
            }
            _ => f.write_str(&hex::encode(self.0)),
        }
    }
}

impl fmt::Debug for AbbreviateHexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::{AbbreviateHexBytes, log_full_enabled};

    #[test]
    fn hashes_are_printed_whole() {
        assert_eq!(AbbreviateHexBytes(&[0xab, 0x01]).to_string(), "ab01");
        assert_eq!(AbbreviateHexBytes(&[0; 32]).to_string(), "00".repeat(32));
    }

    #[test]
    fn signatures_are_cut_with_length() {
        let signature = [7u8; 72];
        if !log_full_enabled() {
            assert_eq!(
                AbbreviateHexBytes(&signature).to_string(),
                format!("{}..(72 bytes)", "07".repeat(32))
            );
        }
    }
}
