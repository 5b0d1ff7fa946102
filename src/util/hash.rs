use sha2::{Digest, Sha256};

/// Content digest of a raw field value, stored per field on synced tasks.
pub fn value_hash(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_lowercase_hex() {
        assert_eq!(
            value_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn different_values_differ() {
        assert_ne!(value_hash("a"), value_hash("b"));
    }
}
