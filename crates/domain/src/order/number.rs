//! Order number generation.

use uuid::Uuid;

/// Generates a 32-character hex order number.
///
/// Random tokens keep order numbers non-enumerable; uniqueness is enforced
/// by the store, and callers regenerate on the (vanishingly rare) collision.
pub fn generate() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_32_hex_chars() {
        let number = generate();
        assert_eq!(number.len(), 32);
        assert!(number.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn consecutive_numbers_differ() {
        assert_ne!(generate(), generate());
    }
}
