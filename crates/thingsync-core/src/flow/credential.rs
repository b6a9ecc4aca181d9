use uuid::Uuid;

/// Whether `token` looks like a personal access token: 32 hex digits, or
/// the hyphenated 8-4-4-4-12 UUID form.
///
/// This is a shape check only; the token is proven valid by the first
/// API call made with it.
pub fn is_valid_token_format(token: &str) -> bool {
    matches!(token.len(), 32 | 36) && Uuid::try_parse(token).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_and_hyphenated_forms() {
        assert!(is_valid_token_format("0123456789abcdef0123456789ABCDEF"));
        assert!(is_valid_token_format("01234567-89ab-cdef-0123-456789abcdef"));
    }

    #[test]
    fn rejects_other_shapes() {
        for token in [
            "",
            "not-a-uuid",
            "0123456789abcdef0123456789abcdeg",
            "{01234567-89ab-cdef-0123-456789abcdef}",
            "urn:uuid:01234567-89ab-cdef-0123-456789abcdef",
            "0123456789-abcdef0123456789abcdef",
            " 0123456789abcdef0123456789abcdef",
        ] {
            assert!(!is_valid_token_format(token), "{token:?} should be rejected");
        }
    }
}
