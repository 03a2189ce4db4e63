use uuid::Uuid;

/// Length of tokens identifying embeddable entities.
pub const TOKEN_LEN: usize = 32;

/// Fresh opaque identifier for an embeddable entity: 32 lowercase hex chars.
pub fn generate_token() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_token_shape() {
        let token = generate_token();
        assert_eq!(token.len(), TOKEN_LEN);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_tokens_are_distinct() {
        let tokens: HashSet<String> = (0..1000).map(|_| generate_token()).collect();
        assert_eq!(tokens.len(), 1000);
    }
}
