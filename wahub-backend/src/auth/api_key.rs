use rand::RngCore;

pub const API_KEY_PREFIX: &str = "wh_";

/// `wh_` followed by 48 hex chars (24 random bytes)
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{}{}", API_KEY_PREFIX, hex::encode(bytes))
}

/// Display form kept in the audit history, e.g. `wh_1a2b…9f0e`
pub fn mask_api_key(key: &str) -> String {
    if key.len() <= 12 || !key.is_ascii() {
        return "****".to_string();
    }
    format!("{}…{}", &key[..7], &key[key.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_api_key() {
        let key = generate_api_key();
        assert!(key.starts_with(API_KEY_PREFIX));
        assert_eq!(key.len(), API_KEY_PREFIX.len() + 48);
        assert!(key[3..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(key, generate_api_key());
    }

    #[test]
    fn test_mask_api_key() {
        assert_eq!(mask_api_key("wh_0123456789abcdef"), "wh_0123…cdef");
        assert_eq!(mask_api_key("short"), "****");
    }
}
