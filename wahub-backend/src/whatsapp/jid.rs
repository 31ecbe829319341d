//! Phone number / JID helpers

const USER_SUFFIX: &str = "@s.whatsapp.net";
const GROUP_SUFFIX: &str = "@g.us";

/// Strip everything but digits (`+55 (11) 9999-0000` → `551199990000`)
pub fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Turn a user-supplied recipient into a JID the backend accepts.
/// Bare numbers become user JIDs; user and group JIDs pass through.
pub fn to_jid(raw: &str) -> Result<String, String> {
    let raw = raw.trim();
    if let Some(local) = raw.strip_suffix(GROUP_SUFFIX) {
        if local.is_empty() {
            return Err(format!("Invalid group id: {}", raw));
        }
        return Ok(raw.to_string());
    }

    let local = raw.strip_suffix(USER_SUFFIX).unwrap_or(raw);
    let digits = normalize_phone(local);
    if digits.len() < 7 || digits.len() > 15 {
        return Err(format!("Invalid phone number: {}", raw));
    }
    Ok(format!("{}{}", digits, USER_SUFFIX))
}

/// Phone part of a user JID, device suffix removed (`123:4@s.whatsapp.net` → `123`)
pub fn phone_from_jid(jid: &str) -> Option<String> {
    let local = jid.strip_suffix(USER_SUFFIX)?;
    let phone = local.split(':').next().unwrap_or(local);
    if phone.is_empty() {
        None
    } else {
        Some(phone.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_jid() {
        assert_eq!(to_jid("+55 (11) 99999-0000").unwrap(), "5511999990000@s.whatsapp.net");
        assert_eq!(to_jid("5511999990000@s.whatsapp.net").unwrap(), "5511999990000@s.whatsapp.net");
        assert_eq!(to_jid("120363025@g.us").unwrap(), "120363025@g.us");
        assert!(to_jid("123").is_err());
        assert!(to_jid("@g.us").is_err());
        assert!(to_jid("").is_err());
    }

    #[test]
    fn test_phone_from_jid() {
        assert_eq!(phone_from_jid("5511999990000:12@s.whatsapp.net").as_deref(), Some("5511999990000"));
        assert_eq!(phone_from_jid("120363025@g.us"), None);
    }
}
