//! Rule-based auto replies for inbound messages
//!
//! Rules are scanned in order and the first enabled rule that matches wins.
//! When nothing matches the fallback reply (if any) is used.

use regex::RegexBuilder;

use crate::models::{ChatbotRule, InstanceChatbot, MatchType};

const MAX_PATTERN_LEN: usize = 500;
const MAX_REPLY_LEN: usize = 4096;

/// Reply the bot would send for `text`, or None when it stays silent
pub fn find_reply<'a>(bot: &'a InstanceChatbot, text: &str) -> Option<&'a str> {
    if !bot.enabled {
        return None;
    }

    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    bot.rules
        .iter()
        .filter(|rule| rule.enabled)
        .find(|rule| rule_matches(rule, text))
        .map(|rule| rule.reply.as_str())
        .or_else(|| bot.fallback_reply.as_deref().filter(|r| !r.trim().is_empty()))
}

pub fn rule_matches(rule: &ChatbotRule, text: &str) -> bool {
    let text = text.trim();
    let pattern = rule.pattern.trim();

    if rule.match_type == MatchType::Regex {
        return match RegexBuilder::new(pattern)
            .case_insensitive(!rule.case_sensitive)
            .build()
        {
            Ok(re) => re.is_match(text),
            Err(e) => {
                log::warn!("[CHATBOT] Skipping rule {} with invalid regex: {}", rule.id, e);
                false
            }
        };
    }

    let (text, pattern) = if rule.case_sensitive {
        (text.to_string(), pattern.to_string())
    } else {
        (text.to_lowercase(), pattern.to_lowercase())
    };

    match rule.match_type {
        MatchType::Exact => text == pattern,
        MatchType::Contains => text.contains(&pattern),
        MatchType::StartsWith => text.starts_with(&pattern),
        MatchType::Regex => false,
    }
}

/// Validate rules before saving and give new rules an id
pub fn prepare_rules(rules: Vec<ChatbotRule>) -> Result<Vec<ChatbotRule>, String> {
    rules
        .into_iter()
        .enumerate()
        .map(|(index, mut rule)| {
            let position = index + 1;
            let pattern = rule.pattern.trim();
            if pattern.is_empty() {
                return Err(format!("Rule {}: pattern is required", position));
            }
            if pattern.len() > MAX_PATTERN_LEN {
                return Err(format!("Rule {}: pattern is too long", position));
            }
            if rule.reply.trim().is_empty() {
                return Err(format!("Rule {}: reply is required", position));
            }
            if rule.reply.len() > MAX_REPLY_LEN {
                return Err(format!("Rule {}: reply is too long", position));
            }
            if rule.match_type == MatchType::Regex {
                RegexBuilder::new(pattern)
                    .case_insensitive(!rule.case_sensitive)
                    .build()
                    .map_err(|e| format!("Rule {}: invalid regex: {}", position, e))?;
            }
            if rule.id.trim().is_empty() {
                rule.id = uuid::Uuid::new_v4().to_string();
            }
            Ok(rule)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(pattern: &str, match_type: MatchType, reply: &str) -> ChatbotRule {
        ChatbotRule {
            id: String::new(),
            pattern: pattern.to_string(),
            match_type,
            reply: reply.to_string(),
            case_sensitive: false,
            enabled: true,
        }
    }

    fn bot(rules: Vec<ChatbotRule>, fallback: Option<&str>) -> InstanceChatbot {
        InstanceChatbot {
            instance_id: "inst".to_string(),
            enabled: true,
            rules,
            fallback_reply: fallback.map(String::from),
            updated_at: None,
        }
    }

    #[test]
    fn test_first_match_wins() {
        let bot = bot(
            vec![
                rule("price", MatchType::Contains, "Our prices start at $10"),
                rule("price list", MatchType::Contains, "unreachable"),
            ],
            None,
        );
        assert_eq!(find_reply(&bot, "Send me the PRICE list"), Some("Our prices start at $10"));
    }

    #[test]
    fn test_match_types() {
        assert!(rule_matches(&rule("hi", MatchType::Exact, "x"), "  Hi "));
        assert!(!rule_matches(&rule("hi", MatchType::Exact, "x"), "hi there"));
        assert!(rule_matches(&rule("order", MatchType::StartsWith, "x"), "Order #12"));
        assert!(!rule_matches(&rule("order", MatchType::StartsWith, "x"), "my order"));
        assert!(rule_matches(&rule(r"^\d{4}$", MatchType::Regex, "x"), "1234"));
        assert!(rule_matches(&rule("^hello", MatchType::Regex, "x"), "HELLO world"));
    }

    #[test]
    fn test_case_sensitive() {
        let mut r = rule("Hi", MatchType::Exact, "x");
        r.case_sensitive = true;
        assert!(rule_matches(&r, "Hi"));
        assert!(!rule_matches(&r, "hi"));
    }

    #[test]
    fn test_disabled_rules_and_fallback() {
        let mut off = rule("hello", MatchType::Contains, "disabled reply");
        off.enabled = false;
        let bot = bot(vec![off], Some("We'll get back to you"));
        assert_eq!(find_reply(&bot, "hello"), Some("We'll get back to you"));
    }

    #[test]
    fn test_disabled_bot_is_silent() {
        let mut bot = bot(vec![rule("hello", MatchType::Contains, "hey")], Some("fallback"));
        bot.enabled = false;
        assert_eq!(find_reply(&bot, "hello"), None);
    }

    #[test]
    fn test_no_match_no_fallback() {
        let bot = bot(vec![rule("hello", MatchType::Exact, "hey")], None);
        assert_eq!(find_reply(&bot, "bye"), None);
        assert_eq!(find_reply(&bot, "   "), None);
    }

    #[test]
    fn test_prepare_rules() {
        let rules = prepare_rules(vec![rule("hi", MatchType::Exact, "hello")]).unwrap();
        assert!(!rules[0].id.is_empty());

        let err = prepare_rules(vec![rule("(unclosed", MatchType::Regex, "x")]).unwrap_err();
        assert!(err.contains("invalid regex"));

        assert!(prepare_rules(vec![rule("  ", MatchType::Contains, "x")]).is_err());
        assert!(prepare_rules(vec![rule("hi", MatchType::Contains, " ")]).is_err());
    }
}
