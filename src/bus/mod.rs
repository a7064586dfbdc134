//! Publish/subscribe boundary
//!
//! The recorder consumes messages from a [`MessageBus`] and the player
//! publishes onto one. Subjects are dot-separated tokens; subscription
//! patterns may use `*` for exactly one token and a trailing `>` for one or
//! more remaining tokens.

mod memory;

pub use memory::InMemoryBus;

use crate::{Error, Result};

/// Callback invoked with `(topic, payload)` for each delivered message
pub type MessageHandler = Box<dyn Fn(&str, &[u8]) + Send + Sync>;

/// Handle identifying one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// Message transport the recorder and player talk to
pub trait MessageBus: Send + Sync {
    /// Publish a payload on a concrete subject
    ///
    /// # Errors
    ///
    /// Returns error if the subject is invalid or the transport fails
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<()>;

    /// Register `handler` for every subject matching `pattern`
    ///
    /// # Errors
    ///
    /// Returns error if the pattern is invalid or the transport fails
    fn subscribe(&self, pattern: &str, handler: MessageHandler) -> Result<SubscriptionId>;

    /// Remove a subscription
    ///
    /// # Errors
    ///
    /// Returns error if the subscription is unknown
    fn unsubscribe(&self, id: SubscriptionId) -> Result<()>;
}

/// Check that `subject` is a concrete, publishable subject
///
/// # Errors
///
/// Returns error on empty tokens or wildcards
pub fn validate_subject(subject: &str) -> Result<()> {
    for token in subject.split('.') {
        if token.is_empty() {
            return Err(Error::Bus(format!("Empty token in subject '{subject}'")));
        }
        if token == "*" || token == ">" {
            return Err(Error::Bus(format!(
                "Wildcards are not allowed in published subject '{subject}'"
            )));
        }
    }
    Ok(())
}

/// Check that `pattern` is a valid subscription pattern
///
/// # Errors
///
/// Returns error on empty tokens or a `>` that is not the last token
pub fn validate_pattern(pattern: &str) -> Result<()> {
    let tokens: Vec<&str> = pattern.split('.').collect();
    for (i, token) in tokens.iter().enumerate() {
        if token.is_empty() {
            return Err(Error::Bus(format!("Empty token in pattern '{pattern}'")));
        }
        if *token == ">" && i + 1 != tokens.len() {
            return Err(Error::Bus(format!(
                "'>' must be the last token in pattern '{pattern}'"
            )));
        }
    }
    Ok(())
}

/// Whether `subject` matches the subscription `pattern`
#[must_use]
pub fn subject_matches(pattern: &str, subject: &str) -> bool {
    let mut subject_tokens = subject.split('.');

    for pattern_token in pattern.split('.') {
        match pattern_token {
            ">" => return subject_tokens.next().is_some(),
            "*" => {
                if subject_tokens.next().is_none() {
                    return false;
                }
            }
            literal => {
                if subject_tokens.next() != Some(literal) {
                    return false;
                }
            }
        }
    }

    subject_tokens.next().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_match() {
        assert!(subject_matches("sensor.imu", "sensor.imu"));
        assert!(!subject_matches("sensor.imu", "sensor.gps"));
        assert!(!subject_matches("sensor.imu", "sensor.imu.raw"));
        assert!(!subject_matches("sensor.imu.raw", "sensor.imu"));
    }

    #[test]
    fn test_single_token_wildcard() {
        assert!(subject_matches("sensor.*", "sensor.imu"));
        assert!(subject_matches("*.imu", "sensor.imu"));
        assert!(!subject_matches("sensor.*", "sensor"));
        assert!(!subject_matches("sensor.*", "sensor.imu.raw"));
    }

    #[test]
    fn test_tail_wildcard() {
        assert!(subject_matches("sensor.>", "sensor.imu"));
        assert!(subject_matches("sensor.>", "sensor.imu.raw"));
        assert!(!subject_matches("sensor.>", "sensor"));
        assert!(subject_matches(">", "anything.at.all"));
    }

    #[test]
    fn test_validate_pattern() {
        assert!(validate_pattern("sensor.*").is_ok());
        assert!(validate_pattern("sensor.>").is_ok());
        assert!(validate_pattern(">").is_ok());

        assert!(validate_pattern("").is_err());
        assert!(validate_pattern("sensor..imu").is_err());
        assert!(validate_pattern("sensor.>.imu").is_err());
    }

    #[test]
    fn test_validate_subject() {
        assert!(validate_subject("sensor.imu").is_ok());
        assert!(validate_subject("large/message").is_ok());

        assert!(validate_subject("sensor.*").is_err());
        assert!(validate_subject("sensor.>").is_err());
        assert!(validate_subject(".imu").is_err());
    }
}
