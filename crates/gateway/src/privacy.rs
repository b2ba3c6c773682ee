//! Redaction of contact details from user messages.
//!
//! Applied before a message reaches session history, model prompts or
//! the turn log. Patterns are compiled once at startup.

use regex::Regex;

pub const EMAIL_PLACEHOLDER: &str = "[email]";
pub const PHONE_PLACEHOLDER: &str = "[phone]";

pub struct PiiScrubber {
    email: Regex,
    phone: Regex,
}

impl PiiScrubber {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            email: Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}")?,
            // 9+ digits, optionally grouped by spaces, dots, dashes or brackets
            phone: Regex::new(r"\+?\(?\d(?:[\s.\-()]*\d){8,}")?,
        })
    }

    pub fn scrub(&self, text: &str) -> String {
        let without_email = self.email.replace_all(text, EMAIL_PLACEHOLDER);
        self.phone
            .replace_all(&without_email, PHONE_PLACEHOLDER)
            .into_owned()
    }
}
