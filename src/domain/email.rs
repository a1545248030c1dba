use std::sync::OnceLock;

use check_if_email_exists::syntax::check_syntax;
use itertools::Itertools;
use regex::Regex;

use crate::domain::school::SchoolRecord;

const EMAIL_PATTERN: &str = r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b";

fn email_regex() -> &'static Regex {
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    EMAIL_REGEX.get_or_init(|| Regex::new(EMAIL_PATTERN).unwrap())
}

/// Scans raw page markup, scripts and attributes included. Candidates still
/// have to pass `is_valid_email_format` before they reach a record.
pub fn extract_emails_from_markup(page_source: &str) -> Vec<String> {
    email_regex()
        .find_iter(page_source)
        .map(|m| m.as_str().to_string())
        .collect()
}

pub fn is_valid_email_format(candidate: &str) -> bool {
    let syntax = check_syntax(candidate);
    if !syntax.is_valid_syntax {
        log::debug!("Discarding candidate with invalid syntax: {}", candidate);
    }
    syntax.is_valid_syntax
}

/// Order-preserving validity filter. Duplicates survive; collapsing them is
/// the fix pass's job.
pub fn filter_valid_emails(raw: Vec<String>) -> Vec<String> {
    raw.into_iter()
        .filter(|email| is_valid_email_format(email))
        .collect()
}

/// Retroactive cleanup of already-persisted records: dedup each record's
/// email list, drop entries that fail validation, and remove the field
/// entirely when nothing survives. Idempotent.
pub fn fix_emails(records: &mut [SchoolRecord]) {
    for record in records.iter_mut() {
        if let Some(emails) = record.emails.take() {
            let emails: Vec<String> = emails
                .into_iter()
                .unique()
                .filter(|email| is_valid_email_format(email))
                .collect();
            record.emails = (!emails.is_empty()).then_some(emails);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with_emails(emails: Option<Vec<&str>>) -> SchoolRecord {
        SchoolRecord {
            country: "Turkey".to_string(),
            city: "Ankara".to_string(),
            name: "Ankara International School".to_string(),
            link: "https://example.org/school/ankara-international".to_string(),
            emails: emails.map(|list| list.into_iter().map(|e| e.to_string()).collect()),
        }
    }

    #[test]
    fn extracts_both_addresses_from_contact_line() {
        let emails =
            extract_emails_from_markup("Contact: admin@school.edu and webmaster@school.edu");
        assert_eq!(emails, vec!["admin@school.edu", "webmaster@school.edu"]);
    }

    #[test]
    fn extracts_address_from_mailto_markup() {
        let markup = r#"<a href="mailto:head@school.edu" class="contact">Write to us</a>"#;
        assert_eq!(extract_emails_from_markup(markup), vec!["head@school.edu"]);
    }

    #[test]
    fn plain_prose_yields_nothing() {
        assert!(extract_emails_from_markup("<p>No contact details on this page.</p>").is_empty());
    }

    #[test]
    fn validates_simple_address() {
        assert!(is_valid_email_format("a@b.com"));
    }

    #[test]
    fn rejects_non_address() {
        assert!(!is_valid_email_format("not-an-email"));
    }

    #[test]
    fn rejects_double_at_sign() {
        assert!(!is_valid_email_format("a@@b.com"));
    }

    #[test]
    fn filter_keeps_order_and_duplicates() {
        let raw: Vec<String> = ["x@y.com", "bad", "z@y.com", "x@y.com"]
            .iter()
            .map(|e| e.to_string())
            .collect();
        assert_eq!(
            filter_valid_emails(raw),
            vec!["x@y.com", "z@y.com", "x@y.com"]
        );
    }

    #[test]
    fn fix_dedups_and_drops_invalid() {
        let mut records = vec![record_with_emails(Some(vec!["x@y.com", "x@y.com", "bad"]))];
        fix_emails(&mut records);
        assert_eq!(records[0].emails, Some(vec!["x@y.com".to_string()]));
    }

    #[test]
    fn fix_removes_field_when_nothing_survives() {
        let mut records = vec![record_with_emails(Some(vec!["bad", "also bad"]))];
        fix_emails(&mut records);
        assert!(records[0].emails.is_none());
    }

    #[test]
    fn fix_is_idempotent() {
        let mut once = vec![
            record_with_emails(Some(vec!["x@y.com", "x@y.com", "bad"])),
            record_with_emails(None),
        ];
        fix_emails(&mut once);
        let mut twice = once.clone();
        fix_emails(&mut twice);
        assert_eq!(once, twice);
    }

    #[test]
    fn absent_emails_field_is_not_serialized() {
        let json = serde_json::to_string(&record_with_emails(None)).unwrap();
        assert!(!json.contains("emails"));
    }
}
