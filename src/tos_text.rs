//! Terms Content
//! The built-in terms text shown by the prompt, and loading of an organization override.

use anyhow::{Context, Result};
use std::fs;

use crate::config::Config;

pub const DEFAULT_TERMS_VERSION: &str = "1.0.0";

pub const DEFAULT_TERMS_TEXT: &str = r#"ACCEPTABLE USE POLICY

You are accessing a computer system owned by {organization}. Continued use of this system requires acceptance of the following terms.

━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

1. AUTHORIZED USE

This system is provided for authorized business purposes only. Access by unauthorized persons is prohibited.

━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

2. MONITORING

Activity on this system may be monitored, recorded, and audited. You have no expectation of privacy in any data created, stored, or transmitted on this system.

━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

3. USER RESPONSIBILITY

You are responsible for:
• Protecting your credentials and not sharing them
• Complying with all applicable laws and organizational policies
• Reporting suspected security incidents promptly

━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

4. ACCEPTANCE

By clicking "I Accept" you acknowledge that you have read, understood, and agree to be bound by these terms. Your acceptance is recorded on this computer.

Until these terms are accepted, this notice will be shown again at every sign-in."#;

/// Opaque text handed to the prompt surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermsContent {
    pub title: String,
    pub version: String,
    pub body: String,
}

impl TermsContent {
    pub fn load(config: &Config) -> Result<Self> {
        let body = match &config.terms.text_path {
            Some(path) => fs::read_to_string(path)
                .context(format!("Failed to read terms text at {:?}", path))?,
            None => DEFAULT_TERMS_TEXT.replace("{organization}", &config.organization.name),
        };

        Ok(Self {
            title: config.terms.title.clone(),
            version: config.terms.version.clone(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_text_names_the_organization() {
        let mut config = Config::default();
        config.organization.name = "Fabrikam".to_string();
        let content = TermsContent::load(&config).unwrap();
        assert!(content.body.contains("owned by Fabrikam"));
        assert!(!content.body.contains("{organization}"));
        assert_eq!(content.version, DEFAULT_TERMS_VERSION);
    }

    #[test]
    fn override_file_replaces_text_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("terms.txt");
        fs::write(&path, "Be nice. {organization}").unwrap();

        let mut config = Config::default();
        config.terms.text_path = Some(path);
        config.terms.version = "3.3.0".to_string();

        let content = TermsContent::load(&config).unwrap();
        assert_eq!(content.body, "Be nice. {organization}");
        assert_eq!(content.version, "3.3.0");
    }

    #[test]
    fn missing_override_file_is_an_error() {
        let mut config = Config::default();
        config.terms.text_path = Some("/nonexistent/terms.txt".into());
        assert!(TermsContent::load(&config).is_err());
    }
}
