//! Message templates with `{{name}}` placeholders.
//!
//! Rendering replaces every occurrence of every placeholder. A placeholder
//! with no value in the data map is an error, never left in the output.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{NotifyError, NotifyResult};

/// Values substituted into a template, keyed by placeholder name.
pub type TemplateData = BTreeMap<String, String>;

/// Rendered message ready for a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    pub subject: String,
    pub body: String,
}

/// A named subject/body pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub subject: String,
    pub body: String,
}

/// Which reminder a pending activation is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    FirstReminder,
    UrgentReminder,
    FinalWarning,
}

impl ReminderKind {
    /// Reminder used for escalation round `round` (1-based). Rounds past
    /// the third keep sending the final warning.
    pub fn for_round(round: u32) -> Self {
        match round {
            0 | 1 => ReminderKind::FirstReminder,
            2 => ReminderKind::UrgentReminder,
            _ => ReminderKind::FinalWarning,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderKind::FirstReminder => "first_reminder",
            ReminderKind::UrgentReminder => "urgent_reminder",
            ReminderKind::FinalWarning => "final_warning",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReminderKind::FirstReminder => "REMINDER",
            ReminderKind::UrgentReminder => "URGENT REMINDER",
            ReminderKind::FinalWarning => "FINAL WARNING",
        }
    }
}

impl Template {
    pub fn new(
        name: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// First notice sent to a guardian for a new activation.
    pub fn activation_request() -> Self {
        Self::new(
            "activation_request",
            "Emergency Activation Request - {{userName}}",
            "Hello {{guardianName}},\n\n\
             This is an urgent notification regarding {{userName}}.\n\n\
             Activation reason: {{reason}}\n\n\
             As a designated emergency guardian, your verification is required to \
             activate the emergency protocol. Review the request here:\n\
             {{verificationUrl}}\n\n\
             This request expires on {{expiresAt}}.\n\n\
             Emergency instructions:\n{{instructions}}\n\n\
             You will be able to confirm or reject the activation. If several guardians \
             are configured, more than one confirmation may be required.",
        )
    }

    /// Reminder for a guardian who has not yet answered.
    pub fn reminder(kind: ReminderKind) -> Self {
        let subject = format!("{}: Emergency Activation Request - {{{{userName}}}}", kind.label());
        let body = format!(
            "{}: Emergency activation for {{{{userName}}}} is still pending your verification.\n\n\
             Activation reason: {{{{reason}}}}\n\
             Respond here: {{{{verificationUrl}}}}\n\n\
             This request expires {{{{expiresAt}}}}. Please respond immediately.",
            kind.label()
        );
        Self::new(kind.as_str(), subject, body)
    }

    /// Short form for SMS and push.
    pub fn short_notice() -> Self {
        Self::new(
            "short_notice",
            "Emergency activation request",
            "URGENT: Emergency activation request for {{userName}}. \
             Respond before {{expiresAt}}: {{verificationUrl}}",
        )
    }

    /// Placeholder names used by this template, in first-seen order.
    pub fn placeholders(&self) -> NotifyResult<Vec<String>> {
        let mut names = Vec::new();
        for text in [&self.subject, &self.body] {
            for name in scan_placeholders(&self.name, text)? {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        Ok(names)
    }

    /// Substitute every placeholder from `data`.
    pub fn render(&self, data: &TemplateData) -> NotifyResult<MessageContent> {
        let missing = self
            .placeholders()?
            .into_iter()
            .filter(|name| !data.contains_key(name))
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(NotifyError::UnresolvedPlaceholders {
                template: self.name.clone(),
                placeholders: missing,
            });
        }

        Ok(MessageContent {
            subject: substitute(&self.subject, data),
            body: substitute(&self.body, data),
        })
    }
}

fn scan_placeholders(template: &str, text: &str) -> NotifyResult<Vec<String>> {
    let mut names = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or_else(|| NotifyError::MalformedTemplate {
            template: template.to_string(),
            message: "unterminated placeholder".to_string(),
        })?;
        let name = after[..end].trim();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(NotifyError::MalformedTemplate {
                template: template.to_string(),
                message: format!("invalid placeholder name {:?}", &after[..end]),
            });
        }
        names.push(name.to_string());
        rest = &after[end + 2..];
    }
    Ok(names)
}

// Single left-to-right pass so substituted values are never re-scanned.
fn substitute(text: &str, data: &TemplateData) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = after[..end].trim();
                match data.get(name) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
