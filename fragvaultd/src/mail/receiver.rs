use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const UNTITLED_TASK: &str = "Untitled Task";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MailError {
    #[error("unknown sender: {0}")]
    UnknownSender(String),
    #[error("default public author '{0}' is configured but that user does not exist")]
    MisconfiguredDefaultAuthor(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceivedMail {
    pub headers: Vec<(String, String)>,
    pub subject: String,
    pub body: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub delivered_to: Vec<String>,
}

impl ReceivedMail {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn to_and_cc_addresses(&self) -> impl Iterator<Item = &str> {
        self.to.iter().chain(self.cc.iter()).map(String::as_str)
    }
}

/// Extra ownership applied when a mail was sent to `address`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingRule {
    pub address: String,
    pub owner: Option<String>,
    pub projects: Vec<String>,
    pub cc: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailReceiverConfig {
    pub application_installed: bool,
    pub public_create_address: Option<String>,
    pub default_public_author: Option<String>,
    pub routing: Vec<RoutingRule>,
}

impl Default for MailReceiverConfig {
    fn default() -> Self {
        Self {
            application_installed: true,
            public_create_address: None,
            default_public_author: None,
            routing: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub addresses: Vec<String>,
}

pub trait UserDirectory {
    fn user_by_address(&self, address: &str) -> Option<MailUser>;
    fn user_by_username(&self, username: &str) -> Option<MailUser>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticUserDirectory {
    users: Vec<MailUser>,
    by_address: HashMap<String, usize>,
}

impl StaticUserDirectory {
    pub fn new(users: Vec<MailUser>) -> Self {
        let mut by_address = HashMap::new();
        for (index, user) in users.iter().enumerate() {
            for address in &user.addresses {
                by_address.insert(normalize_address(address), index);
            }
        }
        Self { users, by_address }
    }
}

impl UserDirectory for StaticUserDirectory {
    fn user_by_address(&self, address: &str) -> Option<MailUser> {
        self.by_address
            .get(&normalize_address(address))
            .and_then(|index| self.users.get(*index))
            .cloned()
    }

    fn user_by_username(&self, username: &str) -> Option<MailUser> {
        self.users
            .iter()
            .find(|user| user.username == username)
            .cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskPriority {
    UnbreakNow,
    NeedsTriage,
    High,
    Normal,
    Low,
    Wishlist,
}

impl TaskPriority {
    pub fn score(self) -> u8 {
        match self {
            TaskPriority::UnbreakNow => 100,
            TaskPriority::NeedsTriage => 90,
            TaskPriority::High => 80,
            TaskPriority::Normal => 50,
            TaskPriority::Low => 25,
            TaskPriority::Wishlist => 0,
        }
    }
}

/// Task fields derived from an inbound mail; persisting it is up to the
/// task editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub author_id: String,
    pub original_email_source: Option<String>,
    pub priority: TaskPriority,
    pub title: String,
    pub description: String,
    pub owner_id: Option<String>,
    pub project_ids: Vec<String>,
    pub cc_ids: Vec<String>,
}

/// Takes the address inside `<...>` when present, trimmed and lowercased.
pub fn normalize_address(raw: &str) -> String {
    let inner = match (raw.find('<'), raw.rfind('>')) {
        (Some(start), Some(end)) if start < end => &raw[start + 1..end],
        _ => raw,
    };
    inner.trim().to_ascii_lowercase()
}

fn addresses_match(left: &str, right: &str) -> bool {
    let left = normalize_address(left);
    !left.is_empty() && left == normalize_address(right)
}

pub struct CreateTaskReceiver {
    config: MailReceiverConfig,
}

impl CreateTaskReceiver {
    pub fn new(config: MailReceiverConfig) -> Self {
        Self { config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.application_installed
    }

    pub fn can_accept_mail(&self, mail: &ReceivedMail) -> bool {
        let Some(create_address) = self.config.public_create_address.as_deref() else {
            return false;
        };

        let is_reply = mail.header("in-reply-to").is_some_and(|value| !value.is_empty());
        let is_forward = mail.subject.contains("Fwd:");
        if is_reply && !is_forward {
            debug!(subject = %mail.subject, "reply mail does not create tasks");
            return false;
        }

        mail.to_and_cc_addresses()
            .chain(mail.delivered_to.iter().map(String::as_str))
            .any(|address| addresses_match(create_address, address))
    }

    pub fn load_sender<D: UserDirectory>(
        &self,
        mail: &ReceivedMail,
        directory: &D,
    ) -> Result<MailUser, MailError> {
        let from = mail.header("from").unwrap_or_default();
        if let Some(user) = directory.user_by_address(from) {
            return Ok(user);
        }

        let Some(default_author) = self
            .config
            .default_public_author
            .as_deref()
            .filter(|name| !name.is_empty())
        else {
            return Err(MailError::UnknownSender(from.to_string()));
        };

        warn!(%from, %default_author, "unknown sender, using default public author");
        directory
            .user_by_username(default_author)
            .ok_or_else(|| MailError::MisconfiguredDefaultAuthor(default_author.to_string()))
    }

    pub fn process_received_mail(&self, mail: &ReceivedMail, sender: &MailUser) -> TaskDraft {
        let subject = mail.subject.trim();
        let mut task = TaskDraft {
            author_id: sender.id.clone(),
            original_email_source: mail.header("from").map(str::to_string),
            priority: TaskPriority::NeedsTriage,
            title: if subject.is_empty() {
                UNTITLED_TASK.to_string()
            } else {
                subject.to_string()
            },
            description: mail.body.trim().to_string(),
            owner_id: None,
            project_ids: Vec::new(),
            cc_ids: Vec::new(),
        };

        for rule in &self.config.routing {
            let routed = mail
                .to_and_cc_addresses()
                .any(|address| addresses_match(&rule.address, address));
            if !routed {
                continue;
            }
            debug!(address = %rule.address, "applying mail routing rule");
            if let Some(owner) = &rule.owner {
                task.owner_id = Some(owner.clone());
            }
            task.project_ids = rule.projects.clone();
            for cc in &rule.cc {
                if !task.cc_ids.contains(cc) {
                    task.cc_ids.push(cc.clone());
                }
            }
        }

        task
    }

    /// `Ok(None)` when the receiver is disabled or the mail is not addressed to it.
    pub fn receive<D: UserDirectory>(
        &self,
        mail: &ReceivedMail,
        directory: &D,
    ) -> Result<Option<TaskDraft>, MailError> {
        if !self.is_enabled() || !self.can_accept_mail(mail) {
            return Ok(None);
        }
        let sender = self.load_sender(mail, directory)?;
        Ok(Some(self.process_received_mail(mail, &sender)))
    }
}

#[cfg(test)]
#[path = "receiver_tests.rs"]
mod tests;
