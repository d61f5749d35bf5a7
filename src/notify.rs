use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::info;

use crate::config::AppConfig;

pub const KIND_DEADLINE_REMINDER: &str = "deadline_reminder";
pub const KIND_DEADLINE_OVERDUE: &str = "deadline_overdue";
pub const KIND_TRIAL_WELCOME: &str = "trial_welcome";
pub const KIND_TRIAL_WARNING_7: &str = "trial_warning_7";
pub const KIND_TRIAL_WARNING_2: &str = "trial_warning_2";
pub const KIND_TRIAL_EXPIRED: &str = "trial_expired";

/// A rendered notification ready for transport.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub subject: String,
    pub body: String,
}

/// Per-user notification preferences, stored as JSON on the user row.
/// Partial stored objects fill the missing fields from these defaults.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NotificationPreferences {
    #[serde(default = "default_true")]
    pub email_enabled: bool,
    #[serde(default = "default_true")]
    pub new_grievance: bool,
    #[serde(default = "default_true")]
    pub deadline_reminders: bool,
    #[serde(default = "default_true")]
    pub status_updates: bool,
    #[serde(default = "default_true")]
    pub new_notes: bool,
    #[serde(default = "default_true")]
    pub grievance_resolved: bool,
    #[serde(default = "default_reminder_days")]
    pub reminder_days: Vec<i64>,
}

fn default_true() -> bool {
    true
}

fn default_reminder_days() -> Vec<i64> {
    vec![3, 1, 0]
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            email_enabled: true,
            new_grievance: true,
            deadline_reminders: true,
            status_updates: true,
            new_notes: true,
            grievance_resolved: true,
            reminder_days: default_reminder_days(),
        }
    }
}

/// Defaults overridden by whatever the user has stored. An unparseable stored
/// object falls back to the defaults rather than silencing notifications.
pub fn effective_preferences(stored: Option<&serde_json::Value>) -> NotificationPreferences {
    stored
        .and_then(|value| serde_json::from_value(value.clone()).ok())
        .unwrap_or_default()
}

/// Outbound notification transport. The sweeps and the registration flow only
/// see this contract; the SMTP wiring stays behind it so tests can substitute
/// an in-memory fake.
#[async_trait]
pub trait NotificationDispatch: Send + Sync + 'static {
    async fn send(&self, kind: &str, recipient: &str, message: &EmailMessage) -> Result<()>;
}

pub struct SmtpDispatch {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpDispatch {
    pub fn from_config(config: &AppConfig) -> Result<Option<Self>> {
        let Some(host) = config.smtp_host.as_deref() else {
            return Ok(None);
        };

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .context("failed to configure SMTP relay")?
            .port(config.smtp_port);

        if let (Some(user), Some(password)) =
            (config.smtp_user.clone(), config.smtp_password.clone())
        {
            builder = builder.credentials(Credentials::new(user, password));
        }

        Ok(Some(Self {
            transport: builder.build(),
            from: config.smtp_from.clone(),
        }))
    }
}

#[async_trait]
impl NotificationDispatch for SmtpDispatch {
    async fn send(&self, kind: &str, recipient: &str, message: &EmailMessage) -> Result<()> {
        let email = Message::builder()
            .from(
                format!("UnionCase <{}>", self.from)
                    .parse()
                    .context("invalid sender address")?,
            )
            .to(recipient.parse().context("invalid recipient address")?)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .context("failed to assemble email")?;

        self.transport
            .send(email)
            .await
            .with_context(|| format!("failed to send {kind} email"))?;
        Ok(())
    }
}

/// Used when SMTP is not configured: notifications are written to the log and
/// reported as delivered.
pub struct LogDispatch;

#[async_trait]
impl NotificationDispatch for LogDispatch {
    async fn send(&self, kind: &str, recipient: &str, message: &EmailMessage) -> Result<()> {
        info!(kind, recipient, subject = %message.subject, "smtp not configured, logging notification");
        Ok(())
    }
}

fn support_footer(config: &AppConfig) -> String {
    format!(
        "Questions? Contact us at {} or {}.",
        config.support_email, config.support_phone
    )
}

fn format_date(at: NaiveDateTime) -> String {
    at.format("%B %-d, %Y").to_string()
}

pub fn deadline_reminder_email(
    config: &AppConfig,
    first_name: &str,
    grievance_number: &str,
    deadline_type: &str,
    deadline_date: NaiveDateTime,
    description: Option<&str>,
    days_until: i64,
) -> EmailMessage {
    let urgency = match days_until {
        0 => "TODAY".to_string(),
        1 => "tomorrow".to_string(),
        other => format!("in {other} days"),
    };
    let mut body = format!(
        "Hello {first_name},\n\n\
         A deadline for grievance {grievance_number} is due {urgency}.\n\n\
         Type: {deadline_type}\n\
         Due date: {}\n",
        format_date(deadline_date)
    );
    if let Some(description) = description {
        body.push_str(&format!("Description: {description}\n"));
    }
    body.push_str(&format!(
        "\nPlease make sure all required actions are completed before the deadline.\n\n{}\n",
        support_footer(config)
    ));

    EmailMessage {
        subject: format!("Deadline {urgency} - {grievance_number}"),
        body,
    }
}

pub fn deadline_overdue_email(
    config: &AppConfig,
    first_name: &str,
    grievance_number: &str,
    deadline_type: &str,
    deadline_date: NaiveDateTime,
    description: Option<&str>,
) -> EmailMessage {
    let mut body = format!(
        "Hello {first_name},\n\n\
         A deadline for grievance {grievance_number} has passed.\n\n\
         Type: {deadline_type}\n\
         Was due: {}\n",
        format_date(deadline_date)
    );
    if let Some(description) = description {
        body.push_str(&format!("Description: {description}\n"));
    }
    body.push_str(&format!(
        "\nPlease take immediate action to address this overdue item.\n\n{}\n",
        support_footer(config)
    ));

    EmailMessage {
        subject: format!("OVERDUE: {grievance_number} - Action Required"),
        body,
    }
}

pub fn trial_welcome_email(
    config: &AppConfig,
    first_name: &str,
    trial_ends_at: NaiveDateTime,
) -> EmailMessage {
    EmailMessage {
        subject: "Welcome to UnionCase - Your 30-Day Trial Starts Now".to_string(),
        body: format!(
            "Hello {first_name},\n\n\
             Thank you for registering with UnionCase, the grievance tracking\n\
             system for postal workers.\n\n\
             Your free trial runs through {}. During the trial you can file and\n\
             track grievances, set deadlines with automated reminders, upload\n\
             documents, and collaborate with stewards and representatives.\n\n\
             We'll remind you before the trial period ends.\n\n{}\n",
            format_date(trial_ends_at),
            support_footer(config)
        ),
    }
}

pub fn trial_warning_email(
    config: &AppConfig,
    first_name: &str,
    trial_ends_at: NaiveDateTime,
    days_left: i64,
) -> EmailMessage {
    let subject = if days_left <= 2 {
        format!("URGENT: Trial Ends in {days_left} Days - Action Required")
    } else {
        format!("Trial Ending Soon - {days_left} Days Remaining")
    };
    EmailMessage {
        subject,
        body: format!(
            "Hello {first_name},\n\n\
             Your UnionCase trial ends in {days_left} days, on {}.\n\n\
             To keep uninterrupted access to your grievance records, contact us\n\
             to activate your subscription before the trial ends.\n\n{}\n",
            format_date(trial_ends_at),
            support_footer(config)
        ),
    }
}

pub fn trial_expired_email(config: &AppConfig, first_name: &str) -> EmailMessage {
    EmailMessage {
        subject: "Your UnionCase Trial Has Expired".to_string(),
        body: format!(
            "Hello {first_name},\n\n\
             Your 30-day UnionCase trial has ended and your account has been\n\
             suspended. Your grievance records, documents and notes are safely\n\
             stored and will be available again as soon as a subscription is\n\
             activated.\n\n{}\n",
            support_footer(config)
        ),
    }
}
