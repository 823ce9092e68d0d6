use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use tracing::info;

use crate::auth::repo_types::User;
use crate::auth::token::Token;
use crate::config::MailConfig;

/// Outgoing account mail. Each call gets the freshly issued plaintext token;
/// delivery is the implementation's business, the caller does not retry.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_activation(&self, user: &User, token: &Token) -> anyhow::Result<()>;
    async fn send_password_reset(&self, user: &User, token: &Token) -> anyhow::Result<()>;
}

/// Builds the links embedded in account mail.
#[derive(Debug, Clone)]
pub struct Links {
    base_url: String,
}

impl Links {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    fn link(&self, resource: &str, user: &User, token: &Token) -> String {
        format!(
            "{}/{}/{}/edit?email={}",
            self.base_url,
            resource,
            token.as_str(),
            utf8_percent_encode(&user.email, NON_ALPHANUMERIC)
        )
    }

    pub fn activation(&self, user: &User, token: &Token) -> String {
        self.link("account_activations", user, token)
    }

    pub fn password_reset(&self, user: &User, token: &Token) -> String {
        self.link("password_resets", user, token)
    }
}

/// Development mailer: writes the link to the log.
#[derive(Debug, Clone)]
pub struct LogMailer {
    links: Links,
}

impl LogMailer {
    pub fn new(links: Links) -> Self {
        Self { links }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send_activation(&self, user: &User, token: &Token) -> anyhow::Result<()> {
        info!(user_id = %user.id, email = %user.email, link = %self.links.activation(user, token), "activation mail");
        Ok(())
    }

    async fn send_password_reset(&self, user: &User, token: &Token) -> anyhow::Result<()> {
        info!(user_id = %user.id, email = %user.email, link = %self.links.password_reset(user, token), "password reset mail");
        Ok(())
    }
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    links: Links,
}

impl SmtpMailer {
    pub fn new(host: &str, config: &MailConfig, links: Links) -> anyhow::Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .context("smtp relay")?
            .port(config.smtp_port);
        if let (Some(user), Some(pass)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        let from: Mailbox = config.from.parse().context("parse MAIL_FROM")?;
        Ok(Self {
            transport: builder.build(),
            from,
            links,
        })
    }

    async fn deliver(&self, user: &User, subject: &str, body: String) -> anyhow::Result<()> {
        let address: Address = user.email.parse().context("parse recipient")?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(Mailbox::new(Some(user.name.clone()), address))
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .context("build message")?;
        self.transport.send(message).await.context("smtp send")?;
        info!(user_id = %user.id, subject, "mail sent");
        Ok(())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_activation(&self, user: &User, token: &Token) -> anyhow::Result<()> {
        let body = format!(
            "Hi {},\n\nWelcome! Click the link below to activate your account:\n\n{}\n",
            user.name,
            self.links.activation(user, token)
        );
        self.deliver(user, "Account activation", body).await
    }

    async fn send_password_reset(&self, user: &User, token: &Token) -> anyhow::Result<()> {
        let body = format!(
            "To reset your password click the link below:\n\n{}\n\n\
             This link expires shortly.\n\
             If you did not request your password to be reset, please ignore this email.\n",
            self.links.password_reset(user, token)
        );
        self.deliver(user, "Password reset", body).await
    }
}

/// SMTP when a host is configured, the log otherwise.
pub fn from_config(config: &MailConfig, base_url: &str) -> anyhow::Result<Arc<dyn Mailer>> {
    let links = Links::new(base_url);
    match &config.smtp_host {
        Some(host) => Ok(Arc::new(SmtpMailer::new(host, config, links)?)),
        None => Ok(Arc::new(LogMailer::new(links))),
    }
}
