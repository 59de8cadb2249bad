//! System email service for password-reset and verification emails.
//!
//! Sending is best-effort: when SMTP is not configured the send is skipped
//! with a warning instead of failing the request.

use anyhow::Result;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::EmailConfig;

/// Service for sending system emails
#[derive(Clone)]
pub struct EmailService {
    config: EmailConfig,
}

impl EmailService {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Check if email sending is configured and enabled
    pub fn is_enabled(&self) -> bool {
        self.config.is_configured()
    }

    /// Send a password reset email with the raw token embedded in a link
    pub async fn send_password_reset_email(&self, to_email: &str, token: &str) -> Result<()> {
        if !self.is_enabled() {
            tracing::warn!(
                "Email not configured, skipping password reset email to {}",
                to_email
            );
            return Ok(());
        }

        let reset_url = format!(
            "{}/reset-password?token={}",
            self.config.frontend_url, token
        );

        let subject = "Restablece tu contraseña";
        let text_body = format!(
            "Hola,\n\nRecibimos una solicitud para restablecer tu contraseña.\n\
             Abre este enlace para continuar:\n\n{}\n\n\
             Si no solicitaste este cambio, ignora este mensaje.\n",
            reset_url
        );
        let html_body = format!(
            "<p>Hola,</p>\
             <p>Recibimos una solicitud para restablecer tu contraseña.</p>\
             <p><a href=\"{}\">Restablecer contraseña</a></p>\
             <p>Si no solicitaste este cambio, ignora este mensaje.</p>",
            reset_url
        );

        self.send_email(to_email, subject, &html_body, &text_body)
            .await
    }

    /// Send an email-verification message
    pub async fn send_verification_email(&self, to_email: &str, token: &str) -> Result<()> {
        if !self.is_enabled() {
            tracing::warn!(
                "Email not configured, skipping verification email to {}",
                to_email
            );
            return Ok(());
        }

        let verify_url = format!("{}/verify-email?token={}", self.config.frontend_url, token);

        let subject = "Confirma tu correo";
        let text_body = format!(
            "Bienvenido!\n\nConfirma tu correo abriendo este enlace:\n\n{}\n",
            verify_url
        );
        let html_body = format!(
            "<p>Bienvenido!</p>\
             <p>Confirma tu correo haciendo clic en el siguiente enlace:</p>\
             <p><a href=\"{}\">Confirmar correo</a></p>",
            verify_url
        );

        self.send_email(to_email, subject, &html_body, &text_body)
            .await
    }

    /// Send an email with HTML and plain text versions
    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        html_body: &str,
        text_body: &str,
    ) -> Result<()> {
        let smtp_host = self
            .config
            .smtp_host
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("SMTP host not configured"))?;
        let from_address = self
            .config
            .from_address
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("From address not configured"))?;

        let from_mailbox = format!("{} <{}>", self.config.from_name, from_address);
        let from: Mailbox = from_mailbox.parse()?;
        let to: Mailbox = to_email.parse()?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        let mailer = if self.config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            mailer.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer
        };

        mailer.build().send(email).await?;

        tracing::info!("Sent email to {}", to_email);
        Ok(())
    }
}
