use crate::config::SmtpConfig;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{Message, SmtpTransport, Transport};
use rand::Rng;
use std::error::Error;

/// Sends password reset tokens through an SMTP relay.
#[derive(Clone)]
pub struct Mailer {
    smtp: SmtpTransport,
    from: Mailbox,
}

impl Mailer {
    /// Builds a mailer for the configured relay.
    ///
    /// Port 465 uses implicit TLS, any other port STARTTLS.
    pub fn new(config: &SmtpConfig) -> Result<Self, Box<dyn Error>> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());

        let tls_parameters = TlsParameters::new(config.host.clone())?;
        let tls = if config.port == 465 {
            Tls::Wrapper(tls_parameters)
        } else {
            Tls::Required(tls_parameters)
        };

        let smtp = SmtpTransport::relay(&config.host)?
            .credentials(creds)
            .port(config.port)
            .tls(tls)
            .build();

        Ok(Mailer {
            smtp,
            from: config.from.parse()?,
        })
    }

    pub fn send_password_reset(&self, to_email: &str, token: &str) -> Result<(), Box<dyn Error>> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(to_email.parse()?)
            .subject("Password Reset Request")
            .body(format!(
                "Your password reset token is: {}\nThis token will expire in 1 hour.",
                token
            ))?;

        self.smtp.send(&email)?;
        Ok(())
    }
}

/// Random 64 character hex token for password resets.
pub fn generate_reset_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().r#gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
