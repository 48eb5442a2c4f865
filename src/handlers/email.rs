//! Send an HTML mail per event over SMTP.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;
use tera::{Context, Tera};
use tracing::debug;

use super::{Event, Handler};
use crate::config::EmailConfig;
use crate::error::{Error, Result};

const BODY_TEMPLATE: &str = r#"<html>
	<body>
		Container {{ container }} in pod {{ namespace }}/{{ name }} is crashed<br>
		<h1>Reason:</h1>{{ reason }}
		<h1>Message:</h1>{{ message }}
		<h1>Logs:</h1>
		{% if logs %}{% for line in logs %}<div>{{ line }}</div>{% endfor %}{% else %}<div><strong>no logs</strong></div>{% endif %}
	</body>
</html>"#;

/// Port where SMTP runs over implicit TLS; anything else upgrades with STARTTLS.
const SMTPS_PORT: u16 = 465;

pub struct EmailHandler {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailHandler {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        if config.host.is_empty() {
            return Err(Error::Config("SMTP_HOST is required for the email handler".to_string()));
        }
        let from: Mailbox = config
            .username
            .parse()
            .map_err(|e| Error::Config(format!("bad sender {:?}: {e}", config.username)))?;
        let to = config
            .receivers
            .iter()
            .map(|r| {
                r.parse::<Mailbox>()
                    .map_err(|e| Error::Config(format!("bad receiver {r:?}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        if to.is_empty() {
            return Err(Error::Config("SMTP_RECEIVERS must name at least one address".to_string()));
        }

        let builder = if config.port == SMTPS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
        };
        let mut builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(30)));
        if let Some(ref password) = config.password {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                password.expose_secret().to_string(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            to,
        })
    }

    fn message(&self, event: &Event) -> Result<Message> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(event.summary())
            .date_now()
            .header(ContentType::TEXT_HTML);
        for to in &self.to {
            builder = builder.to(to.clone());
        }
        builder
            .body(render_body(event)?)
            .map_err(|e| Error::Email(e.to_string()))
    }
}

/// HTML body for `event`. Event text is escaped.
pub fn render_body(event: &Event) -> Result<String> {
    let context = Context::from_serialize(event)?;
    Ok(Tera::one_off(BODY_TEMPLATE, &context, true)?)
}

#[async_trait]
impl Handler for EmailHandler {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn handle(&self, event: Event) -> Result<()> {
        let message = self.message(&event)?;
        self.transport.send(message).await?;
        debug!(receivers = self.to.len(), "crash report mailed");
        Ok(())
    }
}
