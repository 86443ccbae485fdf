use anyhow::Context as _;

use crate::domain::repository::{MailKind, Mailer};
use crate::error::IdentityError;

/// Mailer that posts send requests to the relay service as JSON.
#[derive(Clone)]
pub struct HttpMailer {
    pub client: reqwest::Client,
    pub relay_url: String,
    pub sender: String,
}

impl Mailer for HttpMailer {
    async fn send(
        &self,
        to: &str,
        kind: MailKind,
        context: serde_json::Value,
    ) -> Result<(), IdentityError> {
        let response = self
            .client
            .post(&self.relay_url)
            .json(&serde_json::json!({
                "from": self.sender,
                "to": to,
                "template": kind.template(),
                "context": context,
            }))
            .send()
            .await
            .context("mail relay request")?;
        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "mail relay returned {} for template {}",
                response.status(),
                kind.template()
            )
            .into());
        }
        Ok(())
    }
}
