//! Transactional email through the Resend API (`POST /emails`).

use anyhow::{bail, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::project::ProjectRow;

const RESEND_URL: &str = "https://api.resend.com/emails";

#[derive(Serialize)]
struct ResendEmail<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

#[derive(Clone)]
pub struct Mailer {
    client: reqwest::Client,
    api_key: Option<String>,
    from: String,
    app_url: String,
}

impl Mailer {
    pub fn new(cfg: &AppConfig) -> Self {
        Mailer {
            client: super::http_client(),
            api_key: cfg.resend_api_key.clone(),
            from: cfg.email_from.clone(),
            app_url: cfg.app_url.clone(),
        }
    }

    /// A mailer that never sends (no API key).
    pub fn disabled(app_url: &str) -> Self {
        Mailer {
            client: super::http_client(),
            api_key: None,
            from: String::new(),
            app_url: app_url.to_string(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn app_url(&self) -> &str {
        &self.app_url
    }

    /// Send one email. Without an API key this logs and returns `Ok`.
    pub async fn send(&self, to: &str, subject: &str, html: &str) -> Result<()> {
        let Some(key) = self.api_key.as_deref() else {
            info!(to, subject, "email disabled, skipping");
            return Ok(());
        };
        let body = ResendEmail {
            from: &self.from,
            to: [to],
            subject,
            html,
        };
        let response = self
            .client
            .post(RESEND_URL)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            bail!("resend returned {}: {}", status, text.trim());
        }
        Ok(())
    }

    /// [`send`](Self::send), logging failures instead of returning them.
    pub async fn send_best_effort(&self, to: &str, subject: &str, html: &str) {
        if let Err(e) = self.send(to, subject, html).await {
            warn!(to, subject, error = %e, "email delivery failed");
        }
    }
}

/// Minimal HTML escaping for user-provided text in templates.
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// `(subject, html)` telling a professional a project is open to them.
pub fn new_project_available(project: &ProjectRow, app_url: &str) -> (String, String) {
    let subject = format!("Novo projeto disponível: {}", project.title);
    let html = format!(
        "<p>Um novo projeto na categoria <strong>{}</strong> está disponível.</p>\
         <p><strong>{}</strong></p><p>{}</p>\
         <p><a href=\"{}/projetos/{}\">Ver projeto</a>. O primeiro a aceitar fica com ele.</p>",
        escape(&project.category),
        escape(&project.title),
        escape(&project.description),
        app_url,
        project.id
    );
    (subject, html)
}

/// `(subject, html)` telling a client their project was accepted.
pub fn project_accepted(project: &ProjectRow, professional_name: &str, app_url: &str) -> (String, String) {
    let subject = format!("Seu projeto \"{}\" foi aceito", project.title);
    let html = format!(
        "<p><strong>{}</strong> aceitou o seu projeto <strong>{}</strong>.</p>\
         <p><a href=\"{}/acompanhar/{}\">Acompanhe o andamento</a>.</p>",
        escape(professional_name),
        escape(&project.title),
        app_url,
        project.tracking_token
    );
    (subject, html)
}

/// `(subject, html)` inviting a member to a confraternity.
pub fn confraternity_invite(
    inviter_name: &str,
    scheduled_for: chrono::DateTime<chrono::Utc>,
    location: &str,
    app_url: &str,
) -> (String, String) {
    let subject = format!("{} convidou você para uma confraria", inviter_name);
    let html = format!(
        "<p><strong>{}</strong> quer marcar uma confraria com você.</p>\
         <p>Quando: {}<br>Onde: {}</p>\
         <p><a href=\"{}/confraria\">Responder convite</a></p>",
        escape(inviter_name),
        scheduled_for.format("%d/%m/%Y %H:%M UTC"),
        escape(location),
        app_url
    );
    (subject, html)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_neutralizes_markup() {
        assert_eq!(
            escape("<script>alert('x') & \"y\"</script>"),
            "&lt;script&gt;alert(&#39;x&#39;) &amp; &quot;y&quot;&lt;/script&gt;"
        );
    }

    #[test]
    fn invite_template_escapes_user_text() {
        let when = chrono::DateTime::parse_from_rfc3339("2026-04-01T19:30:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let (subject, html) =
            confraternity_invite("Ana <b>", when, "Bar & Cia", "https://club.example");
        assert!(subject.contains("Ana <b>"));
        assert!(html.contains("Ana &lt;b&gt;"));
        assert!(html.contains("Bar &amp; Cia"));
        assert!(html.contains("01/04/2026 19:30"));
        assert!(html.contains("https://club.example/confraria"));
    }

    #[tokio::test]
    async fn disabled_mailer_skips_without_error() {
        let mailer = Mailer::disabled("http://localhost:3000");
        assert!(!mailer.is_enabled());
        mailer
            .send("someone@example.com", "hi", "<p>hi</p>")
            .await
            .unwrap();
    }
}
