//! Preview, view, fetch and push workflows.
//!
//! [`PreviewContext`] holds everything the workflows share: the API
//! collaborator, the panel sessions, resolved settings and the optional
//! logged-in user. Nothing here is process-global.

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::assemble::{PREVIEW_LABEL, VIEWER_LABEL, assemble};
use crate::client::WikiApi;
use crate::config::WikiConfig;
use crate::decode::{
    EditReceipt, PageSource, SourceOutcome, decode_edit, decode_parse, decode_source,
};
use crate::error::PreviewError;
use crate::request::ParseRequest;
use crate::session::{
    DisplaySurface, PanelSessions, PreviewSession, RequestTicket, SurfaceHost, SurfaceOptions,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewSettings {
    pub base_url: String,
    pub style_css: String,
    pub get_css: bool,
    pub redirects: bool,
    pub enable_scripts: bool,
    pub content_model: String,
}

impl PreviewSettings {
    /// Returns None when no wiki host is configured.
    pub fn from_config(config: &WikiConfig) -> Option<Self> {
        Some(Self {
            base_url: config.base_url()?,
            style_css: config.preview.preview_css_style.clone(),
            get_css: config.preview.get_css,
            redirects: config.preview.redirects,
            enable_scripts: config.preview.enable_javascript,
            content_model: config.content_model(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewStatus {
    /// Nothing to do: empty input, or the surface went away.
    Skipped,
    Rendered { title: String },
    /// Soft failure; the surface was left as it was.
    Warning(PreviewError),
    /// The surface now shows the error placeholder.
    Failed(PreviewError),
    /// A newer request was issued before this response arrived.
    Stale,
}

pub struct PageView<S> {
    pub status: PreviewStatus,
    pub session: PreviewSession<S>,
}

pub struct PreviewContext<A: WikiApi, H: SurfaceHost> {
    api: A,
    panels: PanelSessions<H>,
    settings: PreviewSettings,
    credentials: Option<(String, String)>,
    logged_in_as: Option<String>,
}

impl<A: WikiApi, H: SurfaceHost> PreviewContext<A, H> {
    pub fn new(
        api: A,
        host: H,
        settings: PreviewSettings,
        credentials: Option<(String, String)>,
    ) -> Self {
        let options = SurfaceOptions {
            title: PREVIEW_LABEL.to_string(),
            enable_scripts: settings.enable_scripts,
        };
        Self {
            api,
            panels: PanelSessions::new(host, options),
            settings,
            credentials,
            logged_in_as: None,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn panels(&self) -> &PanelSessions<H> {
        &self.panels
    }

    pub fn panels_mut(&mut self) -> &mut PanelSessions<H> {
        &mut self.panels
    }

    pub fn logged_in_as(&self) -> Option<&str> {
        self.logged_in_as.as_deref()
    }

    /// Render `text` into the live preview session.
    pub fn preview_document(&mut self, text: &str) -> Result<PreviewStatus> {
        if text.trim().is_empty() {
            debug!("empty document, nothing to preview");
            return Ok(PreviewStatus::Skipped);
        }
        let ticket = self.start_live_preview()?;
        let request = ParseRequest::by_text(text, Some(self.settings.content_model.clone()))
            .with_head_html(self.settings.get_css);
        let response = self.api.parse(&request);
        self.finish_live_preview(ticket, response)
    }

    /// Issue a new request generation and put the live surface into its
    /// loading state. Must be called before the request is sent.
    pub fn start_live_preview(&mut self) -> Result<RequestTicket> {
        let ticket = self.panels.begin_request();
        self.panels.get_or_create_session()?.show_loading()?;
        debug!(generation = ticket.generation(), "live preview loading");
        Ok(ticket)
    }

    /// Apply a parse response to the live surface unless a newer request has
    /// been issued since `ticket`.
    pub fn finish_live_preview(
        &mut self,
        ticket: RequestTicket,
        response: Result<Value>,
    ) -> Result<PreviewStatus> {
        if !self.panels.is_current(ticket) {
            warn!(
                generation = ticket.generation(),
                "dropping stale preview response"
            );
            return Ok(PreviewStatus::Stale);
        }
        let Some(session) = self.panels.live_session_mut() else {
            debug!("live preview closed before the response arrived");
            return Ok(PreviewStatus::Skipped);
        };
        apply_response(session, response, &self.settings, PREVIEW_LABEL)
    }

    /// Render a wiki page into a fresh, untracked surface.
    pub fn view_page(&mut self, title: &str) -> Result<Option<PageView<H::Surface>>> {
        let title = title.trim();
        if title.is_empty() {
            debug!("empty title, nothing to view");
            return Ok(None);
        }
        let mut session = self.panels.open_viewer(&format!("{VIEWER_LABEL}: {title}"))?;
        session.show_loading()?;
        let request = ParseRequest::by_title(title)
            .with_head_html(self.settings.get_css)
            .with_redirects(self.settings.redirects);
        let response = self.api.parse(&request);
        let status = apply_response(&mut session, response, &self.settings, VIEWER_LABEL)?;
        Ok(Some(PageView { status, session }))
    }

    /// Fetch the current wikitext of `title`. Soft failures and API errors
    /// come back as [`PreviewError`] inside the anyhow error.
    pub fn fetch_source(&mut self, title: &str) -> Result<Option<PageSource>> {
        let title = title.trim();
        if title.is_empty() {
            debug!("empty title, nothing to fetch");
            return Ok(None);
        }
        let raw = self.api.query_source(title, self.settings.redirects)?;
        match decode_source(&raw) {
            SourceOutcome::Found(page) => {
                info!(title = %page.title, bytes = page.content.len(), "fetched page source");
                Ok(Some(page))
            }
            SourceOutcome::ApiError { code, info } => Err(PreviewError::Api { code, info }.into()),
            SourceOutcome::Missing { title, reason } => {
                Err(PreviewError::MissingPage { title, reason }.into())
            }
            SourceOutcome::Interwiki { title, interwiki } => {
                Err(PreviewError::Interwiki { title, interwiki }.into())
            }
        }
    }

    /// Save `content` as a new revision of `title`, logging in first when
    /// needed.
    pub fn push_source(
        &mut self,
        title: &str,
        content: &str,
        summary: &str,
    ) -> Result<Option<EditReceipt>> {
        let title = title.trim();
        if title.is_empty() {
            debug!("empty title, nothing to push");
            return Ok(None);
        }
        if self.logged_in_as.is_none() && !self.login()? {
            bail!("push requires WIKI_BOT_USER and WIKI_BOT_PASS (or [auth] in the config file)");
        }
        let raw = self
            .api
            .edit(title, content, summary)
            .with_context(|| format!("failed to push {title}"))?;
        let receipt = decode_edit(title, &raw)?;
        info!(
            title = %receipt.title,
            revision = ?receipt.new_revision_id,
            no_change = receipt.no_change,
            "pushed page"
        );
        Ok(Some(receipt))
    }

    /// Log in with the configured credentials. Returns false when none are
    /// configured.
    pub fn login(&mut self) -> Result<bool> {
        let Some((user, password)) = self.credentials.clone() else {
            debug!("no credentials configured");
            return Ok(false);
        };
        self.api
            .login(&user, &password)
            .context("MediaWiki login failed")?;
        info!(user = %user, "logged in");
        self.logged_in_as = Some(user);
        Ok(true)
    }

    pub fn logout(&mut self) -> Result<()> {
        if self.logged_in_as.take().is_some() {
            self.api.logout().context("MediaWiki logout failed")?;
            info!("logged out");
        }
        Ok(())
    }
}

fn apply_response<S: DisplaySurface>(
    session: &mut PreviewSession<S>,
    response: Result<Value>,
    settings: &PreviewSettings,
    label: &str,
) -> Result<PreviewStatus> {
    let raw = match response {
        Ok(raw) => raw,
        Err(error) => {
            let failure = PreviewError::transport(&error);
            warn!(error = %failure, "preview request failed");
            session.show_error(&failure.to_string())?;
            return Ok(PreviewStatus::Failed(failure));
        }
    };

    let outcome = decode_parse(&raw);
    match assemble(&outcome, &settings.base_url, &settings.style_css, label) {
        Ok(document) => {
            session.show_rendered(&document)?;
            info!(title = %document.title, "rendered preview");
            Ok(PreviewStatus::Rendered {
                title: document.title,
            })
        }
        Err(failure) if failure.is_warning() => {
            warn!(warning = %failure, "preview left unchanged");
            Ok(PreviewStatus::Warning(failure))
        }
        Err(failure) => {
            warn!(error = %failure, "preview failed");
            session.show_error(&failure.to_string())?;
            Ok(PreviewStatus::Failed(failure))
        }
    }
}
