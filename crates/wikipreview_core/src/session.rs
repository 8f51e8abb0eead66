use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use tracing::debug;

use crate::assemble::{RenderedDocument, error_document, loading_document};

/// An externally owned renderer that can show one HTML document and a title.
pub trait DisplaySurface {
    fn set_html(&mut self, html: &str) -> Result<()>;
    fn set_title(&mut self, title: &str) -> Result<()>;
    fn close(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceOptions {
    pub title: String,
    pub enable_scripts: bool,
}

/// Creates display surfaces. The host keeps the [`CloseSignal`] and raises
/// it when the user closes the surface.
pub trait SurfaceHost {
    type Surface: DisplaySurface;

    fn create_surface(
        &mut self,
        options: &SurfaceOptions,
        on_closed: CloseSignal,
    ) -> Result<Self::Surface>;
}

#[derive(Debug, Clone, Default)]
pub struct CloseSignal(Arc<AtomicBool>);

impl CloseSignal {
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct PreviewSession<S> {
    surface: S,
    closed: CloseSignal,
}

impl<S: DisplaySurface> PreviewSession<S> {
    fn new(surface: S, closed: CloseSignal) -> Self {
        Self { surface, closed }
    }

    pub fn is_open(&self) -> bool {
        !self.closed.is_raised()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn show_loading(&mut self) -> Result<()> {
        self.surface.set_html(&loading_document())
    }

    pub fn show_rendered(&mut self, document: &RenderedDocument) -> Result<()> {
        self.surface.set_html(&document.html)?;
        self.surface.set_title(&document.title)
    }

    /// Replace the content with an error placeholder. The title is kept.
    pub fn show_error(&mut self, message: &str) -> Result<()> {
        self.surface.set_html(&error_document(message))
    }

    pub fn close(&mut self) {
        self.surface.close();
        self.closed.raise();
    }
}

/// Monotonic generation number of a live-preview request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RequestTicket(u64);

impl RequestTicket {
    pub fn generation(self) -> u64 {
        self.0
    }
}

/// Owns the single tracked live-preview session and hands out untracked
/// viewer sessions.
pub struct PanelSessions<H: SurfaceHost> {
    host: H,
    options: SurfaceOptions,
    live: Option<PreviewSession<H::Surface>>,
    latest_generation: u64,
}

impl<H: SurfaceHost> PanelSessions<H> {
    pub fn new(host: H, options: SurfaceOptions) -> Self {
        Self {
            host,
            options,
            live: None,
            latest_generation: 0,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn live_session(&self) -> Option<&PreviewSession<H::Surface>> {
        self.live.as_ref().filter(|session| session.is_open())
    }

    pub fn live_session_mut(&mut self) -> Option<&mut PreviewSession<H::Surface>> {
        self.live.as_mut().filter(|session| session.is_open())
    }

    pub fn get_or_create_session(&mut self) -> Result<&mut PreviewSession<H::Surface>> {
        if self.live.as_ref().is_some_and(|session| !session.is_open()) {
            self.on_session_closed_by_user();
        }
        if self.live.is_none() {
            let closed = CloseSignal::default();
            let surface = self.host.create_surface(&self.options, closed.clone())?;
            debug!(title = %self.options.title, "created live preview surface");
            self.live = Some(PreviewSession::new(surface, closed));
        }
        match self.live.as_mut() {
            Some(session) => Ok(session),
            None => anyhow::bail!("live preview session was not created"),
        }
    }

    /// Forget the tracked session; the next preview creates a new surface.
    pub fn on_session_closed_by_user(&mut self) {
        if self.live.take().is_some() {
            debug!("live preview surface closed");
        }
    }

    /// An independent surface for the page viewer. It is never tracked or
    /// reused.
    pub fn open_viewer(&mut self, title: &str) -> Result<PreviewSession<H::Surface>> {
        let options = SurfaceOptions {
            title: title.to_string(),
            enable_scripts: self.options.enable_scripts,
        };
        let closed = CloseSignal::default();
        let surface = self.host.create_surface(&options, closed.clone())?;
        Ok(PreviewSession::new(surface, closed))
    }

    pub fn begin_request(&mut self) -> RequestTicket {
        self.latest_generation += 1;
        RequestTicket(self.latest_generation)
    }

    pub fn is_current(&self, ticket: RequestTicket) -> bool {
        ticket.0 == self.latest_generation
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::rc::Rc;

    use anyhow::Result;

    use super::{CloseSignal, DisplaySurface, SurfaceHost, SurfaceOptions};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum SurfaceEvent {
        Created { id: usize, title: String },
        Html { id: usize, html: String },
        Title { id: usize, title: String },
        Closed { id: usize },
    }

    /// Shared event log so tests can order surface writes against API calls.
    pub type EventLog = Rc<RefCell<Vec<String>>>;

    pub struct RecordingSurface {
        id: usize,
        pub html: String,
        pub title: String,
        events: Rc<RefCell<Vec<SurfaceEvent>>>,
        log: EventLog,
    }

    impl DisplaySurface for RecordingSurface {
        fn set_html(&mut self, html: &str) -> Result<()> {
            self.html = html.to_string();
            self.log.borrow_mut().push(format!("surface{}:html", self.id));
            self.events.borrow_mut().push(SurfaceEvent::Html {
                id: self.id,
                html: html.to_string(),
            });
            Ok(())
        }

        fn set_title(&mut self, title: &str) -> Result<()> {
            self.title = title.to_string();
            self.events.borrow_mut().push(SurfaceEvent::Title {
                id: self.id,
                title: title.to_string(),
            });
            Ok(())
        }

        fn close(&mut self) {
            self.events
                .borrow_mut()
                .push(SurfaceEvent::Closed { id: self.id });
        }
    }

    #[derive(Default)]
    pub struct RecordingHost {
        pub events: Rc<RefCell<Vec<SurfaceEvent>>>,
        pub signals: Vec<CloseSignal>,
        pub log: EventLog,
    }

    impl RecordingHost {
        pub fn with_log(log: EventLog) -> Self {
            Self {
                log,
                ..Self::default()
            }
        }

        pub fn created(&self) -> usize {
            self.signals.len()
        }

        /// Simulate the user closing surface `id`.
        pub fn user_closes(&self, id: usize) {
            self.signals[id].raise();
        }

        pub fn events(&self) -> Vec<SurfaceEvent> {
            self.events.borrow().clone()
        }
    }

    impl SurfaceHost for RecordingHost {
        type Surface = RecordingSurface;

        fn create_surface(
            &mut self,
            options: &SurfaceOptions,
            on_closed: CloseSignal,
        ) -> Result<RecordingSurface> {
            let id = self.signals.len();
            self.signals.push(on_closed);
            self.events.borrow_mut().push(SurfaceEvent::Created {
                id,
                title: options.title.clone(),
            });
            Ok(RecordingSurface {
                id,
                html: String::new(),
                title: options.title.clone(),
                events: Rc::clone(&self.events),
                log: Rc::clone(&self.log),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{RecordingHost, SurfaceEvent};
    use super::*;

    fn sessions() -> PanelSessions<RecordingHost> {
        PanelSessions::new(
            RecordingHost::default(),
            SurfaceOptions {
                title: "Wikitext Preview".to_string(),
                enable_scripts: false,
            },
        )
    }

    #[test]
    fn live_session_is_reused() {
        let mut sessions = sessions();
        sessions.get_or_create_session().expect("first");
        sessions.get_or_create_session().expect("second");
        assert_eq!(sessions.host().created(), 1);
    }

    #[test]
    fn user_close_clears_tracked_session() {
        let mut sessions = sessions();
        sessions.get_or_create_session().expect("first");
        sessions.host().user_closes(0);
        assert!(sessions.live_session().is_none());

        sessions.get_or_create_session().expect("second");
        assert_eq!(sessions.host().created(), 2);
        assert!(sessions.live_session().is_some());
    }

    #[test]
    fn explicit_close_notifies_surface() {
        let mut sessions = sessions();
        sessions.get_or_create_session().expect("session").close();
        assert!(sessions.live_session().is_none());
        assert!(
            sessions
                .host()
                .events()
                .contains(&SurfaceEvent::Closed { id: 0 })
        );
        sessions.on_session_closed_by_user();
        sessions.get_or_create_session().expect("fresh");
        assert_eq!(sessions.host().created(), 2);
    }

    #[test]
    fn viewer_sessions_are_independent() {
        let mut sessions = sessions();
        sessions.get_or_create_session().expect("live");
        let first = sessions.open_viewer("Wiki Page Viewer").expect("viewer");
        let second = sessions.open_viewer("Wiki Page Viewer").expect("viewer");
        assert_eq!(sessions.host().created(), 3);
        assert!(first.is_open() && second.is_open());
        sessions.get_or_create_session().expect("live again");
        assert_eq!(sessions.host().created(), 3);
    }

    #[test]
    fn show_operations_write_surface() {
        let mut sessions = sessions();
        let session = sessions.get_or_create_session().expect("session");
        session.show_loading().expect("loading");
        assert!(session.surface().html.contains("Loading"));

        session
            .show_rendered(&RenderedDocument {
                html: "<p>doc</p>".to_string(),
                title: "Wikitext Preview: Doc".to_string(),
            })
            .expect("rendered");
        assert_eq!(session.surface().html, "<p>doc</p>");
        assert_eq!(session.surface().title, "Wikitext Preview: Doc");

        session.show_error("boom").expect("error");
        assert!(session.surface().html.contains("boom"));
        assert_eq!(session.surface().title, "Wikitext Preview: Doc");
    }

    #[test]
    fn tickets_are_monotonic() {
        let mut sessions = sessions();
        let first = sessions.begin_request();
        assert!(sessions.is_current(first));
        let second = sessions.begin_request();
        assert!(second > first);
        assert!(!sessions.is_current(first));
        assert!(sessions.is_current(second));
        assert_eq!(second.generation(), 2);
    }
}
