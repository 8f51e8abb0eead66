use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use slug::slugify;
use tracing::debug;
use wikipreview_core::assemble::{escape_text, inject_after_head_open};
use wikipreview_core::session::{CloseSignal, DisplaySurface, SurfaceHost, SurfaceOptions};

const BLOCK_SCRIPTS_META: &str =
    "<meta http-equiv=\"Content-Security-Policy\" content=\"script-src 'none'\">";

/// Where file surfaces are written.
#[derive(Debug, Clone)]
pub enum OutputTarget {
    /// Every surface writes this file.
    File(PathBuf),
    /// Each surface gets its own file named after its title. Files already on
    /// disk are never reused.
    Directory(PathBuf),
}

/// Display surfaces backed by HTML files. Deleting a surface's file counts as
/// the user closing it; [`FileSurfaceHost::sweep_closed`] raises the signal.
pub struct FileSurfaceHost {
    target: OutputTarget,
    issued: Vec<PathBuf>,
    watched: Vec<(PathBuf, CloseSignal)>,
}

impl FileSurfaceHost {
    pub fn new(target: OutputTarget) -> Self {
        Self {
            target,
            issued: Vec::new(),
            watched: Vec::new(),
        }
    }

    /// Raise the close signal of every surface whose file has disappeared.
    /// Returns how many surfaces were closed by this sweep.
    pub fn sweep_closed(&mut self) -> usize {
        let mut closed = 0;
        self.watched.retain(|(path, signal)| {
            if signal.is_raised() {
                return false;
            }
            if path.exists() {
                return true;
            }
            debug!(path = %path.display(), "surface file removed");
            signal.raise();
            closed += 1;
            false
        });
        closed
    }

    fn next_path(&mut self, title: &str) -> PathBuf {
        let path = match &self.target {
            OutputTarget::File(path) => path.clone(),
            OutputTarget::Directory(dir) => {
                let stem = file_stem(title);
                let mut candidate = dir.join(format!("{stem}.html"));
                let mut counter = 2;
                while self.issued.contains(&candidate) || candidate.exists() {
                    candidate = dir.join(format!("{stem}-{counter}.html"));
                    counter += 1;
                }
                candidate
            }
        };
        self.issued.push(path.clone());
        path
    }
}

impl SurfaceHost for FileSurfaceHost {
    type Surface = FileSurface;

    fn create_surface(
        &mut self,
        options: &SurfaceOptions,
        on_closed: CloseSignal,
    ) -> Result<FileSurface> {
        let path = self.next_path(&options.title);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        self.watched.push((path.clone(), on_closed));
        Ok(FileSurface {
            path,
            title: options.title.clone(),
            enable_scripts: options.enable_scripts,
            html: None,
        })
    }
}

#[derive(Debug)]
pub struct FileSurface {
    path: PathBuf,
    title: String,
    enable_scripts: bool,
    html: Option<String>,
}

impl FileSurface {
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    pub fn title(&self) -> &str {
        &self.title
    }

    fn write(&self) -> Result<()> {
        let Some(html) = &self.html else {
            return Ok(());
        };
        let mut document = with_title(html, &self.title);
        if !self.enable_scripts {
            document = prepend_to_head(&document, BLOCK_SCRIPTS_META);
        }
        fs::write(&self.path, document)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}

impl DisplaySurface for FileSurface {
    fn set_html(&mut self, html: &str) -> Result<()> {
        self.html = Some(html.to_string());
        self.write()
    }

    fn set_title(&mut self, title: &str) -> Result<()> {
        debug!(path = %self.path.display(), title, "surface title");
        self.title = title.to_string();
        self.write()
    }

    fn close(&mut self) {
        debug!(path = %self.path.display(), "surface closed");
    }
}

/// Set the document `<title>`, replacing an existing one.
fn with_title(html: &str, title: &str) -> String {
    let escaped = escape_text(title);
    if let Some(replaced) = replace_title(html, &escaped) {
        return replaced;
    }
    prepend_to_head(html, &format!("<title>{escaped}</title>"))
}

fn replace_title(html: &str, escaped: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let content_start = lower[open..].find('>')? + open + 1;
    let content_end = lower[content_start..].find("</title>")? + content_start;
    Some(format!(
        "{}{escaped}{}",
        &html[..content_start],
        &html[content_end..]
    ))
}

fn prepend_to_head(html: &str, extras: &str) -> String {
    inject_after_head_open(html, extras).unwrap_or_else(|| format!("{extras}{html}"))
}

fn file_stem(title: &str) -> String {
    let stem = slugify(title);
    if stem.is_empty() {
        "preview".to_string()
    } else {
        stem
    }
}
