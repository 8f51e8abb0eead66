use crate::config::DEFAULT_CONTENT_MODEL;

/// What the parse endpoint should render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseMode {
    ByTitle(String),
    ByText {
        text: String,
        content_model: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRequest {
    pub mode: ParseMode,
    pub want_display_title: bool,
    pub want_categories_html: bool,
    pub want_head_html: bool,
    pub follow_redirects: bool,
}

impl ParseRequest {
    pub fn by_title(title: impl Into<String>) -> Self {
        Self {
            mode: ParseMode::ByTitle(title.into()),
            want_display_title: true,
            want_categories_html: true,
            want_head_html: false,
            follow_redirects: true,
        }
    }

    pub fn by_text(text: impl Into<String>, content_model: Option<String>) -> Self {
        Self {
            mode: ParseMode::ByText {
                text: text.into(),
                content_model,
            },
            want_display_title: true,
            want_categories_html: true,
            want_head_html: false,
            follow_redirects: false,
        }
    }

    pub fn with_head_html(mut self, enabled: bool) -> Self {
        self.want_head_html = enabled;
        self
    }

    pub fn with_redirects(mut self, enabled: bool) -> Self {
        self.follow_redirects = enabled;
        self
    }

    pub fn prop(&self) -> String {
        let mut props = vec!["text"];
        if self.want_display_title {
            props.push("displaytitle");
        }
        if self.want_categories_html {
            props.push("categorieshtml");
        }
        if self.want_head_html {
            props.push("headhtml");
        }
        props.join("|")
    }

    /// Query parameters for `action=parse`, excluding the `format` pair the
    /// client adds itself.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("action", "parse".to_string())];
        match &self.mode {
            ParseMode::ByText {
                text,
                content_model,
            } => {
                params.push(("text", text.clone()));
                params.push((
                    "contentmodel",
                    content_model
                        .clone()
                        .unwrap_or_else(|| DEFAULT_CONTENT_MODEL.to_string()),
                ));
                params.push(("pst", "1".to_string()));
                params.push(("disableeditsection", "1".to_string()));
            }
            ParseMode::ByTitle(title) => {
                params.push(("page", title.clone()));
                if self.follow_redirects {
                    params.push(("redirects", "1".to_string()));
                }
            }
        }
        params.push(("prop", self.prop()));
        params
    }
}

#[cfg(test)]
mod tests {
    use super::{ParseMode, ParseRequest};

    fn value<'a>(params: &'a [(&'static str, String)], key: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| value.as_str())
    }

    #[test]
    fn text_mode_sends_text_and_content_model() {
        let params = ParseRequest::by_text("'''bold'''", None).to_params();
        assert_eq!(value(&params, "action"), Some("parse"));
        assert_eq!(value(&params, "text"), Some("'''bold'''"));
        assert_eq!(value(&params, "contentmodel"), Some("wikitext"));
        assert_eq!(value(&params, "pst"), Some("1"));
        assert_eq!(value(&params, "disableeditsection"), Some("1"));
        assert_eq!(value(&params, "page"), None);
        assert_eq!(value(&params, "redirects"), None);
    }

    #[test]
    fn title_mode_sends_page_and_redirects() {
        let params = ParseRequest::by_title("Main Page").to_params();
        assert_eq!(value(&params, "page"), Some("Main Page"));
        assert_eq!(value(&params, "redirects"), Some("1"));
        assert_eq!(value(&params, "text"), None);
        assert_eq!(value(&params, "contentmodel"), None);

        let params = ParseRequest::by_title("Main Page")
            .with_redirects(false)
            .to_params();
        assert_eq!(value(&params, "redirects"), None);
    }

    #[test]
    fn text_mode_ignores_redirect_flag() {
        let request = ParseRequest::by_text("x", Some("sanitized-css".to_string()))
            .with_redirects(true);
        let params = request.to_params();
        assert_eq!(value(&params, "redirects"), None);
        assert_eq!(value(&params, "contentmodel"), Some("sanitized-css"));
        assert!(matches!(request.mode, ParseMode::ByText { .. }));
    }

    #[test]
    fn prop_follows_flags() {
        let request = ParseRequest::by_title("A");
        assert_eq!(request.prop(), "text|displaytitle|categorieshtml");
        assert_eq!(
            request.clone().with_head_html(true).prop(),
            "text|displaytitle|categorieshtml|headhtml"
        );

        let bare = ParseRequest {
            want_display_title: false,
            want_categories_html: false,
            ..request
        };
        assert_eq!(bare.prop(), "text");
    }
}
