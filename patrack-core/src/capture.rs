//! Capture bindings
//!
//! Turns host page events into tracker calls. The host forwards what its DOM
//! reports as [`BrowserEvent`]s; in-place navigation is reported through the
//! [`NavigationObserver`] trait rather than by wrapping history methods.
//!
//! | Event | Emits | Gated by |
//! |-------|-------|----------|
//! | `Load` | pageview | `track_pageviews` |
//! | `Navigate` / `PopState` | pageview | `track_pageviews` |
//! | `Click` on an interactive element | `click` / `<tag>` | `track_clicks` |
//! | `Submit` | `form` / `submit` | `track_forms` |
//! | `VisibilityChange` | `visibility` / `tab_hidden` or `tab_visible` | always |
//! | `Unload` | `page` / `exit` | always |

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::EventData;
use crate::tracker::Tracker;
use crate::types::PageContext;

/// Extensions that mark a link as a download
const DOWNLOAD_EXTENSIONS: &[&str] = &[
    "pdf", "zip", "rar", "tar", "gz", "dmg", "exe", "mp4", "mp3", "csv", "xls", "xlsx", "doc",
    "docx",
];

/// An element as seen by the capture layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    /// Tag name, any case
    pub tag: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Rendered text content
    #[serde(default)]
    pub text: Option<String>,
    /// Form control value
    #[serde(default)]
    pub value: Option<String>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn tag_name(&self) -> String {
        self.tag.to_ascii_lowercase()
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Non-empty attribute value
    fn non_empty(&self, name: &str) -> Option<&str> {
        self.attribute(name).filter(|v| !v.is_empty())
    }

    /// Links, buttons, `role="button"`, and button/submit inputs
    pub fn is_interactive(&self) -> bool {
        match self.tag_name().as_str() {
            "a" | "button" => true,
            "input" => matches!(
                self.attribute("type").map(str::to_ascii_lowercase).as_deref(),
                Some("button") | Some("submit")
            ),
            _ => self.attribute("role") == Some("button"),
        }
    }
}

/// A submitted form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormElement {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// `action` attribute, possibly relative; defaults to the page URL
    #[serde(default)]
    pub action: Option<String>,
    /// `method` attribute; defaults to `get`
    #[serde(default)]
    pub method: Option<String>,
    /// Number of form controls
    #[serde(default)]
    pub fields: usize,
}

/// Document visibility state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Hidden,
    Visible,
}

/// Page events the host forwards to the tracker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BrowserEvent {
    /// Page finished loading
    Load,
    /// Programmatic in-place navigation (push/replace state)
    Navigate {
        url: String,
        #[serde(default)]
        title: Option<String>,
    },
    /// Back/forward navigation
    PopState {
        url: String,
        #[serde(default)]
        title: Option<String>,
    },
    /// A click; `path` lists the target first, then its ancestors
    Click { path: Vec<Element> },
    Submit { form: FormElement },
    VisibilityChange { state: Visibility },
    Unload,
}

/// Receives in-place navigation notifications from the host application.
pub trait NavigationObserver {
    /// The application changed the location without a page load
    fn on_navigate(&self, url: &str, title: Option<&str>);

    /// The user moved through history
    fn on_pop_state(&self, url: &str, title: Option<&str>);
}

/// Listeners wired to a tracker
pub struct CaptureBindings {
    tracker: Arc<Tracker>,
}

impl CaptureBindings {
    pub fn new(tracker: Arc<Tracker>) -> Self {
        Self { tracker }
    }

    pub fn tracker(&self) -> &Arc<Tracker> {
        &self.tracker
    }

    /// Handle one page event
    pub fn dispatch(&self, event: &BrowserEvent) {
        match event {
            BrowserEvent::Load => self.on_load(),
            BrowserEvent::Navigate { url, title } => self.on_navigate(url, title.as_deref()),
            BrowserEvent::PopState { url, title } => self.on_pop_state(url, title.as_deref()),
            BrowserEvent::Click { path } => self.on_click(path),
            BrowserEvent::Submit { form } => self.on_submit(form),
            BrowserEvent::VisibilityChange { state } => self.on_visibility_change(*state),
            BrowserEvent::Unload => self.on_unload(),
        }
    }

    /// Resolve identity and emit the initial pageview.
    pub fn on_load(&self) {
        if self.tracker.config().track_pageviews {
            self.tracker.track_pageview();
        } else {
            self.tracker.resolve_identity();
        }

        if self.tracker.is_debug() {
            tracing::info!(
                target: crate::logging::DEBUG_TARGET,
                visitor_id = %self.tracker.visitor_id(),
                "Tracker initialized"
            );
        }
    }

    pub fn on_click(&self, path: &[Element]) {
        if !self.tracker.config().track_clicks {
            return;
        }
        let Some(target) = path.iter().find(|el| el.is_interactive()) else {
            return;
        };

        let data = click_data(target, &self.tracker.page());
        let action = target.tag_name();
        self.tracker.track_event("click", &action, Some(data));
    }

    pub fn on_submit(&self, form: &FormElement) {
        if !self.tracker.config().track_forms {
            return;
        }
        let data = form_data(form, &self.tracker.page());
        self.tracker.track_event("form", "submit", Some(data));
    }

    pub fn on_visibility_change(&self, state: Visibility) {
        let action = match state {
            Visibility::Hidden => "tab_hidden",
            Visibility::Visible => "tab_visible",
        };
        self.tracker.track_event("visibility", action, None);
    }

    /// Best effort: the host may tear down before delivery completes.
    pub fn on_unload(&self) {
        self.tracker.track_event("page", "exit", None);
    }

    fn navigated(&self, url: &str, title: Option<&str>) {
        self.tracker.set_location(url, title);
        if self.tracker.config().track_pageviews {
            self.tracker.track_pageview();
        }
    }
}

impl NavigationObserver for CaptureBindings {
    fn on_navigate(&self, url: &str, title: Option<&str>) {
        self.navigated(url, title);
    }

    fn on_pop_state(&self, url: &str, title: Option<&str>) {
        self.navigated(url, title);
    }
}

/// Describe a clicked interactive element.
///
/// Produces `type` and `text` always; `href`, `external` and `download` for
/// links; `id`, `className` and `dataTrack` when present.
pub fn click_data(target: &Element, page: &PageContext) -> EventData {
    let tag = target.tag_name();
    let mut data = EventData::new();
    data.insert("type".to_string(), Value::String(tag.clone()));

    let text = target
        .text
        .as_deref()
        .filter(|t| !t.is_empty())
        .or(target.value.as_deref())
        .unwrap_or_default();
    data.insert("text".to_string(), Value::String(text.to_string()));

    if tag == "a" {
        let href = target
            .attribute("href")
            .map(|href| page.resolve(href))
            .unwrap_or_default();

        if !href.is_empty() && link_hostname(&href) != page.hostname() {
            data.insert("external".to_string(), Value::Bool(true));
        }
        if target.attribute("download").is_some() || has_download_extension(&href) {
            data.insert("download".to_string(), Value::Bool(true));
        }
        data.insert("href".to_string(), Value::String(href));
    }

    if let Some(id) = target.non_empty("id") {
        data.insert("id".to_string(), Value::String(id.to_string()));
    }
    if let Some(class_name) = target.non_empty("class") {
        data.insert("className".to_string(), Value::String(class_name.to_string()));
    }
    if let Some(track) = target.non_empty("data-track") {
        data.insert("dataTrack".to_string(), Value::String(track.to_string()));
    }

    data
}

/// Describe a submitted form: `id` (or null), `action`, `method`, `fields`,
/// and `name` when present.
pub fn form_data(form: &FormElement, page: &PageContext) -> EventData {
    let mut data = EventData::new();

    let id = form
        .id
        .as_deref()
        .filter(|id| !id.is_empty())
        .map(|id| Value::String(id.to_string()))
        .unwrap_or(Value::Null);
    data.insert("id".to_string(), id);

    let action = match form.action.as_deref().filter(|a| !a.is_empty()) {
        Some(action) => page.resolve(action),
        None => page.url.clone(),
    };
    data.insert("action".to_string(), Value::String(action));

    let method = form
        .method
        .as_deref()
        .map(str::to_ascii_lowercase)
        .filter(|m| matches!(m.as_str(), "get" | "post" | "dialog"))
        .unwrap_or_else(|| "get".to_string());
    data.insert("method".to_string(), Value::String(method));
    data.insert("fields".to_string(), Value::from(form.fields));

    if let Some(name) = form.name.as_deref().filter(|n| !n.is_empty()) {
        data.insert("name".to_string(), Value::String(name.to_string()));
    }

    data
}

fn link_hostname(href: &str) -> String {
    url::Url::parse(href)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default()
}

fn has_download_extension(href: &str) -> bool {
    let href = href.to_ascii_lowercase();
    DOWNLOAD_EXTENSIONS
        .iter()
        .any(|ext| href.ends_with(&format!(".{}", ext)))
}
