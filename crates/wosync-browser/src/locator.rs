//! Frame-aware element locators and the page scripts that act on them.
//!
//! The portal is a frameset, so every lookup names the frame it lives in.
//! Element operations run as a single self-contained script that resolves the
//! frame document, finds the element, performs the action, and reports back a
//! JSON envelope.

use crate::error::{BrowserError, Result};
use serde::Deserialize;
use std::fmt;

/// How a locator expression is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Css,
    XPath,
}

/// An element on a page, optionally inside a named frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    frame: Option<String>,
    strategy: Strategy,
    expr: String,
}

impl Locator {
    pub fn css(expr: impl Into<String>) -> Self {
        Self {
            frame: None,
            strategy: Strategy::Css,
            expr: expr.into(),
        }
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Self {
            frame: None,
            strategy: Strategy::XPath,
            expr: expr.into(),
        }
    }

    /// Shorthand for `#id`.
    pub fn id(id: &str) -> Self {
        Self::css(format!("#{id}"))
    }

    /// Scope the lookup to the document of the named top-level frame.
    #[must_use]
    pub fn in_frame(mut self, name: impl Into<String>) -> Self {
        self.frame = Some(name.into());
        self
    }

    pub fn frame(&self) -> Option<&str> {
        self.frame.as_deref()
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.strategy {
            Strategy::Css => "css",
            Strategy::XPath => "xpath",
        };
        match &self.frame {
            Some(frame) => write!(f, "{kind}:{} in frame '{frame}'", self.expr),
            None => write!(f, "{kind}:{}", self.expr),
        }
    }
}

/// Operation performed on a located element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementAction {
    /// Only check that the element exists
    Exists,
    /// Read the rendered text
    Text,
    /// Click the element
    Click,
    /// Replace an input's value and fire input/change events
    Fill(String),
    /// Choose an option of a `<select>` by value and fire a change event
    Select(String),
    /// Tag the element's document so its replacement can be detected
    MarkStale,
    /// Report `stale` for a tagged document, else its `readyState`
    LoadState,
}

/// Property set on a document by [`ElementAction::MarkStale`].
pub const STALE_TAG: &str = "__wosyncStale";

/// JSON envelope returned by every element script.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ScriptOutcome {
    pub ok: bool,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub missing: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ScriptOutcome {
    /// Parse the script's JSON string and map failures onto `BrowserError`.
    pub fn parse(raw: &str, locator: &Locator) -> Result<Self> {
        let outcome: Self = serde_json::from_str(raw)
            .map_err(|e| BrowserError::Script(format!("unreadable script result: {e}")))?;

        if outcome.ok {
            return Ok(outcome);
        }

        match outcome.missing.as_deref() {
            Some("frame") => Err(BrowserError::FrameNotFound(
                locator.frame().unwrap_or_default().to_string(),
            )),
            Some(_) => Err(BrowserError::SelectorNotFound(locator.to_string())),
            None => Err(BrowserError::Script(
                outcome
                    .error
                    .unwrap_or_else(|| "unknown script failure".to_string()),
            )),
        }
    }
}

fn js_string(value: &str) -> String {
    // A JSON string literal is a valid JavaScript string literal.
    serde_json::Value::String(value.to_string()).to_string()
}

/// Build the script that performs `action` on the element at `locator`.
///
/// The script always evaluates to a JSON string (see [`ScriptOutcome`]), so a
/// missing element is reported rather than thrown.
pub fn element_script(locator: &Locator, action: &ElementAction) -> String {
    let frame = locator
        .frame()
        .map_or_else(|| "null".to_string(), js_string);
    let expr = js_string(locator.expr());

    let find = match locator.strategy() {
        Strategy::Css => format!("doc.querySelector({expr})"),
        Strategy::XPath => format!(
            "doc.evaluate({expr}, doc, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue"
        ),
    };

    let act = match action {
        ElementAction::Exists => "return done(null);".to_string(),
        ElementAction::Text => {
            "return done(el.innerText !== undefined ? el.innerText : el.textContent);".to_string()
        }
        ElementAction::Click => "el.click(); return done(null);".to_string(),
        ElementAction::Fill(value) => format!(
            "el.focus(); el.value = {}; \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
             return done(null);",
            js_string(value)
        ),
        ElementAction::Select(value) => format!(
            "el.value = {v}; \
             if (el.value !== {v}) {{ return JSON.stringify({{ ok: false, error: 'no option ' + {v} }}); }} \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
             return done(null);",
            v = js_string(value)
        ),
        ElementAction::MarkStale => {
            format!("el.ownerDocument.{STALE_TAG} = true; return done(null);")
        }
        ElementAction::LoadState => format!(
            "return done(el.ownerDocument.{STALE_TAG} ? 'stale' : el.ownerDocument.readyState);"
        ),
    };

    format!(
        "(() => {{ \
           const done = (value) => JSON.stringify({{ ok: true, value: value }}); \
           try {{ \
             let doc = document; \
             const frameName = {frame}; \
             if (frameName !== null) {{ \
               const win = window.frames[frameName]; \
               if (!win || !win.document) {{ return JSON.stringify({{ ok: false, missing: 'frame' }}); }} \
               doc = win.document; \
             }} \
             const el = {find}; \
             if (!el) {{ return JSON.stringify({{ ok: false, missing: 'element' }}); }} \
             {act} \
           }} catch (e) {{ \
             return JSON.stringify({{ ok: false, error: String(e) }}); \
           }} \
         }})()"
    )
}
