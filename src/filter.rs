//! Request filtering for render sessions.
//!
//! Only traffic that can change the DOM (documents, scripts and data fetches)
//! is allowed through; everything else is aborted so the page converges
//! faster. The decision depends on the declared resource category alone.

/// Resource category declared by the browser for a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceCategory {
    Document,
    Script,
    Xhr,
    Fetch,
    Stylesheet,
    Image,
    Media,
    Font,
    Other,
}

impl ResourceCategory {
    /// Parse a CDP `Network.ResourceType` name (case-insensitive).
    pub fn from_cdp_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "document" => ResourceCategory::Document,
            "script" => ResourceCategory::Script,
            "xhr" => ResourceCategory::Xhr,
            "fetch" => ResourceCategory::Fetch,
            "stylesheet" => ResourceCategory::Stylesheet,
            "image" => ResourceCategory::Image,
            "media" => ResourceCategory::Media,
            "font" => ResourceCategory::Font,
            _ => ResourceCategory::Other,
        }
    }

    /// Whether requests of this category can affect rendered markup.
    pub fn produces_dom(self) -> bool {
        matches!(
            self,
            ResourceCategory::Document
                | ResourceCategory::Script
                | ResourceCategory::Xhr
                | ResourceCategory::Fetch
        )
    }
}

/// Action to take for an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestAction {
    /// Let the request proceed untouched
    Continue,
    /// Abort the request as blocked by the client
    Abort,
}

/// Decide what to do with a request of the given category.
pub fn decide(category: ResourceCategory) -> RequestAction {
    if category.produces_dom() {
        RequestAction::Continue
    } else {
        RequestAction::Abort
    }
}
