use thiserror::Error;

/// Messages the browser reports when a navigation tears down the context a call ran in.
const CONTEXT_DESTROYED_MESSAGES: &[&str] = &[
    "Execution context was destroyed",
    "Cannot find context with specified id",
    "Inspected target navigated or closed",
];

#[derive(Error, Debug)]
pub enum A11yError {
    #[error("No element with raw_id={0} found")]
    NotFound(u32),

    #[error("Element with raw_id={raw_id} has no {missing} attribute")]
    MalformedElement { raw_id: u32, missing: String },

    #[error("Failed to switch into iframe backendNodeId={backend_node_id}: {reason}")]
    FrameSwitch { backend_node_id: i64, reason: String },

    #[error("Execution context was destroyed: {0}")]
    ContextDestroyed(String),

    #[error("No such element: {0}")]
    NoSuchElement(String),

    #[error("Failed to connect to Chrome: {0}")]
    ConnectionFailed(String),

    #[error("Failed to launch Chrome: {0}")]
    LaunchFailed(String),

    #[error("No page available")]
    NoPage,

    #[error(transparent)]
    Cdp(#[from] chromiumoxide::error::CdpError),

    #[error(transparent)]
    WebDriver(#[from] WebDriverError),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("Malformed protocol payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl A11yError {
    /// Whether the error means the page navigated away mid-call.
    pub fn is_context_destroyed(&self) -> bool {
        match self {
            A11yError::ContextDestroyed(_) => true,
            A11yError::Cdp(e) => mentions_destroyed_context(&e.to_string()),
            A11yError::WebDriver(e) => mentions_destroyed_context(&e.message),
            _ => false,
        }
    }
}

fn mentions_destroyed_context(message: &str) -> bool {
    CONTEXT_DESTROYED_MESSAGES
        .iter()
        .any(|needle| message.contains(needle))
}

/// A W3C WebDriver error as reported by an Appium server.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{error}: {message}")]
pub struct WebDriverError {
    /// W3C error code, e.g. `no such element` or `stale element reference`
    pub error: String,
    pub message: String,
}

impl WebDriverError {
    pub fn is_no_such_element(&self) -> bool {
        self.error == "no such element"
    }
}

pub type Result<T> = std::result::Result<T, A11yError>;
