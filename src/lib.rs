pub mod accessibility;
pub mod browser;
pub mod chromium;
pub mod driver;
pub mod error;
pub mod mobile;
pub mod retry;

//  Re-export commonly used items
pub use accessibility::{
    AccessibilityElement, AccessibilityTree, ChromiumTree, FrameRef, LocatorInfo, Platform,
    TreeDiff, UiAutomator2Tree, XcuiTestTree,
};
pub use browser::chrome::{ChromeDriver, ConnectionMode};
pub use chromium::{ChromiumSession, SyntheticQuery};
pub use driver::AccessibilityDriver;
pub use error::{A11yError, Result, WebDriverError};
pub use mobile::{AppiumClient, AppiumDriver, AppiumOptions};
pub use retry::RetryPolicy;
