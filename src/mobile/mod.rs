//! Android and iOS devices through an Appium server.

pub mod appium;
pub mod driver;
pub mod locator;

pub use appium::{AppiumClient, AppiumElement};
pub use driver::{AppiumDriver, AppiumOptions};
pub use locator::Locator;
