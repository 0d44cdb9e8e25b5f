pub mod browser;
pub mod chromedriver;
pub mod webdriver;

pub use browser::WebDriverBrowser;
