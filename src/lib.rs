//! Fills third-party publishing editors (WeChat, Zhihu, Juejin, Douyin,
//! Bilibili, YouTube Studio, X, Weibo, Jike, ...) with prepared content.
//!
//! A [`platforms::PluginRegistry`] picks the adapter for the page URL; the
//! adapter locates editor elements ([`locator`]), writes each field through
//! an ordered list of injection strategies ([`injector`]) and uploads images
//! fetched through the background [`relay`]. The page itself is reached only
//! through the [`dom::Dom`] trait.

pub mod browser;
pub mod content;
pub mod database;
pub mod dom;
pub mod error;
pub mod images;
pub mod injector;
pub mod locator;
pub mod payload;
pub mod platforms;
pub mod relay;
pub mod session;
pub mod settings;
pub mod text;

pub use error::FillError;
pub use payload::FillPayload;
pub use platforms::{FillResult, Plugin, PluginRegistry};
pub use session::FillSession;
pub use settings::Settings;
