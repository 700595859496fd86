//! Live Chrome plumbing: locating and launching Chrome, attaching over CDP,
//! and the [`cdp_dom::CdpDom`] page backend.

pub mod automation;
pub mod cdp_dom;
pub mod chrome;

pub use automation::{connect_to_chrome, Connection};
pub use cdp_dom::CdpDom;
