//! Chromium snapshot collection and element resolution over the DevTools protocol.

pub mod cdp;
pub mod frames;
pub mod resolver;
pub mod sequential;
pub mod session;
pub mod synthetic;

pub use cdp::{CdpElement, CdpSession};
pub use frames::{build_tree, collect_nodes, FrameHierarchy};
pub use resolver::resolve;
pub use sequential::SequentialSession;
pub use session::{ChromiumSession, FrameTreeInfo, PageFrame, QueriedElement, TargetInfo};
pub use synthetic::SyntheticQuery;
