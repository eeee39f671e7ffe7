pub mod backend;
pub mod types;
pub mod utils;
pub mod webdriver;
pub mod xml;

pub use backend::{
    ActionKind, EventLog, Framebuffer, MockDevice, MockEvent, ScrollSpec,
    UiBackend, find_via_tree,
};
pub use types::{BackendError, BackendResult, Bounds, HandleOrigin, NodeHandle, UiNode, UiSnapshot, UiTree};
pub use utils::{artifact_filename, generate_timestamp, sanitize_prefix};
pub use webdriver::{WebDriverBackend, WebDriverConfig};
pub use xml::{tree_from_xml, tree_to_xml};
