pub mod clock;
pub mod locator;
pub mod poller;
pub mod resolver;
pub mod scroll;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use locator::{AnchorSet, Locator, Strategy};
pub use poller::Poller;
pub use resolver::resolve_any;
pub use scroll::{SearchPhase, locate_any_with_scroll, locate_with_scroll, scroll_search};
pub use types::{
    DEFAULT_POLL_INTERVAL, DEFAULT_WAIT_TIMEOUT, LookupError, NotFound, SyncError, SyncResult,
    WaitOptions, WaitOutcome,
};
