//! Live appointment and notification feeds for the medical staff dashboard.
//!
//! Each feed mirrors one backend table into an ordered local list: an initial
//! snapshot fetch plus the table's live change stream, merged so that no
//! change is lost or duplicated. The same feeds back the HTTP service and the
//! terminal dashboard.

pub mod api;
pub mod appointments;
pub mod config;
pub mod feed;
pub mod filter;
pub mod health;
pub mod mock;
pub mod notice;
pub mod notifications;
pub mod patient;
pub mod runtime;

pub use appointments::AppointmentFeed;
pub use feed::{Feed, FeedRecord, FeedView};
pub use notice::{Notice, NoticeSink, Severity};
pub use notifications::NotificationFeed;
pub use runtime::{CareFeeds, FeedStats};
