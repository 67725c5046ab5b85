pub mod batch;
pub mod identity;
pub mod notify;
pub mod service;

pub use identity::{IdentityProvider, InMemoryIdentityProvider};
pub use notify::{NoopDispatcher, NotificationDispatcher, RecordingDispatcher, TransitionNotice};
pub use service::{ApprovalEngine, NewRequest};
