pub mod config;
pub mod coordinator;
pub mod debounce;
pub mod list_state;
pub mod reactive;
pub mod resource;

pub use config::{load_settings, ClientSettings};
pub use coordinator::{ListQuery, LocalityList};
pub use debounce::Debounced;
pub use list_state::{ListState, ListStateRegistry};
pub use reactive::{Signal, Subscription};
pub use resource::{HttpPageFetcher, ListEvent, PageFetcher, PaginatedResource};
