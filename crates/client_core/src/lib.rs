//! Client-side core of the CRM: fetch every page of a backend collection,
//! filter and re-paginate it locally, and drive the lead conversion handshake.

pub mod aggregate;
pub mod debounce;
pub mod error;
pub mod http;
pub mod paginate;
pub mod schema;
pub mod session;
pub mod summary;
pub mod tasks;
pub mod view;

pub use aggregate::{fetch_all, fetch_all_with, FetchMode, PaginatedSource};
pub use error::CoreError;
pub use http::CrmClient;
pub use paginate::{paginate, paginate_by, PageView, PaginateError, Searchable};
pub use schema::SchemaError;
pub use shared::pipeline::can_manager_set_status;
pub use view::ListView;

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
