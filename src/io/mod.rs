mod http_store;
mod paths;
mod request_manager;
mod store_reader;

pub use http_store::{create_http_client, HttpStore};
pub use paths::StorePaths;
pub use request_manager::{FetchOutcome, RequestManager, RequestScope};
pub use store_reader::{read_u16_be, read_u16_le, StoreReader};
