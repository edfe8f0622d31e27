// HTTP module - Request dispatch with credential renewal and transient retry
mod dispatcher;
mod options;
mod response;

pub use dispatcher::ApiClient;
pub use options::{ApiClientOptions, RequestOptions};
pub use response::ApiResponse;
