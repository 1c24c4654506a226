pub mod error_body;
pub mod request_id;
pub mod trace;
