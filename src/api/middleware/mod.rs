pub mod jwt_extractor;
pub mod request_id;

pub use jwt_extractor::{jwt_extractor_middleware, AuthUser};
pub use request_id::{request_id_middleware, REQUEST_ID_HEADER};
