pub mod db;
pub mod encryption;
pub mod jwt;
pub mod logging;
