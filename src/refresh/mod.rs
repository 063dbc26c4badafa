pub mod error;
pub mod refresher;
pub mod store;
pub mod validator;
