pub mod decoder;
pub mod error;
pub mod grid_decoder;
pub mod path;
pub mod scanner;
pub mod table_decoder;
