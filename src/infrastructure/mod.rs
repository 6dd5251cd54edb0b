pub mod database;
pub mod memory;
pub mod mock;
pub mod probe;
