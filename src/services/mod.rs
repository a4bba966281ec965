pub mod catalog;
pub mod catalog_search;
pub mod recommendations;
pub mod scheduler;
