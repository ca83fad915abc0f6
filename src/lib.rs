pub mod calendar;
pub mod catalog;
pub mod command;
pub mod compactor;
pub mod console;
pub mod engine;
pub mod hotel;
pub mod ledger;
pub mod limits;
pub mod model;
pub mod observability;
pub mod wal;
