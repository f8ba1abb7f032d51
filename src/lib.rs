pub mod couch;
pub mod design;
pub mod deriver;
pub mod document;
pub mod output;
pub mod view;
