pub mod backend;
pub mod cache;
pub mod calendar;
pub mod decode;
pub mod models;
pub mod reconciler;
pub mod remote;
