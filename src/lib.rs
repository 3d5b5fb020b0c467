pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod normalize;
pub mod output;
pub mod populate;
pub mod scan;
pub mod stac;
pub mod template;
pub mod xml;
