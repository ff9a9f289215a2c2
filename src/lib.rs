pub mod app;
pub mod backend;
pub mod cli;
pub mod config;
pub mod fetch;
pub mod input;
pub mod k8s;
pub mod logs;
pub mod model;
pub mod normalize;
pub mod pods;
pub mod runtime;
pub mod selection;
pub mod selectors;
pub mod status;
pub mod ui;
