// Allow dead code for public API functions that may not be used internally
// but are part of the library's exposed interface
#![allow(dead_code)]

pub mod batch;
pub mod browser;
pub mod catalog;
pub mod classifiers;
pub mod cli;
pub mod collectors;
pub mod config;
pub mod contact;
pub mod deadline;
pub mod domain_utils;
pub mod email_provider;
pub mod evidence;
pub mod harvest;
pub mod logger;
pub mod orchestrator;
pub mod record;
pub mod resolve;
pub mod sheet;
pub mod visitor;

pub use catalog::{Category, SignatureCatalog};
pub use orchestrator::{ScanSettings, SiteScanner};
pub use record::QualificationRecord;
