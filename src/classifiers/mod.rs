//! Specialized classifiers run over cached page content.
//!
//! All functions here are pure; navigation for the locations and team
//! pages is driven by the site scanner.

pub mod billing;
pub mod booking;
pub mod category;
pub mod location;
pub mod team;

pub use billing::detect_billing;
pub use booking::{detect_booking, BookingDetection};
pub use category::{classify, CategoryResult, MIXED_CATEGORY};
pub use location::LocationEstimate;
