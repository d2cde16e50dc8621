pub mod store;
pub mod types;

pub use types::{Inquiry, InquiryContext, InquiryFilter, InquiryStatus, NewInquiry};
