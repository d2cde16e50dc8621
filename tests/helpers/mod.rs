#![allow(dead_code)]

pub mod builders;
pub mod db;
pub mod fixture;

pub use builders::{seed_rbac, InquiryBuilder};
pub use db::TestDb;
pub use fixture::Fixture;
