//! Parley - layered authorization for workflow inquiries
//!
//! An inquiry pauses a workflow until someone answers it. Access is decided by
//! role-based grants (view, list, respond) and, for respond, by a per-inquiry
//! responder allow-list. This crate exposes all modules for testing purposes.

pub mod authz;
pub mod entities;
pub mod errors;
pub mod events;
pub mod identity;
pub mod inquiry;
pub mod jobs;
pub mod settings;
pub mod storage;
pub mod web;
