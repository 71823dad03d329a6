//! Example host application for the idm login broker.

pub mod config;
pub mod crm;
pub mod demo;
