//! `MessageSender` adapters.

pub mod log_only;
pub mod whatsapp;

pub use log_only::LogOnlySender;
pub use whatsapp::WhatsAppSender;
