pub mod gmail;
pub mod mailbox;

pub use gmail::{GmailClient, GmailConnector};
pub use mailbox::{Connector, Mailbox, address_query};
