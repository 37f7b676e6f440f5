use crate::domain::email::{MessageDetail, MessageSummary};
use crate::error::Result;

/// Read-only view of a remote mailbox.
pub trait Mailbox {
    /// Run a provider search; results come back in provider order.
    fn search(&self, query: &str) -> Result<Vec<MessageSummary>>;

    fn fetch(&self, id: &str) -> Result<MessageDetail>;
}

/// Produces an authenticated [`Mailbox`].
pub trait Connector {
    type Mailbox: Mailbox;

    fn connect(&self) -> Result<Self::Mailbox>;
}

/// Provider query matching `address` as sender or recipient.
pub fn address_query(address: &str) -> String {
    format!("from:{address} OR to:{address}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_matches_sender_or_recipient() {
        assert_eq!(
            address_query("bob@example.com"),
            "from:bob@example.com OR to:bob@example.com"
        );
    }
}
