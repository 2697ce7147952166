//! Command table.
//!
//! The command token alone decides which handler map a reply belongs to.

use crate::domain::SubscriptionFilter;
use std::fmt;
use std::str::FromStr;

/// Result shape of a command; one handler map exists per shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultShape {
    Result,
    Height,
    TransactionIndex,
    Block,
    Header,
    Transaction,
    History,
    Stealth,
    /// Persistent subscription stream
    Update,
}

/// Every command the client sends or accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    TransactionPoolBroadcast,
    TransactionPoolValidate2,
    TransactionPoolFetchTransaction,
    TransactionPoolFetchTransaction2,
    BlockchainBroadcast,
    BlockchainValidate,
    BlockchainFetchTransaction,
    BlockchainFetchTransaction2,
    BlockchainFetchLastHeight,
    BlockchainFetchBlock,
    BlockchainFetchBlockHeader,
    BlockchainFetchTransactionIndex,
    BlockchainFetchStealth2,
    BlockchainFetchHistory4,
    SubscribeAddress,
    SubscribeStealth,
    /// Server-initiated, reuses the subscribe request id
    NotificationAddress,
    /// Server-initiated, reuses the subscribe request id
    NotificationStealth,
}

impl Command {
    pub const ALL: [Command; 18] = [
        Command::TransactionPoolBroadcast,
        Command::TransactionPoolValidate2,
        Command::TransactionPoolFetchTransaction,
        Command::TransactionPoolFetchTransaction2,
        Command::BlockchainBroadcast,
        Command::BlockchainValidate,
        Command::BlockchainFetchTransaction,
        Command::BlockchainFetchTransaction2,
        Command::BlockchainFetchLastHeight,
        Command::BlockchainFetchBlock,
        Command::BlockchainFetchBlockHeader,
        Command::BlockchainFetchTransactionIndex,
        Command::BlockchainFetchStealth2,
        Command::BlockchainFetchHistory4,
        Command::SubscribeAddress,
        Command::SubscribeStealth,
        Command::NotificationAddress,
        Command::NotificationStealth,
    ];

    /// Wire token.
    pub const fn name(self) -> &'static str {
        match self {
            Command::TransactionPoolBroadcast => "transaction_pool.broadcast",
            Command::TransactionPoolValidate2 => "transaction_pool.validate2",
            Command::TransactionPoolFetchTransaction => "transaction_pool.fetch_transaction",
            Command::TransactionPoolFetchTransaction2 => "transaction_pool.fetch_transaction2",
            Command::BlockchainBroadcast => "blockchain.broadcast",
            Command::BlockchainValidate => "blockchain.validate",
            Command::BlockchainFetchTransaction => "blockchain.fetch_transaction",
            Command::BlockchainFetchTransaction2 => "blockchain.fetch_transaction2",
            Command::BlockchainFetchLastHeight => "blockchain.fetch_last_height",
            Command::BlockchainFetchBlock => "blockchain.fetch_block",
            Command::BlockchainFetchBlockHeader => "blockchain.fetch_block_header",
            Command::BlockchainFetchTransactionIndex => "blockchain.fetch_transaction_index",
            Command::BlockchainFetchStealth2 => "blockchain.fetch_stealth2",
            Command::BlockchainFetchHistory4 => "blockchain.fetch_history4",
            Command::SubscribeAddress => "subscribe.address",
            Command::SubscribeStealth => "subscribe.stealth",
            Command::NotificationAddress => "notification.address",
            Command::NotificationStealth => "notification.stealth",
        }
    }

    /// Handler map the command's replies are routed to.
    pub const fn shape(self) -> ResultShape {
        match self {
            Command::TransactionPoolBroadcast
            | Command::TransactionPoolValidate2
            | Command::BlockchainBroadcast
            | Command::BlockchainValidate => ResultShape::Result,
            Command::TransactionPoolFetchTransaction
            | Command::TransactionPoolFetchTransaction2
            | Command::BlockchainFetchTransaction
            | Command::BlockchainFetchTransaction2 => ResultShape::Transaction,
            Command::BlockchainFetchLastHeight => ResultShape::Height,
            Command::BlockchainFetchBlock => ResultShape::Block,
            Command::BlockchainFetchBlockHeader => ResultShape::Header,
            Command::BlockchainFetchTransactionIndex => ResultShape::TransactionIndex,
            Command::BlockchainFetchStealth2 => ResultShape::Stealth,
            Command::BlockchainFetchHistory4 => ResultShape::History,
            Command::SubscribeAddress
            | Command::SubscribeStealth
            | Command::NotificationAddress
            | Command::NotificationStealth => ResultShape::Update,
        }
    }

    /// Whether a reply with this command carries a notification body
    /// rather than a subscribe acknowledgement.
    pub const fn is_notification(self) -> bool {
        matches!(
            self,
            Command::NotificationAddress | Command::NotificationStealth
        )
    }

    /// Whether a frame with this command may reach a subscription
    /// registered with `filter`.
    pub fn accepts(self, filter: &SubscriptionFilter) -> bool {
        matches!(
            (self, filter),
            (
                Command::SubscribeAddress | Command::NotificationAddress,
                SubscriptionFilter::Address(_)
            ) | (
                Command::SubscribeStealth | Command::NotificationStealth,
                SubscriptionFilter::Stealth(_)
            )
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Token not present in the command table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown command {0:?}")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::ALL
            .iter()
            .copied()
            .find(|command| command.name() == s)
            .ok_or_else(|| UnknownCommand(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_names_round_trip() {
        for command in Command::ALL {
            assert_eq!(command.name().parse::<Command>(), Ok(command));
        }
    }

    #[test]
    fn test_names_unique() {
        let names: HashSet<_> = Command::ALL.iter().map(|c| c.name()).collect();
        assert_eq!(names.len(), Command::ALL.len());
    }

    #[test]
    fn test_unknown_command() {
        assert!("blockchain.fetch_spend".parse::<Command>().is_err());
    }

    #[test]
    fn test_shapes() {
        assert_eq!(Command::BlockchainFetchBlock.shape(), ResultShape::Block);
        assert_eq!(Command::TransactionPoolValidate2.shape(), ResultShape::Result);
        assert_eq!(Command::NotificationStealth.shape(), ResultShape::Update);
        assert!(Command::NotificationAddress.is_notification());
        assert!(!Command::SubscribeAddress.is_notification());
    }
}
