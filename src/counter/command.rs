//! Commands a master applies to a counter entry.

use crate::counter::entry::CounterEntry;
use std::fmt;

/// The closed set of counter mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterCommand {
    /// Issue a ticket. Result: the ticket as an encoded `i64`.
    Increment,
    /// Return a ticket. Args: the ticket as an encoded `i64`.
    Rollback,
    /// Fold in a baseline. Args: an encoded [`CounterEntry`].
    Remold,
    /// Overwrite. Args: an encoded [`CounterEntry`].
    Replace,
}

impl CounterCommand {
    pub const ALL: [CounterCommand; 4] = [
        CounterCommand::Increment,
        CounterCommand::Rollback,
        CounterCommand::Remold,
        CounterCommand::Replace,
    ];

    /// Wire name of the command.
    pub fn name(self) -> &'static str {
        match self {
            CounterCommand::Increment => "Increment",
            CounterCommand::Rollback => "Rollback",
            CounterCommand::Remold => "Remold",
            CounterCommand::Replace => "Replace",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    /// Apply the command with its encoded `args`, returning the encoded result.
    ///
    /// Undecodable arguments read as zero / the empty entry.
    pub fn apply(self, entry: &mut CounterEntry, args: &[u8]) -> Result<Vec<u8>, bincode::Error> {
        match self {
            CounterCommand::Increment => bincode::serialize(&entry.increment()),
            CounterCommand::Rollback => {
                let ticket: i64 = bincode::deserialize(args).unwrap_or(0);
                entry.rollback(ticket);
                Ok(Vec::new())
            }
            CounterCommand::Remold => {
                entry.remold(&CounterEntry::from_stored(Some(args)));
                Ok(Vec::new())
            }
            CounterCommand::Replace => {
                entry.replace(&CounterEntry::from_stored(Some(args)));
                Ok(Vec::new())
            }
        }
    }
}

impl fmt::Display for CounterCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
