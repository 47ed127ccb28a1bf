// Numerazione delle richieste per scartare le risposte arrivate fuori ordine
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Operator list: paginated loads and searches both write it.
    Listing,
    Detail,
    Regions,
}

impl Channel {
    fn index(self) -> usize {
        match self {
            Channel::Listing => 0,
            Channel::Detail => 1,
            Channel::Regions => 2,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Listing => f.write_str("listing"),
            Channel::Detail => f.write_str("detail"),
            Channel::Regions => f.write_str("regions"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    issued: u64,
    applied: u64,
}

/// Monotonic per-channel request numbers. A response is accepted only if it
/// is newer than the last one applied on its channel.
#[derive(Debug, Clone, Default)]
pub struct RequestSequencer {
    channels: [Counters; 3],
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&mut self, channel: Channel) -> u64 {
        let c = &mut self.channels[channel.index()];
        c.issued += 1;
        c.issued
    }

    /// Marks `seq` as applied when it is the newest seen so far.
    pub fn accept(&mut self, channel: Channel, seq: u64) -> bool {
        let c = &mut self.channels[channel.index()];
        if seq > c.applied {
            c.applied = seq;
            true
        } else {
            false
        }
    }

    /// Everything issued so far on every channel becomes stale.
    pub fn invalidate_all(&mut self) {
        for c in self.channels.iter_mut() {
            c.issued += 1;
            c.applied = c.issued;
        }
    }
}
