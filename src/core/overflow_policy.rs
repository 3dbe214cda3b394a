//! Overflow policies for bounded queues
//!
//! Both the engine's async dispatch queue and the database sink's batch
//! queue are bounded. The policy decides what a producer does when the
//! queue is full.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Policy for handling a full queue
///
/// # Example
///
/// ```
/// use log_pipeline::OverflowPolicy;
/// use std::time::Duration;
///
/// let policy = OverflowPolicy::BlockWithTimeout(Duration::from_millis(100));
/// assert_eq!(policy.to_string(), "BlockWithTimeout(100ms)");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverflowPolicy {
    /// Drop the new entry silently (counted in metrics)
    DropNewest,

    /// Evict the oldest queued entry to make room for the new one
    DropOldest,

    /// Block the producer until space is available
    Block,

    /// Block up to the timeout, then fail with `QueueFull`
    BlockWithTimeout(Duration),

    /// Fail immediately with `QueueFull`; the engine reports it to the
    /// fallback channel
    Reject,
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverflowPolicy::DropNewest => write!(f, "DropNewest"),
            OverflowPolicy::DropOldest => write!(f, "DropOldest"),
            OverflowPolicy::Block => write!(f, "Block"),
            OverflowPolicy::BlockWithTimeout(d) => write!(f, "BlockWithTimeout({:?})", d),
            OverflowPolicy::Reject => write!(f, "Reject"),
        }
    }
}

/// Outcome of offering an entry to a bounded queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Offer {
    Queued,
    /// Queued after evicting this many older entries
    QueuedAfterEviction(usize),
    Dropped,
    Full,
    Disconnected,
}

/// Push `item` onto a bounded crossbeam channel following `policy`
///
/// `evict` is only consulted for `DropOldest`; it must remove one queued item
/// and return whether it did.
pub(crate) fn offer<T>(
    policy: OverflowPolicy,
    sender: &crossbeam_channel::Sender<T>,
    item: T,
    mut evict: impl FnMut() -> bool,
) -> Offer {
    use crossbeam_channel::{SendTimeoutError, TrySendError};

    let item = match sender.try_send(item) {
        Ok(()) => return Offer::Queued,
        Err(TrySendError::Disconnected(_)) => return Offer::Disconnected,
        Err(TrySendError::Full(item)) => item,
    };

    match policy {
        OverflowPolicy::DropNewest => Offer::Dropped,
        OverflowPolicy::Reject => Offer::Full,
        OverflowPolicy::Block => match sender.send(item) {
            Ok(()) => Offer::Queued,
            Err(_) => Offer::Disconnected,
        },
        OverflowPolicy::BlockWithTimeout(timeout) => match sender.send_timeout(item, timeout) {
            Ok(()) => Offer::Queued,
            Err(SendTimeoutError::Timeout(_)) => Offer::Full,
            Err(SendTimeoutError::Disconnected(_)) => Offer::Disconnected,
        },
        OverflowPolicy::DropOldest => {
            let mut evicted = 0;
            let mut item = item;
            loop {
                // The consumer may drain the queue between attempts
                let made_room = evict();
                if made_room {
                    evicted += 1;
                }
                match sender.try_send(item) {
                    Ok(()) if evicted == 0 => return Offer::Queued,
                    Ok(()) => return Offer::QueuedAfterEviction(evicted),
                    Err(TrySendError::Full(back)) if made_room => item = back,
                    Err(TrySendError::Full(_)) => return Offer::Full,
                    Err(TrySendError::Disconnected(_)) => return Offer::Disconnected,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn test_overflow_policy_display() {
        assert_eq!(OverflowPolicy::DropNewest.to_string(), "DropNewest");
        assert_eq!(OverflowPolicy::DropOldest.to_string(), "DropOldest");
        assert_eq!(OverflowPolicy::Block.to_string(), "Block");
        assert_eq!(OverflowPolicy::Reject.to_string(), "Reject");
    }

    #[test]
    fn test_offer_reject_and_drop() {
        let (tx, _rx) = bounded(1);
        assert_eq!(offer(OverflowPolicy::Reject, &tx, 1, || false), Offer::Queued);
        assert_eq!(offer(OverflowPolicy::Reject, &tx, 2, || false), Offer::Full);
        assert_eq!(offer(OverflowPolicy::DropNewest, &tx, 3, || false), Offer::Dropped);
    }

    #[test]
    fn test_offer_drop_oldest_evicts_front() {
        let (tx, rx) = bounded(2);
        tx.send(1).unwrap();
        tx.send(2).unwrap();

        let rx_evict = rx.clone();
        let outcome = offer(OverflowPolicy::DropOldest, &tx, 3, || rx_evict.try_recv().is_ok());

        assert_eq!(outcome, Offer::QueuedAfterEviction(1));
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn test_offer_block_with_timeout_expires() {
        let (tx, _rx) = bounded(1);
        tx.send(1).unwrap();
        let outcome = offer(
            OverflowPolicy::BlockWithTimeout(Duration::from_millis(20)),
            &tx,
            2,
            || false,
        );
        assert_eq!(outcome, Offer::Full);
    }

    #[test]
    fn test_offer_disconnected() {
        let (tx, rx) = bounded::<u8>(1);
        drop(rx);
        assert_eq!(offer(OverflowPolicy::Block, &tx, 1, || false), Offer::Disconnected);
    }
}
