use anyhow::bail;
use rustc_hash::FxHashSet;
use tracing::trace;
use crate::config::AckMode;

/// Number of message ids covered by a (short) ack mask
pub const ACK_WINDOW_LEN: u16 = 32;

/// Selective-repeat bookkeeping for reliable messages on a single connection.
///
/// The receive side tracks the highest message id received so far, and the set of ids below it
///  that were skipped ('missing'). These are reported to the peer as the id plus a bit mask.
///
/// The send side interprets the peer's reports, splitting the message ids in the report's window
///  into those that need to be re-sent and those that were received.
///
/// NB: Message ids are compared as plain integers, there is no special handling when they wrap
///      around at `u16::MAX`
pub struct AckWindow {
    ack_mode: AckMode,
    last_received_message_id: u16,
    /// Invariant: all ids in this set are lower than `last_received_message_id`
    missing_message_ids: FxHashSet<u16>,
}

/// The peer's view of our reliable messages, derived from an incoming ack report
#[derive(Debug, Default, Eq, PartialEq)]
pub struct IncomingAcks {
    pub resend: Vec<u16>,
    pub confirmed: Vec<u16>,
}

impl AckWindow {
    pub fn new(ack_mode: AckMode) -> AckWindow {
        AckWindow {
            ack_mode,
            last_received_message_id: 0,
            missing_message_ids: Default::default(),
        }
    }

    #[cfg(test)]
    pub fn last_received_message_id(&self) -> u16 {
        self.last_received_message_id
    }

    #[cfg(test)]
    pub fn missing_message_ids(&self) -> Vec<u16> {
        let mut result = self.missing_message_ids.iter().cloned().collect::<Vec<_>>();
        result.sort();
        result
    }

    /// Registers an incoming reliable message id, returning `true` if the message should be
    ///  processed and `false` if it is a duplicate. The caller must skip a duplicate message's
    ///  payload in either case.
    pub fn record_received(&mut self, message_id: u16) -> bool {
        if message_id == self.last_received_message_id {
            trace!("message #{} is a duplicate of the last received message", message_id);
            return false;
        }

        self.missing_message_ids.remove(&message_id);

        if message_id > self.last_received_message_id {
            for missing in self.last_received_message_id+1 .. message_id {
                self.missing_message_ids.insert(missing);
            }
            self.last_received_message_id = message_id;
        }

        true
    }

    /// The ack report for outgoing packets: the last received message id and a mask where bit
    ///  `i` is set unless message id `last - i` is known to be missing.
    pub fn build_outgoing_ack(&self) -> anyhow::Result<(u16, u32)> {
        if self.ack_mode == AckMode::Long {
            bail!("long ack mode is not implemented");
        }

        let mut mask = u32::MAX;
        for &missing in &self.missing_message_ids {
            let bit_position = self.last_received_message_id - missing;
            if bit_position < ACK_WINDOW_LEN {
                mask &= !(1u32 << bit_position);
            }
        }
        Ok((self.last_received_message_id, mask))
    }

    /// Interprets a peer's ack report for the 32 message ids ending at `ack_message_id`
    pub fn apply_incoming_ack(&self, ack_message_id: u16, ack_mask: u32) -> anyhow::Result<IncomingAcks> {
        if self.ack_mode == AckMode::Long {
            bail!("long ack mode is not implemented");
        }

        let mut result = IncomingAcks::default();
        for i in 0..ACK_WINDOW_LEN {
            let message_id = ack_message_id.wrapping_sub(i);
            if ack_mask & (1u32 << i) == 0 {
                result.resend.push(message_id);
            }
            else {
                result.confirmed.push(message_id);
            }
        }
        Ok(result)
    }
}
