//! Framing and delivery semantics of the different QoS types.
//!
//! In a data packet, every frame is preceded by its channel id (u8). The frame starts with a
//!  length (u16), followed by a QoS specific header and the payload. All numbers are in network
//!  byte order:
//!
//! ```ascii
//! Unreliable:          len | payload
//! UnreliableSequenced: len | seq (u8) | payload
//! Reliable:            len | message id (u16) | payload
//! ReliableSequenced:   len | message id (u16) | seq (u8) | payload
//! ReliableFragmented:  len | message id (u16) | fragmented msg id (u8) | fragment index (u8) | fragment count (u8) | payload
//! ```
//!
//! The length covers the preceding channel id, the length field itself, the QoS header and the
//!  payload. The channel id is written and read by the connection.

use std::collections::BTreeMap;
use anyhow::bail;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};
use crate::ack_window::AckWindow;
use crate::config::{QosType, MAX_FRAGMENTS_PER_MESSAGE, MAX_FRAGMENT_PAYLOAD_LEN};
use crate::fragment_reassembler::FragmentReassembler;
use crate::safe_converter::{PrecheckedCast, SafeCast};

/// channel id and length field, both counted in a frame's length
const FRAME_PREFIX_LEN: usize = 3;

/// A frame built for sending, without the preceding channel id
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PreparedFrame {
    /// The message id for frames of reliable channels - these frames must be retained for
    ///  re-sending until they are acknowledged
    pub message_id: Option<u16>,
    pub frame: Bytes,
}

/// The result of processing a single incoming frame
#[derive(Debug, Default, Eq, PartialEq)]
pub struct ProcessedFrame {
    /// Payloads to be passed to the application, in delivery order. There can be several for
    ///  sequenced channels when a frame closes a gap.
    pub delivered: Vec<Vec<u8>>,
    /// `true` if the frame contained a reliable message that was not received before
    pub accepted_reliable: bool,
}

impl ProcessedFrame {
    fn delivered(payload: &[u8], accepted_reliable: bool) -> ProcessedFrame {
        ProcessedFrame {
            delivered: vec![payload.to_vec()],
            accepted_reliable,
        }
    }

    fn nothing(accepted_reliable: bool) -> ProcessedFrame {
        ProcessedFrame {
            delivered: vec![],
            accepted_reliable,
        }
    }
}

/// Hands out the connection's message ids - they are shared by all reliable channels
fn next_message_id(next: &mut u16) -> u16 {
    let result = *next;
    *next = next.wrapping_add(1);
    result
}

/// The state of one channel of a connection.
///
/// NB: The sequence number comparisons of the sequenced variants are plain integer comparisons
///      with a single special case: if the tracked sequence number is 255, any sequence number
///      is treated as being 'in the future'. This is not full wrap-around arithmetic.
pub enum Channel {
    Unreliable,
    UnreliableSequenced {
        last_incoming_sequence: u8,
        next_outgoing_sequence: u8,
    },
    Reliable,
    ReliableSequenced {
        next_incoming_sequence: u8,
        next_outgoing_sequence: u8,
        /// messages that arrived before their predecessors
        reorder_buffer: BTreeMap<u8, Vec<u8>>,
    },
    ReliableFragmented {
        next_fragmented_message_id: u8,
        reassemblers: FxHashMap<u8, FragmentReassembler>,
        /// base message id of the last message delivered per fragmented message id, for
        ///  recognizing fragments that are re-sent after their message was delivered
        delivered_base_ids: FxHashMap<u8, u16>,
    },
}

impl Channel {
    pub fn new(qos_type: QosType) -> Channel {
        match qos_type {
            QosType::Unreliable => Channel::Unreliable,
            QosType::UnreliableSequenced => Channel::UnreliableSequenced {
                last_incoming_sequence: 0,
                next_outgoing_sequence: 1,
            },
            QosType::Reliable | QosType::AllCostDelivery => Channel::Reliable,
            QosType::ReliableSequenced => Channel::ReliableSequenced {
                next_incoming_sequence: 1,
                next_outgoing_sequence: 1,
                reorder_buffer: Default::default(),
            },
            QosType::ReliableFragmented => Channel::ReliableFragmented {
                next_fragmented_message_id: 0,
                reassemblers: Default::default(),
                delivered_base_ids: Default::default(),
            },
        }
    }

    /// The length of the frame header, including channel id and length field
    pub fn header_len(&self) -> usize {
        match self {
            Channel::Unreliable => 3,
            Channel::UnreliableSequenced { .. } => 4,
            Channel::Reliable => 5,
            Channel::ReliableSequenced { .. } => 6,
            Channel::ReliableFragmented { .. } => 8,
        }
    }

    /// Builds the frames for an outgoing message. All channels except `ReliableFragmented`
    ///  produce exactly one frame.
    pub fn prepare(&mut self, data: &[u8], message_id_counter: &mut u16) -> anyhow::Result<Vec<PreparedFrame>> {
        let header_len = self.header_len();

        if let Channel::ReliableFragmented { next_fragmented_message_id, .. } = self {
            let num_fragments = data.len().div_ceil(MAX_FRAGMENT_PAYLOAD_LEN).max(1);
            if num_fragments > MAX_FRAGMENTS_PER_MESSAGE {
                bail!("message of length {} needs {} fragments, the maximum is {}", data.len(), num_fragments, MAX_FRAGMENTS_PER_MESSAGE);
            }

            let fragmented_message_id = *next_fragmented_message_id;
            *next_fragmented_message_id = next_fragmented_message_id.wrapping_add(1);

            let mut frames = Vec::with_capacity(num_fragments);
            for index in 0..num_fragments {
                let chunk_start = (index * MAX_FRAGMENT_PAYLOAD_LEN).min(data.len());
                let chunk_end = (chunk_start + MAX_FRAGMENT_PAYLOAD_LEN).min(data.len());
                let chunk = &data[chunk_start..chunk_end];

                let message_id = next_message_id(message_id_counter);
                let frame_len = header_len + chunk.len();

                let mut frame = BytesMut::with_capacity(frame_len - 1);
                frame.put_u16(frame_len.prechecked_cast());
                frame.put_u16(message_id);
                frame.put_u8(fragmented_message_id);
                frame.put_u8(index.prechecked_cast());
                frame.put_u8(num_fragments.prechecked_cast());
                frame.put_slice(chunk);

                frames.push(PreparedFrame {
                    message_id: Some(message_id),
                    frame: frame.freeze(),
                });
            }
            trace!("prepared fragmented message #{} with {} fragments", fragmented_message_id, num_fragments);
            return Ok(frames);
        }

        let frame_len = header_len + data.len();
        if frame_len > u16::MAX as usize {
            bail!("message of length {} does not fit into a single frame", data.len());
        }

        let mut frame = BytesMut::with_capacity(frame_len - 1);
        frame.put_u16(frame_len.prechecked_cast());

        let message_id = match self {
            Channel::Unreliable => None,
            Channel::UnreliableSequenced { next_outgoing_sequence, .. } => {
                frame.put_u8(*next_outgoing_sequence);
                *next_outgoing_sequence = next_outgoing_sequence.wrapping_add(1);
                None
            }
            Channel::Reliable => {
                let message_id = next_message_id(message_id_counter);
                frame.put_u16(message_id);
                Some(message_id)
            }
            Channel::ReliableSequenced { next_outgoing_sequence, .. } => {
                let message_id = next_message_id(message_id_counter);
                frame.put_u16(message_id);
                frame.put_u8(*next_outgoing_sequence);
                *next_outgoing_sequence = next_outgoing_sequence.wrapping_add(1);
                Some(message_id)
            }
            Channel::ReliableFragmented { .. } => unreachable!("handled above"),
        };
        frame.put_slice(data);

        Ok(vec![PreparedFrame {
            message_id,
            frame: frame.freeze(),
        }])
    }

    /// Consumes one frame from `buf`. The entire frame is consumed even if its payload is not
    ///  delivered (e.g. for duplicates), so that subsequent frames can be parsed.
    ///
    /// An error means that the frame is malformed, and the rest of the datagram cannot be
    ///  interpreted.
    pub fn process(&mut self, buf: &mut &[u8], ack_window: &mut AckWindow) -> anyhow::Result<ProcessedFrame> {
        let frame_len: usize = buf.try_get_u16()?.safe_cast();
        let header_len = self.header_len();
        if frame_len < header_len {
            bail!("frame length {} is shorter than the frame header of {} bytes", frame_len, header_len);
        }
        let body_len = frame_len - FRAME_PREFIX_LEN;
        if buf.len() < body_len {
            bail!("frame length {} exceeds the remaining {} bytes of the datagram", frame_len, buf.len() + FRAME_PREFIX_LEN);
        }

        let (mut body, rest) = buf.split_at(body_len);
        *buf = rest;

        match self {
            Channel::Unreliable => {
                Ok(ProcessedFrame::delivered(body, false))
            }
            Channel::UnreliableSequenced { last_incoming_sequence, .. } => {
                let sequence = body.get_u8();
                if sequence <= *last_incoming_sequence && *last_incoming_sequence != u8::MAX {
                    debug!("dropping outdated sequenced message #{}, last delivered was #{}", sequence, last_incoming_sequence);
                    return Ok(ProcessedFrame::nothing(false));
                }
                *last_incoming_sequence = sequence;
                Ok(ProcessedFrame::delivered(body, false))
            }
            Channel::Reliable => {
                let message_id = body.get_u16();
                if !ack_window.record_received(message_id) {
                    debug!("skipping duplicate reliable message #{}", message_id);
                    return Ok(ProcessedFrame::nothing(false));
                }
                Ok(ProcessedFrame::delivered(body, true))
            }
            Channel::ReliableSequenced { next_incoming_sequence, reorder_buffer, .. } => {
                let message_id = body.get_u16();
                let sequence = body.get_u8();
                if !ack_window.record_received(message_id) {
                    debug!("skipping duplicate reliable message #{}", message_id);
                    return Ok(ProcessedFrame::nothing(false));
                }

                if sequence == *next_incoming_sequence {
                    let mut delivered = vec![body.to_vec()];
                    *next_incoming_sequence = next_incoming_sequence.wrapping_add(1);

                    while let Some(buffered) = reorder_buffer.remove(next_incoming_sequence) {
                        trace!("releasing buffered sequenced message #{}", next_incoming_sequence);
                        delivered.push(buffered);
                        *next_incoming_sequence = next_incoming_sequence.wrapping_add(1);
                    }
                    return Ok(ProcessedFrame {
                        delivered,
                        accepted_reliable: true,
                    });
                }

                if sequence > *next_incoming_sequence || *next_incoming_sequence == u8::MAX {
                    trace!("buffering sequenced message #{} until #{} arrives", sequence, next_incoming_sequence);
                    reorder_buffer.entry(sequence)
                        .or_insert_with(|| body.to_vec());
                }
                else {
                    debug!("dropping sequenced message #{} which is older than the expected #{}", sequence, next_incoming_sequence);
                }
                Ok(ProcessedFrame::nothing(true))
            }
            Channel::ReliableFragmented { reassemblers, delivered_base_ids, .. } => {
                let message_id = body.get_u16();
                let fragmented_message_id = body.get_u8();
                let fragment_index = body.get_u8();
                let num_fragments = body.get_u8();

                if fragment_index >= num_fragments {
                    bail!("fragment index {} is out of range for {} fragments", fragment_index, num_fragments);
                }

                if !ack_window.record_received(message_id) {
                    debug!("skipping duplicate fragment (message #{})", message_id);
                    return Ok(ProcessedFrame::nothing(false));
                }

                let base_message_id = message_id.wrapping_sub(fragment_index.into());
                if delivered_base_ids.get(&fragmented_message_id) == Some(&base_message_id) {
                    debug!("skipping re-sent fragment {} of fragmented message #{}, which was delivered already", fragment_index, fragmented_message_id);
                    return Ok(ProcessedFrame::nothing(true));
                }

                let reassembler = reassemblers.entry(fragmented_message_id)
                    .or_insert_with(|| FragmentReassembler::new(base_message_id, num_fragments));
                if !reassembler.belongs_to(base_message_id, num_fragments) {
                    debug!("discarding incomplete fragmented message #{} (base message #{}) - the id is reused by base message #{}", fragmented_message_id, reassembler.base_message_id(), base_message_id);
                    *reassembler = FragmentReassembler::new(base_message_id, num_fragments);
                }
                if !reassembler.add_fragment(fragment_index, body.to_vec()) {
                    trace!("fragment {} of {} for fragmented message #{} received", fragment_index, num_fragments, fragmented_message_id);
                    return Ok(ProcessedFrame::nothing(true));
                }

                let reassembler = reassemblers.remove(&fragmented_message_id)
                    .expect("reassembler was just accessed");
                delivered_base_ids.insert(fragmented_message_id, base_message_id);
                Ok(ProcessedFrame {
                    delivered: vec![reassembler.reassemble()],
                    accepted_reliable: true,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AckMode;
    use rstest::rstest;

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[rstest]
    fn test_round_trip(
        #[values(QosType::Unreliable, QosType::UnreliableSequenced, QosType::Reliable, QosType::ReliableSequenced, QosType::ReliableFragmented, QosType::AllCostDelivery)]
        qos_type: QosType,
        #[values(0, 1, 511, 512, 1500)]
        len: usize,
    ) {
        let mut sender = Channel::new(qos_type);
        let mut receiver = Channel::new(qos_type);
        let mut ack_window = AckWindow::new(AckMode::Short);
        let mut message_id_counter = 1;

        let data = payload(len);
        let frames = sender.prepare(&data, &mut message_id_counter).unwrap();

        let mut delivered = Vec::new();
        for frame in frames {
            assert_eq!(frame.message_id.is_some(), qos_type.is_reliable());
            let mut buf: &[u8] = &frame.frame;
            delivered.extend(receiver.process(&mut buf, &mut ack_window).unwrap().delivered);
            assert!(buf.is_empty());
        }

        assert_eq!(delivered, vec![data]);
    }

    #[rstest]
    #[case::empty(0, 1)]
    #[case::single_byte(1, 1)]
    #[case::exactly_one(512, 1)]
    #[case::one_more(513, 2)]
    #[case::three(1500, 3)]
    #[case::max(255 * 512, 255)]
    fn test_fragment_count(#[case] len: usize, #[case] expected_fragments: usize) {
        let mut channel = Channel::new(QosType::ReliableFragmented);
        let mut message_id_counter = 1;
        let frames = channel.prepare(&payload(len), &mut message_id_counter).unwrap();

        assert_eq!(frames.len(), expected_fragments);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.message_id, Some(1 + i as u16));
            assert!(frame.frame.len() <= 7 + MAX_FRAGMENT_PAYLOAD_LEN);
            assert_eq!(frame.frame[5], i as u8);
            assert_eq!(frame.frame[6], expected_fragments as u8);
        }
        assert_eq!(message_id_counter, 1 + expected_fragments as u16);
    }

    #[test]
    fn test_fragmented_too_long() {
        let mut channel = Channel::new(QosType::ReliableFragmented);
        let mut message_id_counter = 1;
        assert!(channel.prepare(&payload(255 * 512 + 1), &mut message_id_counter).is_err());
        assert_eq!(message_id_counter, 1);
    }

    #[rstest]
    #[case::in_order(vec![0, 1, 2])]
    #[case::reversed(vec![2, 1, 0])]
    #[case::last_first(vec![2, 0, 1])]
    fn test_fragments_any_order(#[case] arrival_order: Vec<usize>) {
        let mut sender = Channel::new(QosType::ReliableFragmented);
        let mut receiver = Channel::new(QosType::ReliableFragmented);
        let mut ack_window = AckWindow::new(AckMode::Short);
        let mut message_id_counter = 1;

        let data = payload(1200);
        let frames = sender.prepare(&data, &mut message_id_counter).unwrap();

        let mut delivered = Vec::new();
        for (n, &index) in arrival_order.iter().enumerate() {
            let mut buf: &[u8] = &frames[index].frame;
            let processed = receiver.process(&mut buf, &mut ack_window).unwrap();
            assert!(processed.accepted_reliable);
            assert_eq!(processed.delivered.is_empty(), n < 2);
            delivered.extend(processed.delivered);
        }
        assert_eq!(delivered, vec![data]);
    }

    #[rstest]
    #[case::resent_after_delivery(vec![0, 2, 1, 1], true)]
    #[case::never_completed(vec![0], false)]
    fn test_fragmented_message_id_reuse(#[case] first_arrival_order: Vec<usize>, #[case] first_is_delivered: bool) {
        let mut sender = Channel::new(QosType::ReliableFragmented);
        let mut receiver = Channel::new(QosType::ReliableFragmented);
        let mut ack_window = AckWindow::new(AckMode::Short);
        let mut message_id_counter = 1;

        fn receive(receiver: &mut Channel, ack_window: &mut AckWindow, frame: &PreparedFrame) -> Vec<Vec<u8>> {
            let mut buf: &[u8] = &frame.frame;
            receiver.process(&mut buf, ack_window).unwrap().delivered
        }

        let first = vec![1u8; 1200];
        let frames = sender.prepare(&first, &mut message_id_counter).unwrap();
        let mut delivered = Vec::new();
        for index in first_arrival_order {
            delivered.extend(receive(&mut receiver, &mut ack_window, &frames[index]));
        }
        assert_eq!(delivered.len(), usize::from(first_is_delivered));

        // cycle through the other fragmented message ids
        for n in 1..=255u8 {
            let frames = sender.prepare(&[n], &mut message_id_counter).unwrap();
            assert_eq!(receive(&mut receiver, &mut ack_window, &frames[0]), vec![vec![n]]);
        }

        let second = vec![2u8; 1200];
        let frames = sender.prepare(&second, &mut message_id_counter).unwrap();
        assert_eq!(frames[0].frame[4], 0);

        let mut delivered = Vec::new();
        for frame in &frames {
            delivered.extend(receive(&mut receiver, &mut ack_window, frame));
        }
        assert_eq!(delivered, vec![second]);
    }

    #[test]
    fn test_frame_layouts() {
        let mut message_id_counter = 0x0102;

        let frames = Channel::new(QosType::Unreliable).prepare(&[9], &mut message_id_counter).unwrap();
        assert_eq!(&frames[0].frame[..], &[0u8,4, 9]);
        assert_eq!(frames[0].frame.len() + 1, 4);

        let frames = Channel::new(QosType::UnreliableSequenced).prepare(&[9], &mut message_id_counter).unwrap();
        assert_eq!(&frames[0].frame[..], &[0u8,5, 1, 9]);

        let frames = Channel::new(QosType::Reliable).prepare(&[9], &mut message_id_counter).unwrap();
        assert_eq!(&frames[0].frame[..], &[0u8,6, 1,2, 9]);

        let frames = Channel::new(QosType::ReliableSequenced).prepare(&[9], &mut message_id_counter).unwrap();
        assert_eq!(&frames[0].frame[..], &[0u8,7, 1,3, 1, 9]);

        let frames = Channel::new(QosType::ReliableFragmented).prepare(&[9], &mut message_id_counter).unwrap();
        assert_eq!(&frames[0].frame[..], &[0u8,9, 1,4, 0, 0, 1, 9]);

        assert_eq!(message_id_counter, 0x0105);
    }

    fn sequenced_frame(message_id: u16, sequence: u8, data: &[u8]) -> Vec<u8> {
        let mut frame = BytesMut::new();
        frame.put_u16((6 + data.len()) as u16);
        frame.put_u16(message_id);
        frame.put_u8(sequence);
        frame.put_slice(data);
        frame.to_vec()
    }

    #[test]
    fn test_reliable_sequenced_reordering() {
        let mut channel = Channel::new(QosType::ReliableSequenced);
        let mut ack_window = AckWindow::new(AckMode::Short);

        let mut delivered = Vec::new();
        for (message_id, sequence) in [(2, 2), (1, 1), (3, 3)] {
            let frame = sequenced_frame(message_id, sequence, &[sequence]);
            let mut buf: &[u8] = &frame;
            delivered.extend(channel.process(&mut buf, &mut ack_window).unwrap().delivered);
        }

        assert_eq!(delivered, vec![vec![1], vec![2], vec![3]]);
    }

    #[test]
    fn test_reliable_sequenced_gap_release() {
        let mut channel = Channel::new(QosType::ReliableSequenced);
        let mut ack_window = AckWindow::new(AckMode::Short);

        for (message_id, sequence) in [(3, 3), (4, 4), (2, 2)] {
            let frame = sequenced_frame(message_id, sequence, &[sequence]);
            let mut buf: &[u8] = &frame;
            assert!(channel.process(&mut buf, &mut ack_window).unwrap().delivered.is_empty());
        }

        let frame = sequenced_frame(1, 1, &[1]);
        let mut buf: &[u8] = &frame;
        let processed = channel.process(&mut buf, &mut ack_window).unwrap();
        assert_eq!(processed.delivered, vec![vec![1], vec![2], vec![3], vec![4]]);

        if let Channel::ReliableSequenced { reorder_buffer, next_incoming_sequence, .. } = &channel {
            assert!(reorder_buffer.is_empty());
            assert_eq!(*next_incoming_sequence, 5);
        }
        else {
            panic!("wrong channel type");
        }
    }

    #[test]
    fn test_reliable_sequenced_wrap_around() {
        let mut channel = Channel::ReliableSequenced {
            next_incoming_sequence: 255,
            next_outgoing_sequence: 1,
            reorder_buffer: Default::default(),
        };
        let mut ack_window = AckWindow::new(AckMode::Short);

        // sequence 0 after 255 is 'in the future'
        let frame = sequenced_frame(1, 0, &[0]);
        let mut buf: &[u8] = &frame;
        assert!(channel.process(&mut buf, &mut ack_window).unwrap().delivered.is_empty());

        let frame = sequenced_frame(2, 255, &[255]);
        let mut buf: &[u8] = &frame;
        assert_eq!(channel.process(&mut buf, &mut ack_window).unwrap().delivered, vec![vec![255], vec![0]]);
    }

    #[test]
    fn test_reliable_duplicate_consumes_frame() {
        let mut sender = Channel::new(QosType::Reliable);
        let mut receiver = Channel::new(QosType::Reliable);
        let mut ack_window = AckWindow::new(AckMode::Short);
        let mut message_id_counter = 1;

        let frame = sender.prepare(&[1, 2, 3], &mut message_id_counter).unwrap().remove(0).frame;
        let mut datagram = frame.to_vec();
        datagram.extend_from_slice(&frame);

        let mut buf: &[u8] = &datagram;
        let first = receiver.process(&mut buf, &mut ack_window).unwrap();
        assert_eq!(first, ProcessedFrame { delivered: vec![vec![1, 2, 3]], accepted_reliable: true });
        let second = receiver.process(&mut buf, &mut ack_window).unwrap();
        assert_eq!(second, ProcessedFrame::default());
        assert!(buf.is_empty());
    }

    #[rstest]
    #[case::first(vec![(1, true)])]
    #[case::newer(vec![(1, true), (2, true), (5, true)])]
    #[case::outdated(vec![(3, true), (2, false), (3, false), (4, true)])]
    #[case::wrap_after_max(vec![(255, true), (0, true), (1, true)])]
    #[case::initial_zero(vec![(0, false)])]
    fn test_unreliable_sequenced(#[case] sequence: Vec<(u8, bool)>) {
        let mut channel = Channel::new(QosType::UnreliableSequenced);
        let mut ack_window = AckWindow::new(AckMode::Short);

        for (seq, expected_delivery) in sequence {
            let frame = [0u8,5, seq, 7];
            let mut buf: &[u8] = &frame;
            let processed = channel.process(&mut buf, &mut ack_window).unwrap();
            assert_eq!(!processed.delivered.is_empty(), expected_delivery, "sequence {}", seq);
            assert!(buf.is_empty());
        }
    }

    #[rstest]
    #[case::empty(QosType::Unreliable, vec![])]
    #[case::len_only(QosType::Unreliable, vec![0])]
    #[case::len_below_header(QosType::Reliable, vec![0,4, 1,2])]
    #[case::len_exceeds_datagram(QosType::Unreliable, vec![0,10, 1,2,3])]
    #[case::fragment_index_out_of_range(QosType::ReliableFragmented, vec![0,9, 0,1, 0, 3, 2, 9])]
    #[case::zero_fragments(QosType::ReliableFragmented, vec![0,8, 0,1, 0, 0, 0])]
    #[case::truncated_header(QosType::ReliableSequenced, vec![0,6, 0,1])]
    fn test_malformed(#[case] qos_type: QosType, #[case] raw: Vec<u8>) {
        let mut channel = Channel::new(qos_type);
        let mut ack_window = AckWindow::new(AckMode::Short);
        let mut buf: &[u8] = &raw;
        assert!(channel.process(&mut buf, &mut ack_window).is_err());
    }

    #[test]
    fn test_two_frames_in_one_buffer() {
        let mut channel = Channel::new(QosType::Unreliable);
        let mut ack_window = AckWindow::new(AckMode::Short);
        let raw = [0u8,4, 1, 0,5, 2,3];
        let mut buf: &[u8] = &raw;
        assert_eq!(channel.process(&mut buf, &mut ack_window).unwrap().delivered, vec![vec![1]]);
        assert_eq!(channel.process(&mut buf, &mut ack_window).unwrap().delivered, vec![vec![2, 3]]);
        assert!(buf.is_empty());
    }
}
