use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use super::protocol::{
    ErrorCode, Packet, PacketKind, PacketPayload, Reliability, sequence_greater_than,
};

/// Reliable packets further than this ahead of the next expected sequence
/// are dropped unacknowledged, so the sender keeps retransmitting them.
pub const REORDER_WINDOW: u32 = 1024;

#[derive(Debug, Clone)]
pub struct PendingPacket {
    pub packet: Packet,
    pub first_sent: Instant,
    pub last_sent: Instant,
    pub resends: u32,
}

/// A pending reliable packet was removed by an Ack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acknowledgement {
    pub kind: PacketKind,
    pub sequence: u32,
}

/// A peer refused one of our reliable requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Refusal {
    pub kind: Option<PacketKind>,
    pub sequence: u32,
    pub error: ErrorCode,
}

/// Outcome of feeding one inbound packet through the engine.
#[derive(Debug, Default)]
pub struct Inbound {
    /// Ack to send back for a reliable packet that was delivered, buffered
    /// or already seen.
    pub reply_ack: Option<Acknowledgement>,
    pub acknowledged: Option<Acknowledgement>,
    pub refused: Option<Refusal>,
    /// Packets to apply, in order.
    pub deliver: Vec<Packet>,
}

/// What the receive side did with one packet.
#[derive(Debug, PartialEq)]
pub enum Receipt {
    /// Ready to apply, followed by any buffered successors it released.
    Deliver(Vec<Packet>),
    Buffered,
    Duplicate,
    /// Unreliable packet at or behind the watermark.
    Stale,
    /// Reliable packet beyond the reorder window.
    Dropped,
}

impl Receipt {
    /// Whether the sender may stop retransmitting the packet.
    pub fn is_acknowledged(&self) -> bool {
        matches!(
            self,
            Receipt::Deliver(_) | Receipt::Buffered | Receipt::Duplicate
        )
    }

    pub fn into_packets(self) -> Vec<Packet> {
        match self {
            Receipt::Deliver(packets) => packets,
            _ => Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct SendTracker {
    next_sequence: [u32; 2],
    pending: BTreeMap<u32, PendingPacket>,
    srtt: f32,
    rtt_var: f32,
}

impl Default for SendTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SendTracker {
    pub fn new() -> Self {
        Self {
            next_sequence: [0; 2],
            pending: BTreeMap::new(),
            srtt: 100.0,
            rtt_var: 50.0,
        }
    }

    /// Assigns the next sequence number of the packet's class. Reliable
    /// packets are kept until acknowledged.
    pub fn stamp(&mut self, mut packet: Packet, now: Instant) -> Packet {
        let class = packet.kind().reliability();
        let slot = &mut self.next_sequence[class.index()];
        let sequence = *slot;
        *slot = slot.wrapping_add(1);
        packet.set_sequence(sequence);

        if class.is_reliable() {
            self.pending.insert(
                sequence,
                PendingPacket {
                    packet,
                    first_sent: now,
                    last_sent: now,
                    resends: 0,
                },
            );
        }

        packet
    }

    pub fn acknowledge(
        &mut self,
        kind: PacketKind,
        sequence: u32,
        now: Instant,
    ) -> Option<PendingPacket> {
        if self.pending.get(&sequence)?.packet.kind() != kind {
            return None;
        }
        let pending = self.pending.remove(&sequence)?;

        // Karn: only unambiguous samples feed the estimate.
        if pending.resends == 0 {
            let rtt = now.duration_since(pending.first_sent).as_secs_f32() * 1000.0;
            self.update_rtt(rtt);
        }
        Some(pending)
    }

    /// Re-stamps and returns every pending packet older than `interval`.
    pub fn collect_resends(&mut self, now: Instant, interval: Duration) -> Vec<Packet> {
        self.pending
            .values_mut()
            .filter(|p| now.duration_since(p.last_sent) >= interval)
            .map(|p| {
                p.last_sent = now;
                p.resends += 1;
                p.packet
            })
            .collect()
    }

    fn update_rtt(&mut self, rtt: f32) {
        const ALPHA: f32 = 0.125;
        const BETA: f32 = 0.25;

        let diff = (rtt - self.srtt).abs();
        self.rtt_var = (1.0 - BETA) * self.rtt_var + BETA * diff;
        self.srtt = (1.0 - ALPHA) * self.srtt + ALPHA * rtt;
    }

    pub fn next_sequence(&self, class: Reliability) -> u32 {
        self.next_sequence[class.index()]
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, sequence: u32) -> bool {
        self.pending.contains_key(&sequence)
    }

    pub fn srtt(&self) -> f32 {
        self.srtt
    }

    pub fn rtt_var(&self) -> f32 {
        self.rtt_var
    }
}

#[derive(Debug, Default)]
pub struct ReceiveTracker {
    next_reliable: u32,
    reorder: BTreeMap<u32, Packet>,
    watermark: Option<u32>,
}

impl ReceiveTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(&mut self, packet: Packet) -> Receipt {
        let sequence = packet.sequence();

        match packet.kind().reliability() {
            Reliability::Unreliable => {
                if let Some(mark) = self.watermark {
                    if !sequence_greater_than(sequence, mark) {
                        log::trace!("stale {} #{sequence} (watermark {mark})", packet.kind());
                        return Receipt::Stale;
                    }
                }
                self.watermark = Some(sequence);
                Receipt::Deliver(vec![packet])
            }
            Reliability::Reliable => {
                if sequence == self.next_reliable {
                    let mut ready = vec![packet];
                    self.next_reliable = self.next_reliable.wrapping_add(1);
                    while let Some(queued) = self.reorder.remove(&self.next_reliable) {
                        ready.push(queued);
                        self.next_reliable = self.next_reliable.wrapping_add(1);
                    }
                    Receipt::Deliver(ready)
                } else if sequence_greater_than(sequence, self.next_reliable) {
                    if sequence.wrapping_sub(self.next_reliable) > REORDER_WINDOW {
                        log::trace!("{} #{sequence} outside reorder window", packet.kind());
                        return Receipt::Dropped;
                    }
                    self.reorder.entry(sequence).or_insert(packet);
                    Receipt::Buffered
                } else {
                    log::trace!("duplicate {} #{sequence}", packet.kind());
                    Receipt::Duplicate
                }
            }
        }
    }

    pub fn next_expected(&self) -> u32 {
        self.next_reliable
    }

    pub fn watermark(&self) -> Option<u32> {
        self.watermark
    }

    pub fn buffered(&self) -> usize {
        self.reorder.len()
    }
}

/// Per-peer sequencing, acknowledgement and retransmission state. Both the
/// server (one per connection) and the client (one for the server) use it.
#[derive(Debug, Default)]
pub struct ReliabilityEngine {
    sender: SendTracker,
    receiver: ReceiveTracker,
}

impl ReliabilityEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stamp(&mut self, packet: Packet, now: Instant) -> Packet {
        self.sender.stamp(packet, now)
    }

    pub fn receive(&mut self, packet: Packet, now: Instant) -> Inbound {
        let mut inbound = Inbound::default();

        // Control effects of Ack/Nack do not depend on the watermark.
        match *packet.payload() {
            PacketPayload::Ack(ack) => {
                let removed = ack
                    .acked_kind()
                    .filter(|&kind| self.sender.acknowledge(kind, ack.sequence, now).is_some());
                inbound.acknowledged = removed.map(|kind| Acknowledgement {
                    kind,
                    sequence: ack.sequence,
                });
            }
            PacketPayload::Nack(nack) => {
                let kind = PacketKind::from_u8(nack.kind);
                if let Some(kind) = kind {
                    self.sender.acknowledge(kind, nack.sequence, now);
                }
                inbound.refused = Some(Refusal {
                    kind,
                    sequence: nack.sequence,
                    error: nack.error_code(),
                });
            }
            _ => {}
        }

        let acknowledgement = Acknowledgement {
            kind: packet.kind(),
            sequence: packet.sequence(),
        };
        let receipt = self.receiver.accept(packet);
        if acknowledgement.kind.reliability().is_reliable() && receipt.is_acknowledged() {
            inbound.reply_ack = Some(acknowledgement);
        }

        inbound.deliver = receipt.into_packets();
        inbound
    }

    pub fn collect_resends(&mut self, now: Instant, interval: Duration) -> Vec<Packet> {
        self.sender.collect_resends(now, interval)
    }

    pub fn sender(&self) -> &SendTracker {
        &self.sender
    }

    pub fn receiver(&self) -> &ReceiveTracker {
        &self.receiver
    }

    pub fn pending_count(&self) -> usize {
        self.sender.pending_count()
    }
}
