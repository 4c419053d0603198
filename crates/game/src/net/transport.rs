use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Instant;

use super::protocol::{MAX_DATAGRAM_SIZE, Packet, WIRE_SIZE};
use super::stats::{NetworkStats, PacketLossSimulation};

/// A decoded datagram and the endpoint it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Received {
    pub packet: Packet,
    pub from: SocketAddr,
}

/// Non-blocking UDP socket speaking the fixed-size packet format.
pub struct NetworkEndpoint {
    socket: UdpSocket,
    local_addr: SocketAddr,
    stats: NetworkStats,
    recv_buffer: [u8; MAX_DATAGRAM_SIZE],
    started: Instant,
    loss: PacketLossSimulation,
}

impl NetworkEndpoint {
    pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            stats: NetworkStats::default(),
            recv_buffer: [0u8; MAX_DATAGRAM_SIZE],
            started: Instant::now(),
            loss: PacketLossSimulation::default(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn set_loss_simulation(&mut self, loss: PacketLossSimulation) {
        self.loss = loss;
    }

    /// Seconds since the endpoint was bound; written into every header.
    pub fn clock(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Sends one packet. A simulated drop still reports the full size.
    pub fn send_to(&mut self, packet: &Packet, addr: SocketAddr) -> io::Result<usize> {
        let mut packet = *packet;
        packet.set_timestamp(self.clock());

        let data = packet.encode().map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Serialization error: {}", e),
            )
        })?;

        if self.loss.should_drop() {
            log::trace!("simulated loss of {} #{} to {}", packet.kind(), packet.sequence(), addr);
            self.stats.packets_dropped += 1;
            return Ok(data.len());
        }

        match self.socket.send_to(&data, addr) {
            Ok(bytes) => {
                self.stats.packets_sent += 1;
                self.stats.bytes_sent += bytes as u64;
                Ok(bytes)
            }
            Err(e) => {
                self.stats.send_errors += 1;
                Err(e)
            }
        }
    }

    /// Reads up to `limit` datagrams without blocking and returns the valid
    /// ones ordered by sequence number. Equal numbers keep arrival order.
    pub fn drain(&mut self, limit: usize) -> io::Result<Vec<Received>> {
        let mut received = Vec::new();

        for _ in 0..limit {
            match self.socket.recv_from(&mut self.recv_buffer) {
                Ok((size, from)) => {
                    self.stats.bytes_received += size as u64;
                    if size != WIRE_SIZE {
                        log::trace!("dropping {size} byte datagram from {from}");
                        self.stats.packets_malformed += 1;
                        continue;
                    }

                    match Packet::decode(&self.recv_buffer[..size]) {
                        Ok(packet) => {
                            self.stats.packets_received += 1;
                            received.push(Received { packet, from });
                        }
                        Err(e) => {
                            log::debug!("malformed datagram from {from}: {e}");
                            self.stats.packets_malformed += 1;
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                // ICMP port unreachable from a vanished peer.
                Err(e) if e.kind() == io::ErrorKind::ConnectionReset => continue,
                Err(e) => return Err(e),
            }
        }

        received.sort_by_key(|r| r.packet.sequence());
        Ok(received)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::protocol::PacketPayload;
    use std::time::Duration;

    fn drain_until(endpoint: &mut NetworkEndpoint, count: usize) -> Vec<Received> {
        let mut all = Vec::new();
        for _ in 0..100 {
            all.extend(endpoint.drain(64).unwrap());
            if all.len() >= count {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        all
    }

    #[test]
    fn test_drain_skips_wrong_sized_datagrams() {
        let mut receiver = NetworkEndpoint::bind("127.0.0.1:0").unwrap();
        let mut sender = NetworkEndpoint::bind("127.0.0.1:0").unwrap();
        let raw = UdpSocket::bind("127.0.0.1:0").unwrap();

        raw.send_to(&[1, 2, 3], receiver.local_addr()).unwrap();
        sender
            .send_to(&Packet::new(0, PacketPayload::KeepAlive), receiver.local_addr())
            .unwrap();

        let received = drain_until(&mut receiver, 1);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].from, sender.local_addr());
        assert_eq!(receiver.stats().packets_malformed, 1);
    }

    #[test]
    fn test_drain_orders_by_sequence() {
        let mut receiver = NetworkEndpoint::bind("127.0.0.1:0").unwrap();
        let mut sender = NetworkEndpoint::bind("127.0.0.1:0").unwrap();

        for sequence in [4, 2, 3] {
            let mut packet = Packet::new(0, PacketPayload::KeepAlive);
            packet.set_sequence(sequence);
            sender.send_to(&packet, receiver.local_addr()).unwrap();
        }
        std::thread::sleep(Duration::from_millis(50));

        let received = receiver.drain(64).unwrap();
        let order: Vec<u32> = received.iter().map(|r| r.packet.sequence()).collect();
        assert_eq!(order, vec![2, 3, 4]);
    }

    #[test]
    fn test_drain_respects_limit() {
        let mut receiver = NetworkEndpoint::bind("127.0.0.1:0").unwrap();
        let mut sender = NetworkEndpoint::bind("127.0.0.1:0").unwrap();

        for _ in 0..5 {
            sender
                .send_to(&Packet::new(0, PacketPayload::KeepAlive), receiver.local_addr())
                .unwrap();
        }
        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(receiver.drain(2).unwrap().len(), 2);
        assert_eq!(drain_until(&mut receiver, 3).len(), 3);
    }

    #[test]
    fn test_simulated_loss_counts_drops() {
        let mut sender = NetworkEndpoint::bind("127.0.0.1:0").unwrap();
        sender.set_loss_simulation(PacketLossSimulation::lossy(1.0));
        let target: SocketAddr = "127.0.0.1:9".parse().unwrap();

        sender
            .send_to(&Packet::new(0, PacketPayload::KeepAlive), target)
            .unwrap();
        assert_eq!(sender.stats().packets_dropped, 1);
        assert_eq!(sender.stats().packets_sent, 0);
    }
}
