//! Quantum and classical channels
//!
//! A [`QuantumChannel`] is directed: qubits pushed by the sender pass through
//! the transit device chain and land in a single lane read by the receiver.
//! A [`ClassicalChannel`] is symmetric and keeps one lane per direction, so
//! each endpoint has a private inbound queue.
//!
//! Channels belong to exactly one trial and are shared between their two
//! endpoint agents through `Arc`.

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, trace};

use qnet_core::{
    AgentId, ChannelId, DEFAULT_PULSE_LENGTH, SIGNAL_SPEED, SharedProgram, SimRng, SimTime,
    WORD_BITS, noise, seeded,
};
use qnet_devices::{Device, DeviceEnv, DeviceReport, QuantumPayload, run_chain};

use crate::lane::{Departure, InFlight, Lane};

/// Distance and signal speed of a link
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Propagation {
    /// Length in km
    pub length: f64,
    /// Signal speed in km/s
    pub signal_speed: f64,
}

impl Propagation {
    pub fn new(length: f64) -> Self {
        Self {
            length,
            signal_speed: SIGNAL_SPEED,
        }
    }

    pub fn with_signal_speed(mut self, signal_speed: f64) -> Self {
        self.signal_speed = signal_speed;
        self
    }

    /// Time of flight over the whole link
    pub fn delay(&self) -> SimTime {
        self.length / self.signal_speed
    }
}

impl Default for Propagation {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Per-trial traffic counters of one channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelReport {
    pub channel: ChannelId,
    /// Sends (one per `put`)
    pub items_sent: u64,
    /// Receives (one per `get`)
    pub items_received: u64,
    /// Qubits or words handed to the channel
    pub units_sent: u64,
    /// Qubits or words that reached the receiver
    pub delivered: u64,
    /// Qubits dropped anywhere between sender and receiver
    pub lost: u64,
    pub devices: Vec<DeviceReport>,
}

#[derive(Debug, Default)]
struct Counters {
    items_sent: u64,
    items_received: u64,
    units_sent: u64,
    delivered: u64,
    lost: u64,
}

struct Transit {
    devices: Vec<Device>,
    rng: SimRng,
    counters: Counters,
}

pub struct QuantumChannel {
    id: ChannelId,
    propagation: Propagation,
    program: SharedProgram,
    lane: Lane<QuantumPayload>,
    transit: Mutex<Transit>,
}

impl QuantumChannel {
    /// Create a channel from `id.from` to `id.to`
    ///
    /// `seed` drives every random draw made by the transit devices.
    pub fn new(
        id: ChannelId,
        propagation: Propagation,
        devices: Vec<Device>,
        program: SharedProgram,
        seed: u64,
    ) -> Self {
        Self {
            id,
            propagation,
            program,
            lane: Lane::new(),
            transit: Mutex::new(Transit {
                devices,
                rng: seeded(seed),
                counters: Counters::default(),
            }),
        }
    }

    pub fn id(&self) -> &ChannelId {
        &self.id
    }

    pub fn propagation(&self) -> Propagation {
        self.propagation
    }

    /// Push a payload through the transit chain and enqueue what is left
    ///
    /// `earliest` is the sender's clock and `source_delay` the time the sender
    /// spends emitting. Returns the timing of the send.
    pub fn put(&self, mut payload: QuantumPayload, earliest: SimTime, source_delay: SimTime) -> Departure {
        let transit_delay = {
            let mut transit = self.transit.lock();
            let Transit {
                devices,
                rng,
                counters,
            } = &mut *transit;
            let mut env = DeviceEnv {
                rng,
                program: &self.program,
            };
            let device_delay = run_chain(devices, &mut payload, &mut env);
            counters.items_sent += 1;
            counters.units_sent += payload.len() as u64;
            self.propagation.delay() + device_delay
        };
        trace!(
            channel = %self.id,
            surviving = payload.qubits.len(),
            lost = payload.lost.len(),
            "quantum transit"
        );
        self.lane.push(payload, earliest, source_delay, transit_delay)
    }

    /// Wait for the next payload
    pub async fn get(&self) -> InFlight<QuantumPayload> {
        let item = self.lane.pop().await;
        self.transit.lock().counters.items_received += 1;
        item
    }

    /// Count the final outcome of a received payload
    ///
    /// Called by the receiver once its own target devices have run, so losses
    /// at every stage are attributed to the channel.
    pub fn record_receipt(&self, payload: &QuantumPayload) {
        let mut transit = self.transit.lock();
        transit.counters.delivered += payload.qubits.len() as u64;
        transit.counters.lost += payload.lost.len() as u64;
    }

    /// Stats of the transit devices, in chain order
    pub fn device_stats(&self) -> Vec<qnet_devices::DeviceStats> {
        self.transit.lock().devices.iter().map(Device::stats).collect()
    }

    pub fn report(&self) -> ChannelReport {
        let transit = self.transit.lock();
        let c = &transit.counters;
        ChannelReport {
            channel: self.id.clone(),
            items_sent: c.items_sent,
            items_received: c.items_received,
            units_sent: c.units_sent,
            delivered: c.delivered,
            lost: c.lost,
            devices: DeviceReport::collect(&self.id.to_string(), &transit.devices),
        }
    }
}

impl std::fmt::Debug for QuantumChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuantumChannel")
            .field("id", &self.id)
            .field("propagation", &self.propagation)
            .field("in_flight", &self.lane.len())
            .finish()
    }
}

/// Settings of a classical link
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassicalSettings {
    pub propagation: Propagation,
    /// Seconds per transmitted bit
    pub pulse_length: f64,
    /// Probability of flipping the lowest bit of each word
    pub flip_probability: f64,
}

impl Default for ClassicalSettings {
    fn default() -> Self {
        Self {
            propagation: Propagation::default(),
            pulse_length: DEFAULT_PULSE_LENGTH,
            flip_probability: 0.0,
        }
    }
}

impl ClassicalSettings {
    /// Time to emit `words` words
    pub fn emission_delay(&self, words: usize) -> SimTime {
        words as f64 * WORD_BITS * self.pulse_length
    }
}

struct Direction {
    target: AgentId,
    lane: Lane<Vec<i64>>,
    noise: Mutex<SimRng>,
    words: Mutex<WordCounts>,
}

#[derive(Debug, Default)]
struct WordCounts {
    sent: u64,
    received: u64,
}

pub struct ClassicalChannel {
    id: ChannelId,
    settings: ClassicalSettings,
    directions: [Direction; 2],
}

impl ClassicalChannel {
    /// Create a symmetric channel between two agents
    ///
    /// Each direction gets its own noise stream derived from `seed`.
    pub fn new(a: AgentId, b: AgentId, settings: ClassicalSettings, seed: u64) -> Self {
        let id = ChannelId::classical(a, b);
        let direction = |target: &AgentId, stream: u64| Direction {
            target: target.clone(),
            lane: Lane::new(),
            noise: Mutex::new(seeded(qnet_core::derive_seed(seed, stream))),
            words: Mutex::new(WordCounts::default()),
        };
        let directions = [direction(&id.to, 0), direction(&id.from, 1)];
        Self {
            id,
            settings,
            directions,
        }
    }

    pub fn id(&self) -> &ChannelId {
        &self.id
    }

    pub fn settings(&self) -> &ClassicalSettings {
        &self.settings
    }

    fn towards(&self, target: &AgentId) -> Option<&Direction> {
        self.directions.iter().find(|d| &d.target == target)
    }

    /// Send words from `from` to the opposite endpoint
    ///
    /// Returns `None` when `from` is not an endpoint.
    pub fn put(&self, from: &AgentId, words: Vec<i64>, earliest: SimTime) -> Option<Departure> {
        let target = self.id.peer_of(from)?;
        let direction = self.towards(target)?;
        let words = if self.settings.flip_probability > 0.0 {
            let mut rng = direction.noise.lock();
            words
                .into_iter()
                .map(|w| noise::flip_classical_bit(&mut *rng, w, self.settings.flip_probability))
                .collect()
        } else {
            words
        };
        let source_delay = self.settings.emission_delay(words.len());
        direction.words.lock().sent += words.len() as u64;
        let departure = direction.lane.push(
            words,
            earliest,
            source_delay,
            self.settings.propagation.delay(),
        );
        debug!(channel = %self.id, %from, sequence = departure.sequence, "classical send");
        Some(departure)
    }

    /// Wait for the next words addressed to `to`
    ///
    /// Returns `None` when `to` is not an endpoint.
    pub async fn get(&self, to: &AgentId) -> Option<InFlight<Vec<i64>>> {
        let direction = self.towards(to)?;
        let item = direction.lane.pop().await;
        direction.words.lock().received += item.payload.len() as u64;
        Some(item)
    }

    pub fn report(&self) -> ChannelReport {
        let mut report = ChannelReport {
            channel: self.id.clone(),
            items_sent: 0,
            items_received: 0,
            units_sent: 0,
            delivered: 0,
            lost: 0,
            devices: Vec::new(),
        };
        for direction in &self.directions {
            let counts = direction.lane.counts();
            report.items_sent += counts.pushed;
            report.items_received += counts.popped;
            let words = direction.words.lock();
            report.units_sent += words.sent;
            report.delivered += words.received;
        }
        report
    }
}

impl std::fmt::Debug for ClassicalChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassicalChannel")
            .field("id", &self.id)
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qnet_devices::DeviceDescriptor;

    fn alice() -> AgentId {
        AgentId::from("Alice")
    }

    fn bob() -> AgentId {
        AgentId::from("Bob")
    }

    #[tokio::test]
    async fn test_quantum_transit_delay() {
        let fiber = Device::from_descriptor(&DeviceDescriptor::fiber(29.98).with("apply_error", 0.0)).unwrap();
        let channel = QuantumChannel::new(
            ChannelId::quantum(alice(), bob()),
            Propagation::new(29.98),
            vec![fiber],
            SharedProgram::default(),
            1,
        );
        let departure = channel.put(QuantumPayload::new(vec![0]), 0.0, 1e-11);
        // link flight time plus the fiber's own delay, both 1e-4 s
        assert!((departure.ready_at - (1e-11 + 2e-4)).abs() < 1e-12);

        let item = channel.get().await;
        channel.record_receipt(&item.payload);
        let report = channel.report();
        assert_eq!(report.items_sent, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.devices[0].kind, "fiber");
    }

    #[tokio::test]
    async fn test_classical_directions_are_independent() {
        let channel = ClassicalChannel::new(bob(), alice(), ClassicalSettings::default(), 3);
        channel.put(&alice(), vec![1], 0.0).unwrap();
        channel.put(&bob(), vec![2, 3], 0.0).unwrap();

        assert_eq!(channel.get(&bob()).await.unwrap().payload, vec![1]);
        assert_eq!(channel.get(&alice()).await.unwrap().payload, vec![2, 3]);
        assert!(channel.put(&AgentId::from("Eve"), vec![0], 0.0).is_none());

        let report = channel.report();
        assert_eq!(report.items_sent, 2);
        assert_eq!(report.delivered, 3);
    }

    #[test]
    fn test_classical_emission_delay() {
        let settings = ClassicalSettings::default();
        let channel = ClassicalChannel::new(alice(), bob(), settings, 0);
        let departure = channel.put(&alice(), vec![7, 8], 1.0).unwrap();
        assert!((departure.completed_at - (1.0 + 2.0 * 64.0 * DEFAULT_PULSE_LENGTH)).abs() < 1e-15);
    }

    #[test]
    fn test_classical_flip_noise() {
        let settings = ClassicalSettings {
            flip_probability: 1.0,
            ..Default::default()
        };
        let channel = ClassicalChannel::new(alice(), bob(), settings, 0);
        channel.put(&alice(), vec![6, 7], 0.0).unwrap();
        let item = channel.directions[0].lane.try_pop().unwrap();
        assert_eq!(item.payload, vec![7, 6]);
    }
}
