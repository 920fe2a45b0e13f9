//! Message schema store
//!
//! Holds the message and signal definitions loaded from one or more DBC files.
//! Built once at startup and only read afterwards.

use crate::error::SchemaLoadError;
use std::collections::HashMap;

/// A CAN message definition
#[derive(Debug, Clone)]
pub struct MessageDefinition {
    /// CAN message ID (11 or 29 bits, without the DBC extended flag)
    pub id: u32,
    /// Message name
    pub name: String,
    /// Message size in bytes
    pub size: usize,
    /// Sender ECU name (optional)
    pub sender: Option<String>,
    /// All signals in this message, in DBC order
    pub signals: Vec<SignalDefinition>,
    /// Multiplexor signal name (if the message is multiplexed)
    pub multiplexer_signal: Option<String>,
    /// Source file the message was loaded from
    pub source: String,
}

impl MessageDefinition {
    pub fn is_multiplexed(&self) -> bool {
        self.multiplexer_signal.is_some()
    }

    /// Find a signal of this message by name
    pub fn signal(&self, name: &str) -> Option<&SignalDefinition> {
        self.signals.iter().find(|s| s.name == name)
    }
}

/// A CAN signal definition
#[derive(Debug, Clone)]
pub struct SignalDefinition {
    /// Signal name
    pub name: String,
    /// Start bit in the CAN frame (DBC numbering)
    pub start_bit: u16,
    /// Length in bits
    pub length: u16,
    pub byte_order: ByteOrder,
    pub value_type: ValueType,
    /// Scale factor to convert raw value to physical value
    pub factor: f64,
    /// Offset to add after scaling
    pub offset: f64,
    /// Minimum physical value
    pub min: f64,
    /// Maximum physical value
    pub max: f64,
    /// Engineering unit (e.g., "%", "km/h", "V")
    pub unit: Option<String>,
    /// Value table for enum-like values (raw_value -> description)
    pub value_table: Option<HashMap<i64, String>>,
    /// Multiplexer info (None if not multiplexed)
    pub multiplexer_info: Option<MultiplexerInfo>,
}

impl SignalDefinition {
    /// Plain unsigned little-endian signal with no unit or value table
    pub fn new(name: impl Into<String>, start_bit: u16, length: u16) -> Self {
        Self {
            name: name.into(),
            start_bit,
            length,
            byte_order: ByteOrder::LittleEndian,
            value_type: ValueType::Unsigned,
            factor: 1.0,
            offset: 0.0,
            min: 0.0,
            max: 0.0,
            unit: None,
            value_table: None,
            multiplexer_info: None,
        }
    }

    pub fn with_scaling(mut self, factor: f64, offset: f64) -> Self {
        self.factor = factor;
        self.offset = offset;
        self
    }

    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    pub fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    fn validate(&self, can_id: u32) -> Result<(), SchemaLoadError> {
        if self.length == 0 || self.length > 64 {
            return Err(SchemaLoadError::InvalidSignal {
                can_id,
                signal: self.name.clone(),
                reason: format!("length {} is outside 1..=64 bits", self.length),
            });
        }
        if !self.factor.is_finite() || !self.offset.is_finite() {
            return Err(SchemaLoadError::InvalidSignal {
                can_id,
                signal: self.name.clone(),
                reason: "factor and offset must be finite".to_string(),
            });
        }
        Ok(())
    }
}

/// Byte order for signal extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Little-endian (Intel format)
    LittleEndian,
    /// Big-endian (Motorola format)
    BigEndian,
}

/// Value type for signal interpretation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// Two's complement over the signal length
    Signed,
    Unsigned,
}

/// Multiplexer information for multiplexed signals
#[derive(Debug, Clone)]
pub struct MultiplexerInfo {
    /// Name of the multiplexor signal that controls this signal
    pub multiplexer_signal: String,
    /// Multiplexor value(s) for which this signal is present
    pub multiplexer_values: Vec<u64>,
}

/// The message schema: CAN ID -> message definition
#[derive(Debug, Default)]
pub struct MessageSchema {
    messages: HashMap<u32, MessageDefinition>,

    /// Signal name lookup: signal name -> (CAN ID, signal index)
    signal_lookup: HashMap<String, (u32, usize)>,
}

impl MessageSchema {
    /// Create a new empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message definition to the schema
    ///
    /// Message IDs are unique: a second definition for the same ID is
    /// rejected. Signal lengths and scaling are validated here so the decoder
    /// never sees a definition it cannot evaluate.
    pub fn add_message(&mut self, message: MessageDefinition) -> Result<(), SchemaLoadError> {
        let can_id = message.id;

        if let Some(existing) = self.messages.get(&can_id) {
            return Err(SchemaLoadError::DuplicateMessage {
                can_id,
                first: existing.source.clone(),
                second: message.source.clone(),
            });
        }

        for signal in &message.signals {
            signal.validate(can_id)?;
        }

        // Signal names are not unique across a DBC; the first message wins
        for (sig_idx, signal) in message.signals.iter().enumerate() {
            self.signal_lookup
                .entry(signal.name.clone())
                .or_insert((can_id, sig_idx));
        }

        self.messages.insert(can_id, message);
        Ok(())
    }

    /// Message definition for a CAN ID, if the schema knows it
    pub fn lookup(&self, can_id: u32) -> Option<&MessageDefinition> {
        self.messages.get(&can_id)
    }

    pub fn contains(&self, can_id: u32) -> bool {
        self.messages.contains_key(&can_id)
    }

    /// Find the message carrying a signal, by signal name
    pub fn find_signal(&self, signal_name: &str) -> Option<(u32, &SignalDefinition)> {
        let (can_id, sig_idx) = self.signal_lookup.get(signal_name)?;
        self.messages
            .get(can_id)
            .and_then(|msg| msg.signals.get(*sig_idx))
            .map(|sig| (*can_id, sig))
    }

    /// All message definitions, sorted by CAN ID
    pub fn messages(&self) -> Vec<&MessageDefinition> {
        let mut messages: Vec<_> = self.messages.values().collect();
        messages.sort_unstable_by_key(|m| m.id);
        messages
    }

    /// All CAN IDs in the schema, sorted
    pub fn message_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.messages.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Get schema statistics
    pub fn stats(&self) -> SchemaStats {
        SchemaStats {
            num_messages: self.messages.len(),
            num_signals: self.messages.values().map(|m| m.signals.len()).sum(),
        }
    }
}

/// Schema statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaStats {
    /// Total number of message definitions
    pub num_messages: usize,
    /// Total number of signal definitions
    pub num_signals: usize,
}
