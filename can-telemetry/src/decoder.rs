//! Signal decoding engine
//!
//! Extracts signal values from raw CAN frames using the message schema.
//! Handles bit extraction for both byte orders, sign extension, multiplexing
//! and physical value conversion.
//!
//! A frame whose ID is not in the schema decodes to [`Decoded::Unknown`].
//! A signal that cannot be extracted from its frame produces a
//! [`DecodeError`] recorded on the [`DecodedFrame`]; the remaining signals of
//! the frame are still decoded.

use crate::error::DecodeError;
use crate::schema::{ByteOrder, MessageDefinition, MessageSchema, SignalDefinition, ValueType};
use crate::types::{DecodedSignal, RawFrame, SignalValue, Timestamp};
use byteorder::{BigEndian, ByteOrder as _, LittleEndian};

/// Result of running a frame through the decoder
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// No schema entry for this CAN ID. Not an error.
    Unknown,
    /// The frame matched a message definition
    Message(DecodedFrame),
}

/// All signals decoded from one frame
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub can_id: u32,
    pub message_name: String,
    pub timestamp: Timestamp,
    /// Successfully decoded signals, in schema order
    pub signals: Vec<DecodedSignal>,
    /// Signals of this frame that could not be extracted
    pub errors: Vec<DecodeError>,
    /// Active multiplexor value (if the message is multiplexed)
    pub multiplexer_value: Option<u64>,
}

impl DecodedFrame {
    /// Look up a decoded signal by name
    pub fn get(&self, name: &str) -> Option<&DecodedSignal> {
        self.signals.iter().find(|s| s.name == name)
    }

    /// Physical value of a decoded signal by name
    pub fn value(&self, name: &str) -> Option<f64> {
        self.get(name).map(|s| s.value.as_f64())
    }

    /// Keep only the signals accepted by `keep`
    pub fn retain_signals<F: FnMut(&str) -> bool>(&mut self, mut keep: F) {
        self.signals.retain(|s| keep(&s.name));
    }
}

/// Decode a frame against the schema
pub fn decode(frame: &RawFrame, schema: &MessageSchema) -> Decoded {
    match schema.lookup(frame.can_id()) {
        Some(message_def) => Decoded::Message(MessageDecoder::decode_message(frame, message_def)),
        None => Decoded::Unknown,
    }
}

/// Message decoder - extracts signals from CAN frames
pub struct MessageDecoder;

impl MessageDecoder {
    /// Decode every applicable signal of `message_def` from `frame`
    pub fn decode_message(frame: &RawFrame, message_def: &MessageDefinition) -> DecodedFrame {
        let data = frame.data();
        let mut signals = Vec::with_capacity(message_def.signals.len());
        let mut errors = Vec::new();

        // The multiplexor decides which multiplexed signals are present
        let multiplexer_value = message_def
            .multiplexer_signal
            .as_deref()
            .and_then(|name| message_def.signal(name))
            .and_then(|mux| Self::extract_bits(data, frame.can_id(), mux).ok());

        for signal in &message_def.signals {
            if let Some(ref mux_info) = signal.multiplexer_info {
                match multiplexer_value {
                    Some(current) if mux_info.multiplexer_values.contains(&current) => {}
                    _ => continue,
                }
            }

            match Self::decode_signal(data, frame.can_id(), signal) {
                Ok(decoded) => signals.push(decoded),
                Err(e) => errors.push(e),
            }
        }

        DecodedFrame {
            can_id: frame.can_id(),
            message_name: message_def.name.clone(),
            timestamp: frame.timestamp(),
            signals,
            errors,
            multiplexer_value,
        }
    }

    /// Decode a single signal from frame data
    pub fn decode_signal(
        data: &[u8],
        can_id: u32,
        signal: &SignalDefinition,
    ) -> Result<DecodedSignal, DecodeError> {
        let bits = Self::extract_bits(data, can_id, signal)?;

        let (raw_value, numeric) = match signal.value_type {
            ValueType::Unsigned => (bits as i64, bits as f64),
            ValueType::Signed => {
                let signed = Self::sign_extend(bits, signal.length as usize);
                (signed, signed as f64)
            }
        };

        let physical_value = numeric * signal.factor + signal.offset;

        // Unsigned patterns above i64::MAX only survive as a float
        let fits_i64 = signal.value_type == ValueType::Signed || bits <= i64::MAX as u64;
        let unscaled = signal.factor == 1.0 && signal.offset == 0.0;

        let value = if unscaled && signal.length == 1 && signal.value_type == ValueType::Unsigned {
            SignalValue::Boolean(bits != 0)
        } else if !unscaled || !fits_i64 {
            SignalValue::Float(physical_value)
        } else {
            SignalValue::Integer(raw_value)
        };

        let value_description = signal
            .value_table
            .as_ref()
            .filter(|_| fits_i64)
            .and_then(|table| table.get(&raw_value))
            .cloned();

        Ok(DecodedSignal {
            name: signal.name.clone(),
            value,
            unit: signal.unit.clone(),
            value_description,
            raw_value,
        })
    }

    /// Extract the raw, unsigned bit pattern of a signal
    ///
    /// The payload is zero-padded to a 64-bit word and the signal is shifted
    /// out of it. The signal must lie inside the bytes the frame carries.
    pub fn extract_bits(
        data: &[u8],
        can_id: u32,
        signal: &SignalDefinition,
    ) -> Result<u64, DecodeError> {
        let start_bit = signal.start_bit as usize;
        let length = signal.length as usize;

        let out_of_range = || DecodeError::OutOfRange {
            signal: signal.name.clone(),
            start_bit: signal.start_bit,
            length: signal.length,
        };

        if length == 0 || length > 64 {
            return Err(out_of_range());
        }

        // Position of the least significant bit, counted in the word layout
        // used for the shift below
        let (lsb_pos, required_bytes) = match signal.byte_order {
            ByteOrder::LittleEndian => {
                let end = start_bit + length;
                if end > 64 {
                    return Err(out_of_range());
                }
                (start_bit, end.div_ceil(8))
            }
            ByteOrder::BigEndian => {
                // DBC sawtooth numbering: start bit is the MSB, bit 7 is the
                // MSB of byte 0
                if start_bit >= 64 {
                    return Err(out_of_range());
                }
                let msb_pos = (start_bit / 8) * 8 + (7 - start_bit % 8);
                let lsb_pos = msb_pos + length - 1;
                if lsb_pos >= 64 {
                    return Err(out_of_range());
                }
                (lsb_pos, lsb_pos / 8 + 1)
            }
        };

        if required_bytes > data.len() {
            return Err(DecodeError::FrameTooShort {
                can_id,
                signal: signal.name.clone(),
                required: required_bytes,
                available: data.len(),
            });
        }

        let mut word = [0u8; 8];
        let len = data.len().min(8);
        word[..len].copy_from_slice(&data[..len]);

        let shifted = match signal.byte_order {
            ByteOrder::LittleEndian => LittleEndian::read_u64(&word) >> lsb_pos,
            ByteOrder::BigEndian => BigEndian::read_u64(&word) >> (63 - lsb_pos),
        };

        Ok(shifted & Self::mask(length))
    }

    fn mask(length: usize) -> u64 {
        if length >= 64 {
            u64::MAX
        } else {
            (1u64 << length) - 1
        }
    }

    /// Sign-extend a value from N bits to 64 bits
    fn sign_extend(value: u64, bit_length: usize) -> i64 {
        if bit_length >= 64 {
            return value as i64;
        }

        let sign_bit = 1u64 << (bit_length - 1);
        if (value & sign_bit) != 0 {
            let mask = !0u64 << bit_length;
            (value | mask) as i64
        } else {
            value as i64
        }
    }
}
