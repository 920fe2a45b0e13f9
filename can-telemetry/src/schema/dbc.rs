//! DBC file loader
//!
//! Parses Vector DBC files with the `can-dbc` crate and converts them into
//! the schema's message and signal definitions.

use crate::error::SchemaLoadError;
use crate::schema::database::{
    ByteOrder, MessageDefinition, MessageSchema, MultiplexerInfo, SignalDefinition, ValueType,
};
use crate::types::MAX_EXTENDED_ID;
use std::collections::HashMap;
use std::path::Path;

impl MessageSchema {
    /// Load and merge one or more DBC files into a schema
    ///
    /// Fails when no path is given, when any file cannot be read or parsed,
    /// or when the merged schema ends up without messages. A partial schema
    /// is never returned.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self, SchemaLoadError> {
        if paths.is_empty() {
            return Err(SchemaLoadError::NoSources);
        }

        let mut schema = MessageSchema::new();
        for path in paths {
            for message in parse_dbc_file(path.as_ref())? {
                schema.add_message(message)?;
            }
        }

        let stats = schema.stats();
        log::info!(
            "Schema ready: {} messages, {} signals",
            stats.num_messages,
            stats.num_signals
        );
        Ok(schema)
    }

    /// Build a schema from DBC text held in memory
    pub fn from_dbc_str(content: &str, source_name: &str) -> Result<Self, SchemaLoadError> {
        let mut schema = MessageSchema::new();
        for message in parse_dbc_str(content, source_name)? {
            schema.add_message(message)?;
        }
        Ok(schema)
    }
}

/// Parse a DBC file and return message definitions
pub fn parse_dbc_file(path: &Path) -> Result<Vec<MessageDefinition>, SchemaLoadError> {
    log::info!("Parsing DBC file: {:?}", path);

    let source_name = path.display().to_string();

    // Read as bytes first, DBC exports are often Windows-1252
    let bytes = std::fs::read(path).map_err(|error| SchemaLoadError::Io {
        source_name: source_name.clone(),
        error,
    })?;

    let content = match String::from_utf8(bytes) {
        Ok(content) => content,
        Err(e) => {
            log::warn!("DBC file {:?} is not UTF-8, decoding as Latin-1", path);
            e.into_bytes().iter().map(|&b| b as char).collect()
        }
    };

    parse_dbc_str(&content, &source_name)
}

/// Parse DBC text and return message definitions
pub fn parse_dbc_str(
    content: &str,
    source_name: &str,
) -> Result<Vec<MessageDefinition>, SchemaLoadError> {
    let dbc = can_dbc::DBC::from_slice(content.as_bytes()).map_err(|e| SchemaLoadError::Parse {
        source_name: source_name.to_string(),
        reason: format!("{:?}", e),
    })?;

    let mut messages = Vec::new();
    for dbc_msg in dbc.messages() {
        let can_id = message_id(dbc_msg.message_id());
        if can_id > MAX_EXTENDED_ID {
            // VECTOR__INDEPENDENT_SIG_MSG and similar pseudo messages
            log::debug!(
                "Skipping pseudo message '{}' in {}",
                dbc_msg.message_name(),
                source_name
            );
            continue;
        }
        messages.push(convert_message(&dbc, dbc_msg, can_id, source_name)?);
    }

    if messages.is_empty() {
        return Err(SchemaLoadError::Empty(source_name.to_string()));
    }

    log::info!("Parsed {} messages from {}", messages.len(), source_name);
    Ok(messages)
}

/// DBC flag marking a 29-bit identifier
const DBC_EXTENDED_FLAG: u32 = 0x8000_0000;

/// Arbitration ID of a DBC message, with the extended flag stripped
fn message_id(id: &can_dbc::MessageId) -> u32 {
    id.0 & !DBC_EXTENDED_FLAG
}

/// Convert a can-dbc message to our MessageDefinition
fn convert_message(
    dbc: &can_dbc::DBC,
    dbc_msg: &can_dbc::Message,
    can_id: u32,
    source: &str,
) -> Result<MessageDefinition, SchemaLoadError> {
    let multiplexer_signal = dbc_msg
        .signals()
        .iter()
        .find(|s| matches!(s.multiplexer_indicator(), can_dbc::MultiplexIndicator::Multiplexor))
        .map(|s| s.name().to_string());

    let signals = dbc_msg
        .signals()
        .iter()
        .map(|dbc_sig| convert_signal(dbc, dbc_msg, dbc_sig, can_id, multiplexer_signal.as_deref()))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(MessageDefinition {
        id: can_id,
        name: dbc_msg.message_name().to_string(),
        size: *dbc_msg.message_size() as usize,
        sender: match dbc_msg.transmitter() {
            can_dbc::Transmitter::NodeName(name) => Some(name.to_string()),
            _ => None,
        },
        signals,
        multiplexer_signal,
        source: source.to_string(),
    })
}

/// Convert a can-dbc signal to our SignalDefinition
fn convert_signal(
    dbc: &can_dbc::DBC,
    dbc_msg: &can_dbc::Message,
    dbc_sig: &can_dbc::Signal,
    can_id: u32,
    multiplexer_signal: Option<&str>,
) -> Result<SignalDefinition, SchemaLoadError> {
    let byte_order = match *dbc_sig.byte_order() {
        can_dbc::ByteOrder::LittleEndian => ByteOrder::LittleEndian,
        can_dbc::ByteOrder::BigEndian => ByteOrder::BigEndian,
    };

    let value_type = match *dbc_sig.value_type() {
        can_dbc::ValueType::Signed => ValueType::Signed,
        can_dbc::ValueType::Unsigned => ValueType::Unsigned,
    };

    let value_table = dbc
        .value_descriptions_for_signal(*dbc_msg.message_id(), dbc_sig.name())
        .map(|descriptions| {
            descriptions
                .iter()
                .map(|d| (*d.a() as i64, d.b().to_string()))
                .collect::<HashMap<i64, String>>()
        })
        .filter(|table| !table.is_empty());

    let multiplexer_info = match *dbc_sig.multiplexer_indicator() {
        can_dbc::MultiplexIndicator::MultiplexedSignal(switch_value) => Some(MultiplexerInfo {
            multiplexer_signal: multiplexer_signal
                .ok_or_else(|| SchemaLoadError::InvalidSignal {
                    can_id,
                    signal: dbc_sig.name().to_string(),
                    reason: "multiplexed signal without a multiplexor".to_string(),
                })?
                .to_string(),
            multiplexer_values: vec![switch_value],
        }),
        _ => None,
    };

    let start_bit = u16::try_from(*dbc_sig.start_bit()).map_err(|_| SchemaLoadError::InvalidSignal {
        can_id,
        signal: dbc_sig.name().to_string(),
        reason: format!("start bit {} is out of range", dbc_sig.start_bit()),
    })?;
    let length = u16::try_from(*dbc_sig.signal_size()).map_err(|_| SchemaLoadError::InvalidSignal {
        can_id,
        signal: dbc_sig.name().to_string(),
        reason: format!("length {} is out of range", dbc_sig.signal_size()),
    })?;

    Ok(SignalDefinition {
        name: dbc_sig.name().to_string(),
        start_bit,
        length,
        byte_order,
        value_type,
        factor: *dbc_sig.factor(),
        offset: *dbc_sig.offset(),
        min: *dbc_sig.min(),
        max: *dbc_sig.max(),
        unit: if dbc_sig.unit().is_empty() {
            None
        } else {
            Some(dbc_sig.unit().to_string())
        },
        value_table,
        multiplexer_info,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const LEAF_DBC: &str = r#"
VERSION ""

NS_ :
    CM_
    BA_DEF_
    BA_
    VAL_

BS_:

BU_: LBC VCM

BO_ 1371 LBC_Status: 8 LBC
 SG_ LBC_StateOfCharge : 0|10@1+ (0.1,0) [0|100] "%" VCM
 SG_ LBC_ChargeMode : 10|2@1+ (1,0) [0|3] "" VCM

BO_ 1459 LBC_Health: 8 LBC
 SG_ SOH : 7|8@0+ (1,0) [0|100] "%" VCM
 SG_ BatteryPackTemperature : 15|8@0- (1,0) [-40|80] "C" VCM

VAL_ 1371 LBC_ChargeMode 0 "Idle" 1 "Normal" 2 "Quick" ;
"#;

    #[test]
    fn test_parse_leaf_dbc() {
        let messages = parse_dbc_str(LEAF_DBC, "leaf.dbc").unwrap();
        assert_eq!(messages.len(), 2);

        let status = &messages[0];
        assert_eq!(status.id, 0x55B);
        assert_eq!(status.name, "LBC_Status");
        assert_eq!(status.size, 8);
        assert_eq!(status.sender, Some("LBC".to_string()));
        assert!(!status.is_multiplexed());

        let soc = &status.signals[0];
        assert_eq!(soc.name, "LBC_StateOfCharge");
        assert_eq!(soc.start_bit, 0);
        assert_eq!(soc.length, 10);
        assert_eq!(soc.byte_order, ByteOrder::LittleEndian);
        assert_eq!(soc.factor, 0.1);
        assert_eq!(soc.unit, Some("%".to_string()));

        let mode = &status.signals[1];
        let table = mode.value_table.as_ref().unwrap();
        assert_eq!(table.get(&2), Some(&"Quick".to_string()));

        let health = &messages[1];
        assert_eq!(health.id, 0x5B3);
        let temp = health.signal("BatteryPackTemperature").unwrap();
        assert_eq!(temp.byte_order, ByteOrder::BigEndian);
        assert_eq!(temp.value_type, ValueType::Signed);
    }

    #[test]
    fn test_parse_multiplexed_signals() {
        let dbc_content = r#"
VERSION ""

NS_ :

BS_:

BU_: ECU1

BO_ 512 MultiplexedMsg: 8 ECU1
 SG_ Mode M : 0|8@1+ (1,0) [0|3] "" ECU1
 SG_ SignalA m0 : 8|16@1+ (1,0) [0|100] "%" ECU1
 SG_ SignalB m1 : 8|16@1+ (0.1,0) [0|1000] "mV" ECU1
"#;

        let messages = parse_dbc_str(dbc_content, "mux.dbc").unwrap();
        let msg = &messages[0];
        assert!(msg.is_multiplexed());
        assert_eq!(msg.multiplexer_signal, Some("Mode".to_string()));

        let sig_b = msg.signal("SignalB").unwrap();
        let mux = sig_b.multiplexer_info.as_ref().unwrap();
        assert_eq!(mux.multiplexer_signal, "Mode");
        assert_eq!(mux.multiplexer_values, vec![1]);
    }

    #[test]
    fn test_load_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(LEAF_DBC.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let schema = MessageSchema::load(&[temp_file.path()]).unwrap();
        assert_eq!(schema.message_ids(), vec![0x55B, 0x5B3]);
        assert_eq!(schema.stats().num_signals, 4);
    }

    #[test]
    fn test_latin1_fallback() {
        let mut content = LEAF_DBC.replace("\"C\"", "\"?C\"").into_bytes();
        let pos = content.iter().position(|&b| b == b'?').unwrap();
        content[pos] = 0xB0; // degree sign in Latin-1

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(&content).unwrap();
        temp_file.flush().unwrap();

        let messages = parse_dbc_file(temp_file.path()).unwrap();
        let temp = messages[1].signal("BatteryPackTemperature").unwrap();
        assert_eq!(temp.unit, Some("\u{b0}C".to_string()));
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = MessageSchema::load(&[Path::new("/nonexistent/leaf.dbc")]).unwrap_err();
        assert!(matches!(err, SchemaLoadError::Io { .. }));
    }

    #[test]
    fn test_no_sources_is_error() {
        let paths: [&Path; 0] = [];
        assert!(matches!(
            MessageSchema::load(&paths),
            Err(SchemaLoadError::NoSources)
        ));
    }

    #[test]
    fn test_empty_dbc_is_error() {
        let content = "VERSION \"\"\n\nNS_ :\n\nBS_:\n\nBU_: ECU1\n";
        assert!(matches!(
            parse_dbc_str(content, "empty.dbc"),
            Err(SchemaLoadError::Empty(_))
        ));
    }

    #[test]
    fn test_duplicate_across_files_is_error() {
        let mut first = NamedTempFile::new().unwrap();
        first.write_all(LEAF_DBC.as_bytes()).unwrap();
        let mut second = NamedTempFile::new().unwrap();
        second.write_all(LEAF_DBC.as_bytes()).unwrap();

        let err = MessageSchema::load(&[first.path(), second.path()]).unwrap_err();
        assert!(matches!(err, SchemaLoadError::DuplicateMessage { .. }));
    }
}
