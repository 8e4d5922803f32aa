use serde_json::Value;

use super::ObjectSchema;

/// One named type a parameter or object property can be checked against.
/// A parameter rule may name several tags; the parameter is valid if *any*
/// tester accepts it.
#[derive(Clone)]
pub enum TypeTag {
    Address,
    AddressFilter,
    Array(Option<Box<TypeTag>>),
    BlockHash,
    BlockNumber,
    BlockNumberOrHash,
    BlockParams,
    Boolean,
    Filter,
    Hex,
    HexEvenLength,
    Hex64,
    TopicHash,
    Topics,
    Transaction,
    TransactionHash,
    TracerType,
    CallTracerConfig,
    OpcodeLoggerConfig,
    TracerConfig,
    TracerConfigWrapper,
    Object(ObjectSchema),
}

const BLOCK_TAGS: [&str; 5] = ["earliest", "latest", "pending", "finalized", "safe"];
const TRACER_NAMES: [&str; 2] = ["callTracer", "prestateTracer"];

pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_0x_hex(s: &str) -> bool {
    s.strip_prefix("0x")
        .is_some_and(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_hexdigit()))
}

fn hex_digits(s: &str) -> Option<&str> {
    s.strip_prefix("0x")
        .filter(|digits| digits.chars().all(|c| c.is_ascii_hexdigit()))
}

fn is_address(value: &Value) -> bool {
    matches!(value, Value::String(s) if s.len() == 42 && hex_digits(s).is_some_and(|d| d.len() == 40))
}

fn is_block_hash_like(value: &Value) -> bool {
    matches!(value, Value::String(s) if s.len() == 66 && hex_digits(s).is_some_and(|d| d.len() == 64))
}

fn is_block_number(value: &Value) -> bool {
    match value {
        Value::String(s) if BLOCK_TAGS.contains(&s.as_str()) => true,
        Value::String(s) => {
            let Some(digits) = hex_digits(s) else {
                return false;
            };
            if digits.is_empty() {
                return false;
            }
            if digits.len() > 1 && digits.starts_with('0') {
                return false;
            }
            u64::from_str_radix(digits, 16)
                .map(|n| n <= (1u64 << 53) - 1)
                .unwrap_or(false)
        }
        _ => false,
    }
}

impl TypeTag {
    /// Returns `Err(message)` naming why the value was rejected.
    pub fn test(&self, value: &Value) -> Result<(), String> {
        match self {
            TypeTag::Address => is_address(value)
                .then_some(())
                .ok_or_else(|| format!("{} is not a valid address", stringify(value))),
            TypeTag::AddressFilter => {
                if is_address(value) {
                    return Ok(());
                }
                match value {
                    Value::Array(items) if items.iter().all(is_address) => Ok(()),
                    _ => Err(format!(
                        "{} is not a valid address or array of addresses",
                        stringify(value)
                    )),
                }
            }
            TypeTag::Array(element) => match value {
                Value::Array(items) => {
                    if let Some(element) = element {
                        items
                            .iter()
                            .try_for_each(|item| element.test(item))
                            .map_err(|e| format!("invalid array element: {e}"))
                    } else {
                        Ok(())
                    }
                }
                _ => Err(format!("{} is not an array", stringify(value))),
            },
            TypeTag::BlockHash => is_block_hash_like(value)
                .then_some(())
                .ok_or_else(|| format!("{} is not a valid block hash", stringify(value))),
            TypeTag::BlockNumber => is_block_number(value)
                .then_some(())
                .ok_or_else(|| format!("{} is not a valid block number", stringify(value))),
            TypeTag::BlockNumberOrHash => TypeTag::BlockNumber
                .test(value)
                .or_else(|_| TypeTag::BlockHash.test(value))
                .map_err(|_| {
                    format!(
                        "{} is not a valid block number or block hash",
                        stringify(value)
                    )
                }),
            TypeTag::BlockParams => {
                if TypeTag::BlockNumber.test(value).is_ok() {
                    return Ok(());
                }
                let Value::Object(map) = value else {
                    return Err(format!(
                        "{} is not a valid block number or block identifier object",
                        stringify(value)
                    ));
                };
                let has_hash = map.contains_key("blockHash");
                let has_number = map.contains_key("blockNumber");
                if has_hash == has_number {
                    return Err(
                        "object must contain exactly one of blockHash or blockNumber".to_string(),
                    );
                }
                for key in map.keys() {
                    if key != "blockHash" && key != "blockNumber" && key != "requireCanonical" {
                        return Err(format!("unknown parameter {key}"));
                    }
                }
                if has_hash {
                    map.get("blockHash")
                        .is_some_and(is_block_hash_like)
                        .then_some(())
                        .ok_or_else(|| "blockHash is not a valid block hash".to_string())
                } else {
                    map.get("blockNumber")
                        .is_some_and(is_block_number)
                        .then_some(())
                        .ok_or_else(|| "blockNumber is not a valid block number".to_string())
                }
            }
            TypeTag::Boolean => value
                .is_boolean()
                .then_some(())
                .ok_or_else(|| format!("{} is not boolean", stringify(value))),
            TypeTag::Filter => {
                let Value::Object(map) = value else {
                    return Err(format!("{} is not a valid filter object", stringify(value)));
                };
                for key in map.keys() {
                    if ![
                        "fromBlock",
                        "toBlock",
                        "blockHash",
                        "address",
                        "topics",
                    ]
                    .contains(&key.as_str())
                    {
                        return Err(format!("unknown parameter {key}"));
                    }
                }
                if map.contains_key("blockHash")
                    && (map.contains_key("fromBlock") || map.contains_key("toBlock"))
                {
                    return Err(
                        "Can't use both blockHash and toBlock/fromBlock".to_string(),
                    );
                }
                if let Some(v) = map.get("fromBlock") {
                    TypeTag::BlockNumber.test(v)?;
                }
                if let Some(v) = map.get("toBlock") {
                    TypeTag::BlockNumber.test(v)?;
                }
                if let Some(v) = map.get("blockHash") {
                    TypeTag::BlockHash.test(v)?;
                }
                if let Some(v) = map.get("address") {
                    TypeTag::AddressFilter.test(v)?;
                }
                if let Some(v) = map.get("topics") {
                    TypeTag::Topics.test(v)?;
                }
                Ok(())
            }
            TypeTag::Hex => is_0x_hex(&stringify_hex(value))
                .then_some(())
                .ok_or_else(|| format!("{} is not valid hex", stringify(value))),
            TypeTag::HexEvenLength => {
                let s = stringify_hex(value);
                match hex_digits(&s) {
                    Some(digits) if !digits.is_empty() && digits.len() % 2 == 0 => Ok(()),
                    _ => Err(format!("{} is not even-length hex", stringify(value))),
                }
            }
            TypeTag::Hex64 => {
                let s = stringify_hex(value);
                match hex_digits(&s) {
                    Some(digits) if !digits.is_empty() && digits.len() <= 64 => Ok(()),
                    _ => Err(format!("{} is not valid hex of up to 64 digits", stringify(value))),
                }
            }
            TypeTag::TopicHash => {
                if value.is_null() {
                    return Ok(());
                }
                is_block_hash_like(value)
                    .then_some(())
                    .ok_or_else(|| format!("{} is not a valid topic hash", stringify(value)))
            }
            TypeTag::Topics => match value {
                Value::Array(items) => items.iter().try_for_each(|item| match item {
                    Value::Array(nested) => nested
                        .iter()
                        .try_for_each(|inner| TypeTag::TopicHash.test(inner)),
                    other => TypeTag::TopicHash.test(other),
                }),
                _ => Err(format!("{} is not a valid topics array", stringify(value))),
            },
            TypeTag::Transaction => {
                let Value::Object(map) = value else {
                    return Err(format!("{} is not a transaction object", stringify(value)));
                };
                const KNOWN: [&str; 12] = [
                    "from",
                    "to",
                    "gas",
                    "gasPrice",
                    "maxPriorityFeePerGas",
                    "maxFeePerGas",
                    "value",
                    "data",
                    "type",
                    "chainId",
                    "nonce",
                    "accessList",
                ];
                let mut obj = map.clone();
                obj.retain(|k, _| KNOWN.contains(&k.as_str()) || k == "input");
                if let Some(Value::Null) = obj.get("to") {
                    obj.remove("to");
                }
                if let Some(from) = obj.get("from") {
                    TypeTag::Address.test(from)?;
                }
                if let Some(to) = obj.get("to") {
                    TypeTag::Address.test(to)?;
                }
                Ok(())
            }
            TypeTag::TransactionHash => is_block_hash_like(value)
                .then_some(())
                .ok_or_else(|| format!("{} is not a valid transaction hash", stringify(value))),
            TypeTag::TracerType => match value {
                Value::String(s) if TRACER_NAMES.contains(&s.as_str()) => Ok(()),
                _ => Err(format!(
                    "{} is not a known tracer ({})",
                    stringify(value),
                    TRACER_NAMES.join(", ")
                )),
            },
            TypeTag::CallTracerConfig => match value {
                Value::Object(map) => {
                    for key in map.keys() {
                        if key != "onlyTopCall" {
                            return Err(format!("unknown parameter {key}"));
                        }
                    }
                    if let Some(v) = map.get("onlyTopCall") {
                        TypeTag::Boolean.test(v)?;
                    }
                    Ok(())
                }
                _ => Err("callTracerConfig must be an object".to_string()),
            },
            TypeTag::OpcodeLoggerConfig => match value {
                Value::Object(map) => {
                    const KEYS: [&str; 4] = [
                        "enableMemory",
                        "disableMemory",
                        "disableStack",
                        "disableStorage",
                    ];
                    for key in map.keys() {
                        if !KEYS.contains(&key.as_str()) {
                            return Err(format!("unknown parameter {key}"));
                        }
                    }
                    for key in KEYS {
                        if let Some(v) = map.get(key) {
                            TypeTag::Boolean.test(v)?;
                        }
                    }
                    Ok(())
                }
                _ => Err("opcodeLoggerConfig must be an object".to_string()),
            },
            TypeTag::TracerConfig => {
                let Value::Object(map) = value else {
                    return Err("tracerConfig must be an object".to_string());
                };
                if map.is_empty() {
                    return Ok(());
                }
                TypeTag::CallTracerConfig
                    .test(value)
                    .or_else(|_| TypeTag::OpcodeLoggerConfig.test(value))
                    .map_err(|_| "tracerConfig does not match any known tracer config".to_string())
            }
            TypeTag::TracerConfigWrapper => {
                let Value::Object(map) = value else {
                    return Err("tracerConfig wrapper must be an object".to_string());
                };
                for key in map.keys() {
                    if key != "tracer" && key != "tracerConfig" {
                        return Err(format!("unknown parameter {key}"));
                    }
                }
                let tracer = map.get("tracer");
                if let Some(tracer) = tracer {
                    TypeTag::TracerType.test(tracer)?;
                }
                if let Some(config) = map.get("tracerConfig") {
                    TypeTag::TracerConfig.test(config)?;
                    let is_opcode_logger = matches!(config, Value::Object(m) if !m.is_empty())
                        && TypeTag::OpcodeLoggerConfig.test(config).is_ok();
                    let tracer_is_call_tracer =
                        matches!(tracer, Some(Value::String(s)) if s == "callTracer");
                    if is_opcode_logger && tracer.is_some() && tracer_is_call_tracer {
                        return Err(
                            "opcode logger config cannot be used with callTracer".to_string()
                        );
                    }
                    if !is_opcode_logger
                        && tracer.is_none()
                        && matches!(config, Value::Object(m) if !m.is_empty())
                    {
                        return Err(
                            "call tracer config requires the callTracer tracer".to_string()
                        );
                    }
                }
                Ok(())
            }
            TypeTag::Object(schema) => {
                let Value::Object(map) = value else {
                    return Err(format!("{} is not an object", stringify(value)));
                };
                let mut owned = Value::Object(map.clone());
                schema.validate(&mut owned)
            }
        }
    }
}

fn stringify_hex(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        _ => String::new(),
    }
}
