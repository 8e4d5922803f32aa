//! Declarative parameter validation.
//!
//! A [`ValidationSchema`] is attached to an [`crate::registry::RpcOperation`]
//! at registration time and evaluated once per dispatch, before the handler
//! ever runs. Nothing here talks to the network or the registry; it is a
//! pure function over `(params, schema)`.

mod types;

use std::collections::BTreeMap;

use serde_json::Value;

pub use types::TypeTag;
use types::stringify;

use crate::errors::RpcErr;

/// Rule attached to one positional parameter.
pub struct ParamRule {
    pub types: Vec<TypeTag>,
    pub required: bool,
}

impl ParamRule {
    pub fn new(required: bool, types: Vec<TypeTag>) -> Self {
        ParamRule { required, types }
    }

    pub fn required(ty: TypeTag) -> Self {
        ParamRule::new(true, vec![ty])
    }

    pub fn optional(ty: TypeTag) -> Self {
        ParamRule::new(false, vec![ty])
    }

    fn test(&self, value: &Value) -> Result<(), String> {
        let mut errors = Vec::with_capacity(self.types.len());
        for ty in &self.types {
            match ty.test(value) {
                Ok(()) => return Ok(()),
                Err(message) => errors.push(message),
            }
        }
        Err(errors.join(" OR "))
    }
}

/// Positional schema: index -> rule. A `BTreeMap` keeps iteration ordered by
/// index, which is what `len(schema)` / "too many parameters" relies on.
pub type ValidationSchema = BTreeMap<usize, ParamRule>;

pub fn validate_params(params: &[Value], schema: &ValidationSchema) -> Result<(), RpcErr> {
    if params.len() > schema.len() {
        return Err(RpcErr::TooManyParams);
    }
    for (index, rule) in schema {
        match params.get(*index) {
            None if rule.required => {
                return Err(RpcErr::MissingParam(index.to_string()));
            }
            None => continue,
            Some(Value::Null) => {
                return Err(RpcErr::InvalidParam(format!(
                    "parameter {index} cannot be null"
                )));
            }
            Some(value) => rule
                .test(value)
                .map_err(|message| RpcErr::InvalidParam(format!("parameter {index}: {message}")))?,
        }
    }
    Ok(())
}

/// Property rule inside an [`ObjectSchema`].
#[derive(Clone)]
pub struct PropertyRule {
    pub types: Vec<TypeTag>,
    pub required: bool,
    pub nullable: bool,
}

impl PropertyRule {
    pub fn new(required: bool, nullable: bool, types: Vec<TypeTag>) -> Self {
        PropertyRule {
            types,
            required,
            nullable,
        }
    }

    fn test(&self, value: &Value) -> Result<(), String> {
        let mut errors = Vec::with_capacity(self.types.len());
        for ty in &self.types {
            match ty.test(value) {
                Ok(()) => return Ok(()),
                Err(message) => errors.push(message),
            }
        }
        Err(errors.join(" OR "))
    }
}

/// Schema for an object-typed parameter (`filter`, `transaction`, etc.).
#[derive(Clone)]
pub struct ObjectSchema {
    pub properties: BTreeMap<String, PropertyRule>,
    pub fail_on_unexpected_params: bool,
    pub delete_unknown_properties: bool,
    pub fail_on_empty: bool,
}

impl ObjectSchema {
    pub fn new(properties: BTreeMap<String, PropertyRule>) -> Self {
        ObjectSchema {
            properties,
            fail_on_unexpected_params: false,
            delete_unknown_properties: false,
            fail_on_empty: false,
        }
    }

    pub fn fail_on_unexpected_params(mut self, value: bool) -> Self {
        self.fail_on_unexpected_params = value;
        self
    }

    pub fn delete_unknown_properties(mut self, value: bool) -> Self {
        self.delete_unknown_properties = value;
        self
    }

    pub fn fail_on_empty(mut self, value: bool) -> Self {
        self.fail_on_empty = value;
        self
    }

    /// Validates `value` in place; when `delete_unknown_properties` is set,
    /// properties the schema doesn't declare are removed from the object.
    pub fn validate(&self, value: &mut Value) -> Result<(), String> {
        let Value::Object(map) = value else {
            return Err(format!("{} is not an object", stringify(value)));
        };

        for (name, rule) in &self.properties {
            match map.get(name) {
                None if rule.required => {
                    return Err(format!("missing required property {name}"));
                }
                None => continue,
                Some(Value::Null) if rule.nullable => continue,
                Some(Value::Null) => {
                    return Err(format!("property {name} cannot be null"));
                }
                Some(v) => rule
                    .test(v)
                    .map_err(|message| format!("property {name}: {message}"))?,
            }
        }

        if self.fail_on_unexpected_params || self.delete_unknown_properties {
            let unknown: Vec<String> = map
                .keys()
                .filter(|k| !self.properties.contains_key(k.as_str()))
                .cloned()
                .collect();
            if self.fail_on_unexpected_params {
                if let Some(first) = unknown.first() {
                    return Err(format!("unknown parameter {first}"));
                }
            }
            if self.delete_unknown_properties {
                for key in unknown {
                    map.remove(&key);
                }
            }
        }

        if self.fail_on_empty && !map.keys().any(|k| self.properties.contains_key(k.as_str())) {
            return Err("object must declare at least one known property".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema_with(index: usize, rule: ParamRule) -> ValidationSchema {
        let mut schema = ValidationSchema::new();
        schema.insert(index, rule);
        schema
    }

    #[test]
    fn too_many_params_is_rejected() {
        let schema = schema_with(0, ParamRule::required(TypeTag::Address));
        let params = vec![
            json!("0x4422E9088662c44604189B2aA3ae8eE282fceBB7"),
            json!("extra"),
        ];
        assert!(matches!(
            validate_params(&params, &schema),
            Err(RpcErr::TooManyParams)
        ));
    }

    #[test]
    fn missing_required_param_is_rejected() {
        let schema = schema_with(0, ParamRule::required(TypeTag::Address));
        assert!(matches!(
            validate_params(&[], &schema),
            Err(RpcErr::MissingParam(_))
        ));
    }

    #[test]
    fn null_is_never_accepted_positionally() {
        let schema = schema_with(0, ParamRule::optional(TypeTag::Address));
        let params = vec![Value::Null];
        assert!(matches!(
            validate_params(&params, &schema),
            Err(RpcErr::InvalidParam(_))
        ));
    }

    #[test]
    fn disjunction_reports_every_tester() {
        let rule = ParamRule::required(TypeTag::Address);
        let mut schema = ValidationSchema::new();
        schema.insert(0, ParamRule::new(true, vec![TypeTag::BlockHash, TypeTag::BlockNumber]));
        let err = validate_params(&[json!("not-a-hash")], &schema).unwrap_err();
        if let RpcErr::InvalidParam(message) = err {
            assert!(message.contains(" OR "));
        } else {
            panic!("expected InvalidParam");
        }
        drop(rule);
    }

    #[test]
    fn filter_rejects_blockhash_with_fromblock() {
        let schema = schema_with(
            0,
            ParamRule::required(TypeTag::Filter),
        );
        let params = vec![json!({
            "blockHash": format!("0x{}", "1".repeat(64)),
            "fromBlock": "latest",
        })];
        let err = validate_params(&params, &schema).unwrap_err();
        match err {
            RpcErr::InvalidParam(message) => {
                assert!(message.contains("Can't use both blockHash and toBlock/fromBlock"))
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn block_number_accepts_tags_and_rejects_leading_zeros() {
        assert!(TypeTag::BlockNumber.test(&json!("latest")).is_ok());
        assert!(TypeTag::BlockNumber.test(&json!("0x0")).is_ok());
        assert!(TypeTag::BlockNumber.test(&json!("0x01")).is_err());
    }
}
