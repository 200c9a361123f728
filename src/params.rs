//! Login-parameter catalogue and persistent-parameter projection.
//!
//! Persisted parameter records carry an override bitmap plus a full
//! `LoginParams` value block. The projector maps one catalogued parameter
//! out of such a block into a typed set-request for the transport engine;
//! callers loop over the bitmap, so the catalogue lives in one place.

use crate::error::DiscoveryError;
use serde::{Deserialize, Serialize};

/// Identifiers for the login-parameter catalogue.
///
/// The declaration order fixes each parameter's bit in the persisted
/// override bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoginParamId {
    // Boolean parameters
    DataSequenceInOrder,
    ImmediateData,
    InitialR2t,
    DataPduInOrder,
    // Integer parameters
    HeaderDigest,
    DataDigest,
    DefaultTime2Retain,
    DefaultTime2Wait,
    MaxRecvDataSegmentLength,
    FirstBurstLength,
    MaxBurstLength,
    // Integer parameters which currently are unsettable
    MaxConnections,
    OutstandingR2t,
    ErrorRecoveryLevel,
    // Node identity, set directly at init rather than projected from records
    InitiatorName,
    InitiatorAlias,
}

impl LoginParamId {
    pub const ALL: [LoginParamId; 16] = [
        LoginParamId::DataSequenceInOrder,
        LoginParamId::ImmediateData,
        LoginParamId::InitialR2t,
        LoginParamId::DataPduInOrder,
        LoginParamId::HeaderDigest,
        LoginParamId::DataDigest,
        LoginParamId::DefaultTime2Retain,
        LoginParamId::DefaultTime2Wait,
        LoginParamId::MaxRecvDataSegmentLength,
        LoginParamId::FirstBurstLength,
        LoginParamId::MaxBurstLength,
        LoginParamId::MaxConnections,
        LoginParamId::OutstandingR2t,
        LoginParamId::ErrorRecoveryLevel,
        LoginParamId::InitiatorName,
        LoginParamId::InitiatorAlias,
    ];

    /// Bit of this parameter in a persisted override bitmap.
    pub fn bit(self) -> u16 {
        1u16 << (self as u16)
    }
}

/// Full value block for the negotiable login parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginParams {
    pub data_sequence_in_order: bool,
    pub data_pdu_in_order: bool,
    pub immediate_data: bool,
    pub initial_r2t: bool,
    pub header_digest: u32,
    pub data_digest: u32,
    pub default_time_to_retain: u32,
    pub default_time_to_wait: u32,
    pub max_recv_data_seg_len: u32,
    pub first_burst_length: u32,
    pub max_burst_length: u32,
}

impl Default for LoginParams {
    fn default() -> Self {
        Self {
            data_sequence_in_order: true,
            data_pdu_in_order: true,
            immediate_data: true,
            initial_r2t: true,
            header_digest: 0,
            data_digest: 0,
            default_time_to_retain: 20,
            default_time_to_wait: 2,
            max_recv_data_seg_len: 262144,
            first_burst_length: 65536,
            max_burst_length: 262144,
        }
    }
}

/// Typed value carried by a parameter set-request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Bool(bool),
    Integer(u32),
    Text(String),
}

/// A single parameter assignment handed to the transport engine.
///
/// `name` is the node the setting applies to: the initiator's own name for
/// initiator-level parameters, a target name otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSetRequest {
    pub name: String,
    pub param: LoginParamId,
    pub value: ParamValue,
}

impl ParamSetRequest {
    pub fn new(name: &str, param: LoginParamId, value: ParamValue) -> Self {
        Self {
            name: name.to_string(),
            param,
            value,
        }
    }

    /// Project one catalogued parameter out of `params` into a set-request
    /// for `name`. The three unsettable integers and the non-projected ids
    /// are refused; on success the request carries the stamped `param`.
    pub fn project(
        name: &str,
        param: LoginParamId,
        params: &LoginParams,
    ) -> Result<Self, DiscoveryError> {
        let value = match param {
            LoginParamId::DataSequenceInOrder => ParamValue::Bool(params.data_sequence_in_order),
            LoginParamId::ImmediateData => ParamValue::Bool(params.immediate_data),
            LoginParamId::InitialR2t => ParamValue::Bool(params.initial_r2t),
            LoginParamId::DataPduInOrder => ParamValue::Bool(params.data_pdu_in_order),
            LoginParamId::HeaderDigest => ParamValue::Integer(params.header_digest),
            LoginParamId::DataDigest => ParamValue::Integer(params.data_digest),
            LoginParamId::DefaultTime2Retain => ParamValue::Integer(params.default_time_to_retain),
            LoginParamId::DefaultTime2Wait => ParamValue::Integer(params.default_time_to_wait),
            LoginParamId::MaxRecvDataSegmentLength => {
                ParamValue::Integer(params.max_recv_data_seg_len)
            }
            LoginParamId::FirstBurstLength => ParamValue::Integer(params.first_burst_length),
            LoginParamId::MaxBurstLength => ParamValue::Integer(params.max_burst_length),
            _ => return Err(DiscoveryError::Unsupported(param)),
        };
        Ok(Self::new(name, param, value))
    }
}
