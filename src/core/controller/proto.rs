//! SiLA2 wire messages
//!
//! Prost definitions for the parts of the SiLA2 framework this client uses:
//! basic types, observable command bookkeeping, error payloads, the
//! `SiLAService` core feature and the Tecan `FluentControl` feature.
//! Field tags follow the published `.proto` files.

#![allow(missing_docs)]

use base64::Engine;
use prost::Message;

/// Fully qualified gRPC method paths
pub mod paths {
    pub const GET_SERVER_NAME: &str =
        "/sila2.org.silastandard.core.silaservice.v1.SiLAService/Get_ServerName";
    pub const GET_SERVER_TYPE: &str =
        "/sila2.org.silastandard.core.silaservice.v1.SiLAService/Get_ServerType";
    pub const GET_SERVER_VERSION: &str =
        "/sila2.org.silastandard.core.silaservice.v1.SiLAService/Get_ServerVersion";
    pub const GET_SERVER_UUID: &str =
        "/sila2.org.silastandard.core.silaservice.v1.SiLAService/Get_ServerUUID";

    pub const START_FLUENT_CONTROL: &str =
        "/sila2.com.tecan.liquidhandling.fluentcontrol.v1.FluentControl/StartFluentControl";
    pub const GET_STATE: &str =
        "/sila2.com.tecan.liquidhandling.fluentcontrol.v1.FluentControl/Get_State";
    pub const GET_ALL_RUNNABLE_METHODS: &str =
        "/sila2.com.tecan.liquidhandling.fluentcontrol.v1.FluentControl/GetAllRunnableMethods";

    pub const MULTI_CHANNEL_PIPETTE: &str =
        "/sila2.com.tecan.liquidhandling.fluentcontrol.v1.FluentControl/MultiChannelPipette";
    pub const MULTI_CHANNEL_PIPETTE_INFO: &str =
        "/sila2.com.tecan.liquidhandling.fluentcontrol.v1.FluentControl/MultiChannelPipette_Info";
    pub const MULTI_CHANNEL_PIPETTE_RESULT: &str =
        "/sila2.com.tecan.liquidhandling.fluentcontrol.v1.FluentControl/MultiChannelPipette_Result";

    pub const EXECUTE_WORKLIST: &str =
        "/sila2.com.tecan.liquidhandling.fluentcontrol.v1.FluentControl/ExecuteWorklist";
    pub const EXECUTE_WORKLIST_INFO: &str =
        "/sila2.com.tecan.liquidhandling.fluentcontrol.v1.FluentControl/ExecuteWorklist_Info";
    pub const EXECUTE_WORKLIST_RESULT: &str =
        "/sila2.com.tecan.liquidhandling.fluentcontrol.v1.FluentControl/ExecuteWorklist_Result";
}

// --- sila2.org.silastandard framework types ---

#[derive(Clone, PartialEq, Message)]
pub struct SilaString {
    #[prost(string, tag = "1")]
    pub value: String,
}

impl From<&str> for SilaString {
    fn from(value: &str) -> Self {
        Self { value: value.to_string() }
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct Integer {
    #[prost(int64, tag = "1")]
    pub value: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct Real {
    #[prost(double, tag = "1")]
    pub value: f64,
}

#[derive(Clone, PartialEq, Message)]
pub struct Binary {
    #[prost(bytes = "vec", tag = "1")]
    pub value: Vec<u8>,
}

#[derive(Clone, Copy, PartialEq, Message)]
pub struct Duration {
    #[prost(int64, tag = "1")]
    pub seconds: i64,
    #[prost(int32, tag = "2")]
    pub nanos: i32,
}

impl From<Duration> for std::time::Duration {
    fn from(d: Duration) -> Self {
        let secs = u64::try_from(d.seconds).unwrap_or(0);
        let nanos = u32::try_from(d.nanos).unwrap_or(0);
        std::time::Duration::new(secs, nanos)
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct CommandExecutionUuid {
    #[prost(string, tag = "1")]
    pub value: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct CommandConfirmation {
    #[prost(message, optional, tag = "1")]
    pub command_execution_uuid: Option<CommandExecutionUuid>,
    #[prost(message, optional, tag = "2")]
    pub lifetime_of_execution: Option<Duration>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum CommandStatus {
    Waiting = 0,
    Running = 1,
    FinishedSuccessfully = 2,
    FinishedWithError = 3,
}

impl CommandStatus {
    /// Whether the command has reached a final state
    pub fn is_finished(self) -> bool {
        matches!(self, Self::FinishedSuccessfully | Self::FinishedWithError)
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct ExecutionInfo {
    #[prost(enumeration = "CommandStatus", tag = "1")]
    pub command_status: i32,
    #[prost(message, optional, tag = "2")]
    pub progress_info: Option<Real>,
    #[prost(message, optional, tag = "3")]
    pub estimated_remaining_time: Option<Duration>,
    #[prost(message, optional, tag = "4")]
    pub updated_lifetime_of_execution: Option<Duration>,
}

// --- SiLA error payloads ---

#[derive(Clone, PartialEq, Message)]
pub struct SilaError {
    #[prost(oneof = "sila_error::Error", tags = "1, 2, 3, 4")]
    pub error: Option<sila_error::Error>,
}

pub mod sila_error {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Error {
        #[prost(message, tag = "1")]
        ValidationError(super::ValidationError),
        #[prost(message, tag = "2")]
        DefinedExecutionError(super::DefinedExecutionError),
        #[prost(message, tag = "3")]
        UndefinedExecutionError(super::UndefinedExecutionError),
        #[prost(message, tag = "4")]
        FrameworkError(super::FrameworkError),
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct ValidationError {
    #[prost(string, tag = "1")]
    pub parameter: String,
    #[prost(string, tag = "2")]
    pub message: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct DefinedExecutionError {
    #[prost(string, tag = "1")]
    pub error_identifier: String,
    #[prost(string, tag = "2")]
    pub message: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct UndefinedExecutionError {
    #[prost(string, tag = "1")]
    pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum FrameworkErrorType {
    CommandExecutionNotAccepted = 0,
    InvalidCommandExecutionUuid = 1,
    CommandExecutionNotFinished = 2,
    InvalidMetadata = 3,
    NoMetadataAllowed = 4,
}

#[derive(Clone, PartialEq, Message)]
pub struct FrameworkError {
    #[prost(enumeration = "FrameworkErrorType", tag = "1")]
    pub error_type: i32,
    #[prost(string, tag = "2")]
    pub message: String,
}

impl SilaError {
    /// Decode the base64 payload SiLA servers put in an ABORTED status message
    pub fn from_status_message(message: &str) -> Option<Self> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(message.trim())
            .ok()?;
        let decoded = Self::decode(raw.as_slice()).ok()?;
        decoded.error.is_some().then_some(decoded)
    }

    /// Encode as the base64 text carried in a gRPC status message
    pub fn to_status_message(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.encode_to_vec())
    }
}

// --- SiLAService (core feature) ---

#[derive(Clone, PartialEq, Message)]
pub struct GetServerNameParameters {}

#[derive(Clone, PartialEq, Message)]
pub struct GetServerNameResponses {
    #[prost(message, optional, tag = "1")]
    pub server_name: Option<SilaString>,
}

#[derive(Clone, PartialEq, Message)]
pub struct GetServerTypeParameters {}

#[derive(Clone, PartialEq, Message)]
pub struct GetServerTypeResponses {
    #[prost(message, optional, tag = "1")]
    pub server_type: Option<SilaString>,
}

#[derive(Clone, PartialEq, Message)]
pub struct GetServerVersionParameters {}

#[derive(Clone, PartialEq, Message)]
pub struct GetServerVersionResponses {
    #[prost(message, optional, tag = "1")]
    pub server_version: Option<SilaString>,
}

#[derive(Clone, PartialEq, Message)]
pub struct GetServerUuidParameters {}

#[derive(Clone, PartialEq, Message)]
pub struct GetServerUuidResponses {
    #[prost(message, optional, tag = "1")]
    pub server_uuid: Option<SilaString>,
}

// --- FluentControl feature ---

#[derive(Clone, PartialEq, Message)]
pub struct StartFluentControlParameters {
    #[prost(message, optional, tag = "1")]
    pub username: Option<SilaString>,
    #[prost(message, optional, tag = "2")]
    pub password: Option<SilaString>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StartFluentControlResponses {}

#[derive(Clone, PartialEq, Message)]
pub struct GetStateParameters {}

#[derive(Clone, PartialEq, Message)]
pub struct GetStateResponses {
    #[prost(message, optional, tag = "1")]
    pub state: Option<SilaString>,
}

#[derive(Clone, PartialEq, Message)]
pub struct GetAllRunnableMethodsParameters {}

#[derive(Clone, PartialEq, Message)]
pub struct GetAllRunnableMethodsResponses {
    #[prost(message, repeated, tag = "1")]
    pub method_names: Vec<SilaString>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MultiChannelPipetteParameters {
    #[prost(message, optional, tag = "1")]
    pub channel_count: Option<Integer>,
    #[prost(message, repeated, tag = "2")]
    pub volumes: Vec<Real>,
    #[prost(message, optional, tag = "3")]
    pub source: Option<SilaString>,
    #[prost(message, optional, tag = "4")]
    pub destination: Option<SilaString>,
    #[prost(message, optional, tag = "5")]
    pub liquid_class: Option<SilaString>,
    #[prost(message, optional, tag = "6")]
    pub flow_rate: Option<Real>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MultiChannelPipetteResponses {}

#[derive(Clone, PartialEq, Message)]
pub struct ExecuteWorklistParameters {
    #[prost(message, optional, tag = "1")]
    pub file_name: Option<SilaString>,
    #[prost(message, optional, tag = "2")]
    pub content: Option<Binary>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ExecuteWorklistResponses {}
