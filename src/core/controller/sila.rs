//! SiLA2 controller client
//!
//! Talks to the FluentControl SiLA2 connector over gRPC. Commands that move
//! liquid are SiLA observable commands: the call returns an execution UUID,
//! progress arrives on the `_Info` stream and the outcome on `_Result`.

use super::proto::{self, paths, sila_error, CommandStatus, SilaError, SilaString};
use super::{
    ConnectionParams, ControllerClient, ControllerError, ControllerKind, PipetteRequest,
    RejectionKind, ServerInfo,
};
use async_trait::async_trait;
use http::uri::PathAndQuery;
use std::path::Path;
use std::time::Instant;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint};
use tonic::{Code, Request, Status};

/// SiLA2 controller client
pub struct SilaController {
    params: ConnectionParams,
    channel: Option<Channel>,
    connected_at: Option<Instant>,
}

impl SilaController {
    /// Create a new client; no connection is made until [`connect`](ControllerClient::connect)
    pub fn new(params: ConnectionParams) -> Self {
        Self {
            params,
            channel: None,
            connected_at: None,
        }
    }

    fn channel(&self) -> Result<Channel, ControllerError> {
        self.channel.clone().ok_or(ControllerError::NotConnected)
    }

    /// TLS settings: the configured CA if any, the platform trust store otherwise
    async fn tls_config(&self) -> Result<ClientTlsConfig, ControllerError> {
        let tls = ClientTlsConfig::new().domain_name(self.params.bare_host());
        match &self.params.ca_cert {
            Some(path) => {
                let pem = tokio::fs::read(path)
                    .await
                    .map_err(|source| ControllerError::FileAccess {
                        path: path.clone(),
                        source,
                    })?;
                Ok(tls.ca_certificate(Certificate::from_pem(pem)))
            }
            None => Ok(tls.with_native_roots()),
        }
    }

    async fn endpoint(&self) -> Result<Endpoint, ControllerError> {
        let mut endpoint = Endpoint::from_shared(self.params.uri())
            .map_err(|e| ControllerError::InvalidParams(e.to_string()))?
            .connect_timeout(self.params.connect_timeout_duration())
            .tcp_nodelay(true);

        if !self.params.insecure {
            endpoint = endpoint
                .tls_config(self.tls_config().await?)
                .map_err(|e| ControllerError::InvalidParams(transport_error_chain(&e)))?;
        }

        Ok(endpoint)
    }

    async fn resolve(&self) -> Result<(), ControllerError> {
        let mut addrs = tokio::net::lookup_host((self.params.bare_host(), self.params.port))
            .await
            .map_err(|e| ControllerError::Resolve {
                host: self.params.host.clone(),
                reason: e.to_string(),
            })?;

        match addrs.next() {
            Some(addr) => {
                tracing::debug!("{} resolved to {}", self.params.host, addr);
                Ok(())
            }
            None => Err(ControllerError::Resolve {
                host: self.params.host.clone(),
                reason: "no addresses returned".into(),
            }),
        }
    }

    async fn unary<Req, Resp>(&self, path: &'static str, message: Req) -> Result<Resp, ControllerError>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = Grpc::new(self.channel()?);
        grpc.ready()
            .await
            .map_err(|e| ControllerError::ConnectionFailed(e.to_string()))?;

        let codec: ProstCodec<Req, Resp> = ProstCodec::default();
        let response = grpc
            .unary(Request::new(message), PathAndQuery::from_static(path), codec)
            .await
            .map_err(|status| status_to_error(&status))?;

        Ok(response.into_inner())
    }

    /// Follow the `_Info` stream until the command reaches a final state
    async fn await_completion(
        &self,
        info_path: &'static str,
        uuid: proto::CommandExecutionUuid,
    ) -> Result<CommandStatus, ControllerError> {
        let mut grpc = Grpc::new(self.channel()?);
        grpc.ready()
            .await
            .map_err(|e| ControllerError::ConnectionFailed(e.to_string()))?;

        let codec: ProstCodec<proto::CommandExecutionUuid, proto::ExecutionInfo> =
            ProstCodec::default();
        let mut stream = grpc
            .server_streaming(Request::new(uuid), PathAndQuery::from_static(info_path), codec)
            .await
            .map_err(|status| status_to_error(&status))?
            .into_inner();

        while let Some(info) = stream
            .message()
            .await
            .map_err(|status| status_to_error(&status))?
        {
            let status = CommandStatus::try_from(info.command_status).map_err(|e| {
                ControllerError::Protocol(format!("unknown command status {}", e.0))
            })?;

            if let Some(progress) = info.progress_info {
                let remaining = info
                    .estimated_remaining_time
                    .map(std::time::Duration::from)
                    .unwrap_or_default();
                tracing::debug!(
                    "{:?} ({:.0}%, about {}s left)",
                    status,
                    progress.value * 100.0,
                    remaining.as_secs()
                );
            }

            if status.is_finished() {
                return Ok(status);
            }
        }

        Err(ControllerError::Protocol(
            "execution info stream ended before the command finished".into(),
        ))
    }

    /// Initiate an observable command, wait for it and fetch its result
    async fn observable<Params, Resp>(
        &self,
        command: &'static str,
        info_path: &'static str,
        result_path: &'static str,
        params: Params,
    ) -> Result<Resp, ControllerError>
    where
        Params: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let run = async {
            let confirmation: proto::CommandConfirmation = self.unary(command, params).await?;
            let uuid = confirmation.command_execution_uuid.ok_or_else(|| {
                ControllerError::Protocol("command confirmation without execution UUID".into())
            })?;
            tracing::debug!("{} accepted as execution {}", command, uuid.value);

            let status = self.await_completion(info_path, uuid.clone()).await?;
            if status == CommandStatus::FinishedWithError {
                tracing::debug!("execution {} finished with error", uuid.value);
            }

            // _Result carries the SiLA error when the command failed
            self.unary::<_, Resp>(result_path, uuid).await
        };

        match self.params.operation_timeout_duration() {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| ControllerError::Timeout(limit))?,
            None => run.await,
        }
    }

    async fn start_fluent(&self) -> Result<(), ControllerError> {
        let params = proto::StartFluentControlParameters {
            username: self.params.username.as_deref().map(SilaString::from),
            password: self.params.password.as_deref().map(SilaString::from),
        };
        let _: proto::StartFluentControlResponses =
            self.unary(paths::START_FLUENT_CONTROL, params).await?;
        Ok(())
    }
}

#[async_trait]
impl ControllerClient for SilaController {
    async fn connect(&mut self) -> Result<(), ControllerError> {
        self.params.validate()?;
        self.resolve().await?;

        let timeout = self.params.connect_timeout_duration();
        let endpoint = self.endpoint().await?;

        tracing::info!("Connecting to SiLA2 server at {}", self.params.uri());
        let channel = tokio::time::timeout(timeout, endpoint.connect())
            .await
            .map_err(|_| ControllerError::Timeout(timeout))?
            .map_err(|e| ControllerError::ConnectionFailed(transport_error_chain(&e)))?;
        self.channel = Some(channel);

        // A TCP handshake alone does not prove a SiLA server is listening
        let verified: Result<proto::GetServerNameResponses, _> = self
            .unary(paths::GET_SERVER_NAME, proto::GetServerNameParameters {})
            .await;
        let name = match verified {
            Ok(name) => name,
            Err(e) => {
                self.channel = None;
                return Err(e);
            }
        };
        let name = name.server_name.map(|s| s.value).unwrap_or_default();
        tracing::info!("Connected to SiLA2 server '{}' at {}", name, self.params.endpoint());

        if self.params.start_fluent {
            match self.start_fluent().await {
                Ok(()) => tracing::info!("FluentControl start command sent"),
                Err(e) => tracing::warn!(
                    "Could not start FluentControl (it may already be running): {}",
                    e
                ),
            }
        }

        self.connected_at = Some(Instant::now());
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ControllerError> {
        if self.channel.take().is_some() {
            if let Some(connected_at) = self.connected_at.take() {
                tracing::info!(
                    "Disconnected from {} after {:.1}s",
                    self.params.endpoint(),
                    connected_at.elapsed().as_secs_f64()
                );
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    async fn server_info(&mut self) -> Result<ServerInfo, ControllerError> {
        let name: proto::GetServerNameResponses = self
            .unary(paths::GET_SERVER_NAME, proto::GetServerNameParameters {})
            .await?;
        let server_type: proto::GetServerTypeResponses = self
            .unary(paths::GET_SERVER_TYPE, proto::GetServerTypeParameters {})
            .await?;
        let version: proto::GetServerVersionResponses = self
            .unary(paths::GET_SERVER_VERSION, proto::GetServerVersionParameters {})
            .await?;
        let uuid: proto::GetServerUuidResponses = self
            .unary(paths::GET_SERVER_UUID, proto::GetServerUuidParameters {})
            .await?;

        let state: proto::GetStateResponses =
            self.unary(paths::GET_STATE, proto::GetStateParameters {}).await?;
        let methods: proto::GetAllRunnableMethodsResponses = self
            .unary(
                paths::GET_ALL_RUNNABLE_METHODS,
                proto::GetAllRunnableMethodsParameters {},
            )
            .await?;
        let runnable_methods: Vec<String> =
            methods.method_names.into_iter().map(|s| s.value).collect();
        if runnable_methods.is_empty() {
            tracing::warn!("No methods available in FluentControl; load a method before running");
        } else {
            tracing::debug!("Available methods: {:?}", runnable_methods);
        }

        Ok(ServerInfo {
            name: name.server_name.map(|s| s.value).unwrap_or_default(),
            server_type: server_type.server_type.map(|s| s.value).unwrap_or_default(),
            version: version.server_version.map(|s| s.value).unwrap_or_default(),
            uuid: uuid.server_uuid.map(|s| s.value).unwrap_or_default(),
            state: state.state.map(|s| s.value).unwrap_or_default(),
            runnable_methods,
        })
    }

    async fn run_multichannel_pipette(
        &mut self,
        request: &PipetteRequest,
    ) -> Result<(), ControllerError> {
        self.channel()?;
        tracing::info!(
            "Pipetting {:?} µL on {} channels: {} -> {}",
            request.volumes,
            request.channels,
            request.source,
            request.destination
        );

        let _: proto::MultiChannelPipetteResponses = self
            .observable(
                paths::MULTI_CHANNEL_PIPETTE,
                paths::MULTI_CHANNEL_PIPETTE_INFO,
                paths::MULTI_CHANNEL_PIPETTE_RESULT,
                pipette_parameters(request),
            )
            .await?;
        Ok(())
    }

    async fn execute_worklist(&mut self, path: &Path) -> Result<(), ControllerError> {
        self.channel()?;
        let content = tokio::fs::read(path)
            .await
            .map_err(|source| ControllerError::FileAccess {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::info!("Submitting worklist {} ({} bytes)", path.display(), content.len());

        let params = proto::ExecuteWorklistParameters {
            file_name: Some(SilaString::from(path.to_string_lossy().as_ref())),
            content: Some(proto::Binary { value: content }),
        };
        let _: proto::ExecuteWorklistResponses = self
            .observable(
                paths::EXECUTE_WORKLIST,
                paths::EXECUTE_WORKLIST_INFO,
                paths::EXECUTE_WORKLIST_RESULT,
                params,
            )
            .await?;
        Ok(())
    }

    fn kind(&self) -> ControllerKind {
        ControllerKind::Sila
    }

    fn endpoint(&self) -> String {
        self.params.endpoint()
    }
}

fn pipette_parameters(request: &PipetteRequest) -> proto::MultiChannelPipetteParameters {
    proto::MultiChannelPipetteParameters {
        channel_count: Some(proto::Integer {
            value: i64::from(request.channels),
        }),
        volumes: request
            .volumes
            .iter()
            .map(|&value| proto::Real { value })
            .collect(),
        source: Some(SilaString::from(request.source.as_str())),
        destination: Some(SilaString::from(request.destination.as_str())),
        liquid_class: Some(SilaString::from(request.liquid_class.as_str())),
        flow_rate: Some(proto::Real {
            value: request.flow_rate,
        }),
    }
}

/// tonic wraps the useful cause (refused, unreachable) a few levels down
fn transport_error_chain(err: &tonic::transport::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Map a gRPC status onto the controller error taxonomy
pub(crate) fn status_to_error(status: &Status) -> ControllerError {
    match status.code() {
        Code::Aborted => match SilaError::from_status_message(status.message()) {
            Some(err) => sila_error_to_error(err),
            None => ControllerError::Rejected {
                kind: RejectionKind::UndefinedExecution,
                message: status.message().to_string(),
            },
        },
        Code::Unavailable => ControllerError::ConnectionFailed(status.message().to_string()),
        Code::DeadlineExceeded => ControllerError::Protocol(format!(
            "deadline exceeded: {}",
            status.message()
        )),
        Code::Unimplemented => ControllerError::FeatureUnavailable(status.message().to_string()),
        Code::Unauthenticated | Code::PermissionDenied => {
            ControllerError::AuthFailed(status.message().to_string())
        }
        code => ControllerError::Protocol(format!("{:?}: {}", code, status.message())),
    }
}

fn sila_error_to_error(err: SilaError) -> ControllerError {
    let (kind, message) = match err.error {
        Some(sila_error::Error::ValidationError(e)) => (
            RejectionKind::Validation,
            format!("parameter {}: {}", e.parameter, e.message),
        ),
        Some(sila_error::Error::DefinedExecutionError(e)) => (
            RejectionKind::DefinedExecution,
            format!("{}: {}", e.error_identifier, e.message),
        ),
        Some(sila_error::Error::UndefinedExecutionError(e)) => {
            (RejectionKind::UndefinedExecution, e.message)
        }
        Some(sila_error::Error::FrameworkError(e)) => {
            let error_type = proto::FrameworkErrorType::try_from(e.error_type)
                .map(|t| format!("{t:?}"))
                .unwrap_or_else(|_| format!("framework error {}", e.error_type));
            (RejectionKind::Framework, format!("{}: {}", error_type, e.message))
        }
        None => (RejectionKind::UndefinedExecution, String::new()),
    };
    ControllerError::Rejected { kind, message }
}
