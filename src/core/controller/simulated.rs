//! Simulated FluentControl
//!
//! An in-process stand-in for the vendor controller, used for dry runs and
//! tests. It keeps the same bookkeeping a real run would touch: tip state per
//! channel, liquid per well and a log of every command the runtime executed.
//!
//! Wells are keyed `labware:well`. Wells with no recorded volume are treated
//! as unlimited sources; a well becomes tracked once it is preloaded with
//! [`SimulatorConfig::with_liquid`] or receives a dispense.

use super::{
    ConnectionParams, ControllerClient, ControllerError, ControllerKind, PipetteRequest,
    RejectionKind, ServerInfo,
};
use crate::core::worklist::{Worklist, WorklistCommand};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Simulator behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Whether the controller software is "running"
    pub reachable: bool,
    /// Pipetting channels on the simulated arm
    pub num_channels: u32,
    /// Delay per executed command in milliseconds
    pub step_delay_ms: u64,
    /// Refuse every pipetting command
    pub reject_pipetting: bool,
    /// Refuse every worklist
    pub reject_worklists: bool,
    /// Methods reported by `GetAllRunnableMethods`
    pub methods: Vec<String>,
    /// Preloaded well volumes in µL
    pub wells: BTreeMap<String, f64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            reachable: true,
            num_channels: 8,
            step_delay_ms: 0,
            reject_pipetting: false,
            reject_worklists: false,
            methods: vec!["simulation_method".to_string()],
            wells: BTreeMap::new(),
        }
    }
}

impl SimulatorConfig {
    /// Simulate controller software that is not running
    #[must_use]
    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    /// Set channel count
    #[must_use]
    pub fn channels(mut self, num_channels: u32) -> Self {
        self.num_channels = num_channels;
        self
    }

    /// Set per-command delay
    #[must_use]
    pub fn step_delay(mut self, ms: u64) -> Self {
        self.step_delay_ms = ms;
        self
    }

    /// Refuse pipetting commands
    #[must_use]
    pub fn reject_pipetting(mut self) -> Self {
        self.reject_pipetting = true;
        self
    }

    /// Refuse worklists
    #[must_use]
    pub fn reject_worklists(mut self) -> Self {
        self.reject_worklists = true;
        self
    }

    /// Replace the runnable method list
    #[must_use]
    pub fn with_methods(mut self, methods: &[&str]) -> Self {
        self.methods = methods.iter().map(ToString::to_string).collect();
        self
    }

    /// Preload a well
    #[must_use]
    pub fn with_liquid(mut self, well: &str, volume: f64) -> Self {
        self.wells.insert(well.to_string(), volume);
        self
    }
}

/// Command recorded by the simulated runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedCommand {
    /// Execution the command belongs to
    pub execution: Uuid,
    /// Runtime command name
    pub command: String,
    /// Command parameters
    pub params: serde_json::Value,
}

/// Snapshot of the simulator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorStatus {
    /// Session open
    pub connected: bool,
    /// FluentControl started
    pub started: bool,
    /// Runtime controller initialized
    pub runtime_initialized: bool,
    /// Commands executed so far
    pub command_count: usize,
    /// Completed command executions
    pub executions: usize,
    /// Channel -> tip mounted
    pub tip_states: BTreeMap<u32, bool>,
    /// Well -> volume in µL
    pub liquid_states: BTreeMap<String, f64>,
}

#[derive(Debug, Default)]
struct SimState {
    connected: bool,
    started: bool,
    runtime_initialized: bool,
    executions: usize,
    tips: BTreeMap<u32, bool>,
    liquids: BTreeMap<String, f64>,
    commands: Vec<SimulatedCommand>,
}

impl SimState {
    fn record(&mut self, execution: Uuid, command: &str, params: serde_json::Value) {
        tracing::debug!("Executed command {} with params {}", command, params);
        self.commands.push(SimulatedCommand {
            execution,
            command: command.to_string(),
            params,
        });
    }

    fn ensure_liquid(&self, well: &str, volume: f64) -> Result<(), ControllerError> {
        match self.liquids.get(well) {
            Some(current) if *current < volume => Err(ControllerError::Rejected {
                kind: RejectionKind::DefinedExecution,
                message: format!("NotEnoughLiquid: {well} holds {current} µL, {volume} µL requested"),
            }),
            _ => Ok(()),
        }
    }

    fn aspirate(&mut self, well: &str, volume: f64) -> Result<(), ControllerError> {
        self.ensure_liquid(well, volume)?;
        if let Some(current) = self.liquids.get_mut(well) {
            *current -= volume;
        }
        Ok(())
    }

    fn dispense(&mut self, well: &str, volume: f64) {
        *self.liquids.entry(well.to_string()).or_insert(0.0) += volume;
    }
}

/// In-process controller simulation
///
/// Clones share state, so a test can keep a clone for inspection after
/// handing the controller to a tester.
#[derive(Debug, Clone)]
pub struct SimulatedController {
    config: SimulatorConfig,
    params: ConnectionParams,
    server_uuid: Uuid,
    state: Arc<RwLock<SimState>>,
}

impl SimulatedController {
    /// Create a simulator
    pub fn new(config: SimulatorConfig) -> Self {
        let state = SimState {
            liquids: config.wells.clone(),
            ..SimState::default()
        };
        Self {
            config,
            params: ConnectionParams::default(),
            server_uuid: Uuid::new_v4(),
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Report the given endpoint as the simulated one
    #[must_use]
    pub fn with_params(mut self, params: ConnectionParams) -> Self {
        self.params = params;
        self
    }

    /// Current status
    pub fn status(&self) -> SimulatorStatus {
        let state = self.state.read();
        SimulatorStatus {
            connected: state.connected,
            started: state.started,
            runtime_initialized: state.runtime_initialized,
            command_count: state.commands.len(),
            executions: state.executions,
            tip_states: state.tips.clone(),
            liquid_states: state.liquids.clone(),
        }
    }

    /// Every command executed so far
    pub fn commands(&self) -> Vec<SimulatedCommand> {
        self.state.read().commands.clone()
    }

    /// Liquid in a well, if tracked
    pub fn liquid(&self, well: &str) -> Option<f64> {
        self.state.read().liquids.get(well).copied()
    }

    fn ensure_ready(&self) -> Result<(), ControllerError> {
        let state = self.state.read();
        if !state.connected {
            return Err(ControllerError::NotConnected);
        }
        if !state.runtime_initialized {
            return Err(ControllerError::Rejected {
                kind: RejectionKind::Framework,
                message: "CommandExecutionNotAccepted: runtime not initialized".into(),
            });
        }
        Ok(())
    }

    async fn pause(&self, steps: u64) {
        if self.config.step_delay_ms > 0 && steps > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.step_delay_ms * steps)).await;
        }
    }

    fn validate_pipette(&self, request: &PipetteRequest) -> Result<(), ControllerError> {
        let validation = |message: String| ControllerError::Rejected {
            kind: RejectionKind::Validation,
            message,
        };

        if request.channels == 0 || request.channels > self.config.num_channels {
            return Err(validation(format!(
                "parameter ChannelCount: must be between 1 and {}, got {}",
                self.config.num_channels, request.channels
            )));
        }
        if request.volumes.len() != request.channels as usize {
            return Err(validation(format!(
                "parameter Volumes: expected {} volumes, got {}",
                request.channels,
                request.volumes.len()
            )));
        }
        if let Some(bad) = request
            .volumes
            .iter()
            .find(|v| !v.is_finite() || **v <= 0.0)
        {
            return Err(validation(format!(
                "parameter Volumes: volumes must be positive, got {bad}"
            )));
        }
        Ok(())
    }

    async fn run_worklist_command(
        &self,
        execution: Uuid,
        command: &WorklistCommand,
    ) -> Result<(), ControllerError> {
        {
            let mut state = self.state.write();
            match command {
                WorklistCommand::Aspirate { labware, well, volume } => {
                    let key = format!("{labware}:{well}");
                    state.aspirate(&key, *volume)?;
                    tracing::info!("Simulating aspirate: {}µL from {} {}", volume, labware, well);
                    state.record(
                        execution,
                        "Aspirate",
                        serde_json::json!({ "well": key, "volume": volume }),
                    );
                }
                WorklistCommand::Dispense { labware, well, volume } => {
                    let key = format!("{labware}:{well}");
                    state.dispense(&key, *volume);
                    tracing::info!("Simulating dispense: {}µL to {} {}", volume, labware, well);
                    state.record(
                        execution,
                        "Dispense",
                        serde_json::json!({ "well": key, "volume": volume }),
                    );
                }
                WorklistCommand::Mix { labware, well, cycles, volume } => {
                    tracing::info!(
                        "Simulating mix: {} cycles of {}µL in {} {}",
                        cycles,
                        volume,
                        labware,
                        well
                    );
                    state.record(
                        execution,
                        "Mix",
                        serde_json::json!({
                            "well": format!("{labware}:{well}"),
                            "cycles": cycles,
                            "volume": volume,
                        }),
                    );
                }
                WorklistCommand::Wash => {
                    tracing::info!("Simulating tip wash");
                    state.record(execution, "Wash", serde_json::Value::Null);
                }
                WorklistCommand::Break => {
                    tracing::info!("Simulating break (pause)");
                    state.record(execution, "Break", serde_json::Value::Null);
                }
            }
        }

        let steps = match command {
            WorklistCommand::Mix { cycles, .. } => u64::from(*cycles),
            _ => 1,
        };
        self.pause(steps).await;
        Ok(())
    }
}

#[async_trait]
impl ControllerClient for SimulatedController {
    async fn connect(&mut self) -> Result<(), ControllerError> {
        self.params.validate()?;
        if !self.config.reachable {
            return Err(ControllerError::ConnectionFailed(format!(
                "no controller listening at {}",
                self.params.endpoint()
            )));
        }

        let mut state = self.state.write();
        state.connected = true;
        state.started = true;
        tracing::info!("FluentControl simulation started");
        state.runtime_initialized = true;
        tracing::info!("Connected to simulated Tecan Fluent at {}", self.params.endpoint());
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ControllerError> {
        let mut state = self.state.write();
        if state.connected {
            state.connected = false;
            state.started = false;
            state.runtime_initialized = false;
            tracing::info!("Disconnected from simulated Tecan Fluent");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.read().connected
    }

    async fn server_info(&mut self) -> Result<ServerInfo, ControllerError> {
        if !self.is_connected() {
            return Err(ControllerError::NotConnected);
        }
        let state = if self.state.read().runtime_initialized {
            "Ready"
        } else {
            "Idle"
        };
        if self.config.methods.is_empty() {
            tracing::warn!("No methods available in FluentControl");
        }
        Ok(ServerInfo {
            name: "Simulated FluentControl".to_string(),
            server_type: "TecanFluent".to_string(),
            version: crate::VERSION.to_string(),
            uuid: self.server_uuid.to_string(),
            state: state.to_string(),
            runnable_methods: self.config.methods.clone(),
        })
    }

    async fn run_multichannel_pipette(
        &mut self,
        request: &PipetteRequest,
    ) -> Result<(), ControllerError> {
        self.ensure_ready()?;
        if self.config.reject_pipetting {
            return Err(ControllerError::Rejected {
                kind: RejectionKind::DefinedExecution,
                message: "MethodFailed: pipetting rejected by simulated controller".into(),
            });
        }
        self.validate_pipette(request)?;
        // the whole transfer must fit before the first tip is picked up
        self.state
            .read()
            .ensure_liquid(&request.source, request.total_volume())?;

        let execution = Uuid::new_v4();
        for (channel, &volume) in (0..request.channels).zip(&request.volumes) {
            {
                let mut state = self.state.write();
                state.record(execution, "PickUpTip", serde_json::json!({ "channel": channel }));
                state.tips.insert(channel, true);

                state.aspirate(&request.source, volume)?;
                tracing::info!(
                    "Simulating aspiration of {}µL from {} using channel {}",
                    volume,
                    request.source,
                    channel
                );
                state.record(
                    execution,
                    "Aspirate",
                    serde_json::json!({
                        "channel": channel,
                        "well": request.source,
                        "volume": volume,
                        "liquid_class": request.liquid_class,
                        "flow_rate": request.flow_rate,
                    }),
                );

                state.dispense(&request.destination, volume);
                tracing::info!(
                    "Simulating dispense of {}µL to {} using channel {}",
                    volume,
                    request.destination,
                    channel
                );
                state.record(
                    execution,
                    "Dispense",
                    serde_json::json!({
                        "channel": channel,
                        "well": request.destination,
                        "volume": volume,
                        "liquid_class": request.liquid_class,
                        "flow_rate": request.flow_rate,
                    }),
                );

                state.record(execution, "DropTip", serde_json::json!({ "channel": channel }));
                state.tips.insert(channel, false);
            }
            self.pause(1).await;
        }

        self.state.write().executions += 1;
        Ok(())
    }

    async fn execute_worklist(&mut self, path: &Path) -> Result<(), ControllerError> {
        self.ensure_ready()?;
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ControllerError::FileAccess {
                path: path.to_path_buf(),
                source,
            })?;

        if self.config.reject_worklists {
            return Err(ControllerError::Rejected {
                kind: RejectionKind::DefinedExecution,
                message: "InvalidWorklist: worklist rejected by simulated controller".into(),
            });
        }

        let worklist = Worklist::parse(&text).map_err(|e| ControllerError::Rejected {
            kind: RejectionKind::DefinedExecution,
            message: format!("InvalidWorklist: {e}"),
        })?;
        tracing::info!("Loaded {} commands from {}", worklist.len(), path.display());

        let execution = Uuid::new_v4();
        for command in &worklist.commands {
            self.run_worklist_command(execution, command).await?;
        }

        self.state.write().executions += 1;
        Ok(())
    }

    fn kind(&self) -> ControllerKind {
        ControllerKind::Simulated
    }

    fn endpoint(&self) -> String {
        self.params.endpoint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn worklist_file(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_unreachable_controller() {
        let mut sim = SimulatedController::new(SimulatorConfig::default().unreachable());
        assert!(matches!(
            sim.connect().await,
            Err(ControllerError::ConnectionFailed(_))
        ));
        assert!(!sim.is_connected());
    }

    #[tokio::test]
    async fn test_operations_before_connect() {
        let mut sim = SimulatedController::new(SimulatorConfig::default());
        let req = PipetteRequest::default();
        assert!(matches!(
            sim.run_multichannel_pipette(&req).await,
            Err(ControllerError::NotConnected)
        ));
        assert!(matches!(sim.server_info().await, Err(ControllerError::NotConnected)));
    }

    #[tokio::test]
    async fn test_pipette_records_commands() {
        let mut sim = SimulatedController::new(
            SimulatorConfig::default().with_liquid("Source_96:A1", 1000.0),
        );
        sim.connect().await.unwrap();

        let req = PipetteRequest::uniform(4, 50.0, "Source_96:A1", "Dest_96:A1");
        sim.run_multichannel_pipette(&req).await.unwrap();

        let status = sim.status();
        assert_eq!(status.command_count, 16);
        assert_eq!(status.executions, 1);
        assert!(status.tip_states.values().all(|mounted| !mounted));
        assert_eq!(sim.liquid("Source_96:A1"), Some(800.0));
        assert_eq!(sim.liquid("Dest_96:A1"), Some(200.0));
    }

    #[tokio::test]
    async fn test_pipette_validation() {
        let mut sim = SimulatedController::new(SimulatorConfig::default().channels(8));
        sim.connect().await.unwrap();

        let too_many = PipetteRequest::uniform(9, 10.0, "S:A1", "D:A1");
        assert!(matches!(
            sim.run_multichannel_pipette(&too_many).await,
            Err(ControllerError::Rejected { kind: RejectionKind::Validation, .. })
        ));

        let mut mismatched = PipetteRequest::uniform(4, 10.0, "S:A1", "D:A1");
        mismatched.volumes.pop();
        assert!(sim.run_multichannel_pipette(&mismatched).await.is_err());

        let zero = PipetteRequest::uniform(2, 0.0, "S:A1", "D:A1");
        assert!(sim.run_multichannel_pipette(&zero).await.is_err());

        assert_eq!(sim.status().command_count, 0);
    }

    #[tokio::test]
    async fn test_pipette_not_enough_liquid() {
        let mut sim =
            SimulatedController::new(SimulatorConfig::default().with_liquid("S:A1", 60.0));
        sim.connect().await.unwrap();

        let req = PipetteRequest::uniform(2, 50.0, "S:A1", "D:A1");
        let err = sim.run_multichannel_pipette(&req).await.unwrap_err();
        assert!(err.to_string().contains("NotEnoughLiquid"));
        assert!(err.to_string().contains("100 µL requested"), "{err}");

        // nothing moved and no tip left on a channel
        let status = sim.status();
        assert_eq!(status.command_count, 0);
        assert_eq!(status.executions, 0);
        assert!(status.tip_states.values().all(|mounted| !mounted));
        assert_eq!(sim.liquid("S:A1"), Some(60.0));
        assert_eq!(sim.liquid("D:A1"), None);
    }

    #[tokio::test]
    async fn test_server_info_reports_state_and_methods() {
        let mut sim = SimulatedController::new(
            SimulatorConfig::default().with_methods(&["Prime", "DailyCheck"]),
        );
        sim.connect().await.unwrap();

        let info = sim.server_info().await.unwrap();
        assert_eq!(info.state, "Ready");
        assert_eq!(info.runnable_methods, ["Prime", "DailyCheck"]);

        let mut empty = SimulatedController::new(SimulatorConfig::default().with_methods(&[]));
        empty.connect().await.unwrap();
        assert!(empty.server_info().await.unwrap().runnable_methods.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_pipetting() {
        let mut sim = SimulatedController::new(SimulatorConfig::default().reject_pipetting());
        sim.connect().await.unwrap();
        let err = sim
            .run_multichannel_pipette(&PipetteRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_worklist_execution() {
        let file = worklist_file("A;Source_96;A1;;50\nD;Dest_96;A1;;50\nW;\nM;Dest_96;A1;2;20\n");
        let mut sim = SimulatedController::new(
            SimulatorConfig::default().with_liquid("Source_96:A1", 100.0),
        );
        sim.connect().await.unwrap();

        sim.execute_worklist(file.path()).await.unwrap();

        let names: Vec<String> = sim.commands().into_iter().map(|c| c.command).collect();
        assert_eq!(names, ["Aspirate", "Dispense", "Wash", "Mix"]);
        assert_eq!(sim.liquid("Source_96:A1"), Some(50.0));
        assert_eq!(sim.liquid("Dest_96:A1"), Some(50.0));
    }

    #[tokio::test]
    async fn test_worklist_missing_file() {
        let mut sim = SimulatedController::new(SimulatorConfig::default());
        sim.connect().await.unwrap();

        let err = sim
            .execute_worklist(Path::new("/nonexistent/simple.gwl"))
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::FileAccess { .. }));
    }

    #[tokio::test]
    async fn test_worklist_invalid_content() {
        let file = worklist_file("A;Source_96;A1;;lots\n");
        let mut sim = SimulatedController::new(SimulatorConfig::default());
        sim.connect().await.unwrap();

        let err = sim.execute_worklist(file.path()).await.unwrap_err();
        assert!(err.to_string().contains("InvalidWorklist"));
    }

    #[tokio::test]
    async fn test_disconnect_and_shared_state() {
        let sim = SimulatedController::new(SimulatorConfig::default());
        let mut boxed: Box<dyn ControllerClient> = Box::new(sim.clone());

        boxed.connect().await.unwrap();
        assert!(sim.status().connected);

        boxed.disconnect().await.unwrap();
        let status = sim.status();
        assert!(!status.connected);
        assert!(!status.runtime_initialized);
    }
}
