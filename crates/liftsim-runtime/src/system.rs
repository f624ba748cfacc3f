//! [`ElevatorSystem`] – wiring for one LiftSim process.
//!
//! Nothing in LiftSim is a global. The system builds the bus, controller and
//! simulator explicitly and hands each the collaborators it needs. The bus
//! is chosen once, here:
//!
//! | Transport | Bus | Typical use |
//! |---|---|---|
//! | [`Transport::Local`] | [`LocalBus`] | single process, tests |
//! | [`Transport::Network`] | [`NetEventBus`] over [`NetBus`] | one process per device |
//!
//! [`NodeRole`] decides which components run in this process.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use liftsim_hal::{MotionSimulator, SimulatorConfig, attach_actuator};
use liftsim_kernel::{ElevatorController, PolicyConfig};
use liftsim_middleware::{BusRole, Clock, EventBus, LocalBus, NetBus, NetEventBus};
use liftsim_types::{Channel, LiftError, Payload};
use tracing::info;

use crate::panels::{TracingPanel, WirePanel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Local,
    Network(SocketAddr),
}

/// Components hosted by this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeRole {
    /// Controller and simulator.
    #[default]
    All,
    Controller,
    Simulator,
    /// Operator panel only; talks to the others over the network.
    Panel,
}

impl NodeRole {
    pub fn runs_controller(self) -> bool {
        matches!(self, NodeRole::All | NodeRole::Controller)
    }

    pub fn runs_simulator(self) -> bool {
        matches!(self, NodeRole::All | NodeRole::Simulator)
    }
}

impl FromStr for NodeRole {
    type Err = LiftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(NodeRole::All),
            "controller" => Ok(NodeRole::Controller),
            "simulator" => Ok(NodeRole::Simulator),
            "panel" => Ok(NodeRole::Panel),
            other => Err(LiftError::Config(format!("unknown role '{other}'"))),
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeRole::All => "all",
            NodeRole::Controller => "controller",
            NodeRole::Simulator => "simulator",
            NodeRole::Panel => "panel",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct SystemConfig {
    pub policy: PolicyConfig,
    pub tick_period: Duration,
    /// Car id used as the instance of car-scoped numeric topics.
    pub car: i32,
    pub transport: Transport,
    pub role: NodeRole,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            policy: PolicyConfig::default(),
            tick_period: liftsim_hal::sim::DEFAULT_TICK,
            car: 1,
            transport: Transport::Local,
            role: NodeRole::All,
        }
    }
}

pub struct ElevatorSystem {
    config: SystemConfig,
    bus: Arc<dyn EventBus>,
    net: Option<Arc<NetBus>>,
    controller: Option<Arc<ElevatorController>>,
    simulator: Option<Arc<MotionSimulator>>,
}

impl ElevatorSystem {
    /// Wire the components for `config.role` onto an existing bus.
    pub fn assemble(config: SystemConfig, bus: Arc<dyn EventBus>, clock: Arc<dyn Clock>) -> Self {
        let simulator = config.role.runs_simulator().then(|| {
            let sim = MotionSimulator::new(
                SimulatorConfig::default()
                    .with_id(format!("car-{}", config.car))
                    .with_start_floor(config.policy.start_floor)
                    .with_tick_period(config.tick_period),
                Arc::clone(&bus),
                Arc::clone(&clock),
            );
            attach_actuator(bus.as_ref(), sim.clone());
            sim
        });

        let controller = config.role.runs_controller().then(|| {
            let ctrl =
                ElevatorController::new(config.policy.clone(), Arc::clone(&bus), Arc::clone(&clock));
            ctrl.attach();
            ctrl.add_panel(Arc::new(TracingPanel));
            ctrl
        });

        info!(
            role = %config.role,
            controller = controller.is_some(),
            simulator = simulator.is_some(),
            "elevator system assembled"
        );
        Self {
            config,
            bus,
            net: None,
            controller,
            simulator,
        }
    }

    /// Single-process system on an in-process bus.
    pub fn local(config: SystemConfig, clock: Arc<dyn Clock>) -> Self {
        Self::assemble(config, Arc::new(LocalBus::new()), clock)
    }

    /// Build the system on the transport named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`LiftError::Transport`] when the networked bus cannot be
    /// joined.
    pub async fn connect(config: SystemConfig, clock: Arc<dyn Clock>) -> Result<Self, LiftError> {
        let addr = match config.transport {
            Transport::Local => return Ok(Self::local(config, clock)),
            Transport::Network(addr) => addr,
        };

        let net = Arc::new(NetBus::bind_or_connect(addr).await?);
        info!(role = ?net.role(), node = %net.node_id(), hub = %net.hub_addr(), "joined bus");
        let bus = Arc::new(NetEventBus::spawn(
            Arc::clone(&net),
            config.car,
            config.policy.floors(),
        ));

        let car = config.car;
        let mut system = Self::assemble(config, bus, clock);
        if let Some(ctrl) = &system.controller {
            ctrl.add_panel(Arc::new(WirePanel::new(net.clone(), car)));
        }
        system.net = Some(net);
        Ok(system)
    }

    /// Publish a panel event as if a button had been pressed.
    pub fn publish(&self, channel: Channel, payload: Payload) -> Result<(), LiftError> {
        self.bus.publish(channel, payload)
    }

    pub fn bus(&self) -> &Arc<dyn EventBus> {
        &self.bus
    }

    pub fn controller(&self) -> Option<&Arc<ElevatorController>> {
        self.controller.as_ref()
    }

    pub fn simulator(&self) -> Option<&Arc<MotionSimulator>> {
        self.simulator.as_ref()
    }

    /// Hub/client outcome when running on the network.
    pub fn bus_role(&self) -> Option<BusRole> {
        self.net.as_ref().map(|n| n.role())
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liftsim_middleware::ManualClock;

    #[test]
    fn roles_parse_case_insensitively() {
        assert_eq!("Controller".parse::<NodeRole>().unwrap(), NodeRole::Controller);
        assert_eq!("panel".parse::<NodeRole>().unwrap(), NodeRole::Panel);
        assert!(matches!("lobby".parse::<NodeRole>(), Err(LiftError::Config(_))));
    }

    #[test]
    fn role_decides_hosted_components() {
        let clock = Arc::new(ManualClock::new());
        let sys = ElevatorSystem::local(
            SystemConfig {
                role: NodeRole::Simulator,
                ..SystemConfig::default()
            },
            clock.clone(),
        );
        assert!(sys.controller().is_none());
        assert!(sys.simulator().is_some());
        assert_eq!(sys.bus_role(), None);

        let sys = ElevatorSystem::local(SystemConfig::default(), clock);
        assert!(sys.controller().is_some());
        assert!(sys.simulator().is_some());
    }

    #[test]
    fn simulator_starts_where_the_controller_does() {
        let mut config = SystemConfig::default();
        config.policy = config.policy.with_start_floor(4);
        let sys = ElevatorSystem::local(config, Arc::new(ManualClock::new()));
        assert_eq!(sys.simulator().unwrap().snapshot().current_floor, 4);
        assert_eq!(sys.controller().unwrap().snapshot().current_floor, 4);
    }
}
