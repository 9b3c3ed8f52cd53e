//! Host routing: resolve a power request to a concrete host or chassis.
//!
//! ```text
//!  PowerRequest + source path
//!        │
//!        ├─ per-slot power button (Power<N>)  ──▶ host N
//!        ├─ host selector on the bus          ──▶ host = Position
//!        └─ otherwise                         ──▶ host 0
//!        │
//!        ▼
//!  Position == BMC?  ── short request ──▶ suppressed
//!        │            └─ long request  ──▶ chassis_system<N> PowerCycle
//!        ▼
//!  host<N>.RequestedHostTransition / chassis<N>.RequestedPowerTransition
//! ```

use log::{debug, info};

use crate::app::ports::{PowerStatus, StateBus, Value};
use crate::config::{BmcSelectedPolicy, DaemonConfig};
use crate::error::BusError;
use crate::fsm::context::PowerRequest;
use crate::paths::{
    self, BMC_READY, BMC_STATE_IFACE, BMC_STATE_OBJECT, CHASSIS_POWER_ON, CHASSIS_STATE_BASE,
    CHASSIS_STATE_IFACE, CHASSIS_SYSTEM_BASE, CURRENT_BMC_STATE, CURRENT_HOST_STATE,
    CURRENT_POWER_STATE, HOST_SELECTOR_IFACE, HOST_SELECTOR_OBJECT, HOST_STATE_BASE,
    HOST_STATE_IFACE, HOST_STATE_OFF, LED_ASSERTED_PROP, LED_GROUP_IFACE, LED_GROUPS_BASE,
    MAX_POSITION_PROP, POSITION_PROP, REQUESTED_HOST_TRANSITION, REQUESTED_POWER_TRANSITION,
};

/// Resolved destination of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub host: usize,
    /// The selector points at the BMC itself.
    pub bmc: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// A transition was requested.
    Issued {
        path: String,
        property: &'static str,
        transition: &'static str,
    },
    /// Dropped because the BMC is selected.
    Suppressed,
    /// Nothing to do in the current power state.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct HostRouter {
    bmc_position: usize,
    bmc_selected: BmcSelectedPolicy,
    chassis_system_reset: bool,
    warm_reboot: bool,
    id_led_group: String,
}

fn read_str(bus: &mut dyn StateBus, path: &str, iface: &str, name: &str) -> Result<String, BusError> {
    let service = bus.get_service(path, iface)?;
    match bus.get_property(&service, path, iface, name)? {
        Value::Str(s) => Ok(s),
        _ => Err(BusError::TypeMismatch {
            path: path.to_owned(),
            name: name.to_owned(),
        }),
    }
}

fn read_u64(bus: &mut dyn StateBus, path: &str, iface: &str, name: &str) -> Result<u64, BusError> {
    let service = bus.get_service(path, iface)?;
    bus.get_property(&service, path, iface, name)?
        .as_u64()
        .ok_or_else(|| BusError::TypeMismatch {
            path: path.to_owned(),
            name: name.to_owned(),
        })
}

impl HostRouter {
    pub fn new(cfg: &DaemonConfig) -> Self {
        Self {
            bmc_position: cfg.bmc_position,
            bmc_selected: cfg.bmc_selected,
            chassis_system_reset: cfg.chassis_system_reset,
            warm_reboot: cfg.reset_warm_reboot,
            id_led_group: cfg.id_led_group.clone(),
        }
    }

    pub fn bmc_position(&self) -> usize {
        self.bmc_position
    }

    /// A host selector object anywhere on the bus means multi-host.
    pub fn is_multi_host(&self, bus: &mut dyn StateBus) -> bool {
        bus.get_service(HOST_SELECTOR_OBJECT, HOST_SELECTOR_IFACE)
            .is_ok()
    }

    pub fn selector_position(&self, bus: &mut dyn StateBus) -> Result<usize, BusError> {
        read_u64(bus, HOST_SELECTOR_OBJECT, HOST_SELECTOR_IFACE, POSITION_PROP).map(|p| p as usize)
    }

    pub fn target(&self, source_path: &str, bus: &mut dyn StateBus) -> Result<Target, BusError> {
        if let Some(slot) = paths::power_slot(source_path) {
            return Ok(Target {
                host: slot,
                bmc: false,
            });
        }
        if !self.is_multi_host(bus) {
            return Ok(Target {
                host: 0,
                bmc: false,
            });
        }
        let host = self.selector_position(bus)?;
        Ok(Target {
            host,
            bmc: host == self.bmc_position,
        })
    }

    pub fn is_host_on(&self, host: usize, bus: &mut dyn StateBus) -> Result<bool, BusError> {
        let path = paths::indexed(HOST_STATE_BASE, host);
        let state = read_str(bus, &path, HOST_STATE_IFACE, CURRENT_HOST_STATE)?;
        Ok(state != HOST_STATE_OFF)
    }

    pub fn is_chassis_on(&self, host: usize, bus: &mut dyn StateBus) -> Result<bool, BusError> {
        let path = paths::indexed(CHASSIS_STATE_BASE, host);
        let state = read_str(bus, &path, CHASSIS_STATE_IFACE, CURRENT_POWER_STATE)?;
        Ok(state == CHASSIS_POWER_ON)
    }

    pub fn is_bmc_ready(&self, bus: &mut dyn StateBus) -> Result<bool, BusError> {
        let state = read_str(bus, BMC_STATE_OBJECT, BMC_STATE_IFACE, CURRENT_BMC_STATE)?;
        Ok(state == BMC_READY)
    }

    /// Resolve and issue one request.
    pub fn route(
        &self,
        request: PowerRequest,
        source_path: &str,
        bus: &mut dyn StateBus,
    ) -> Result<RouteOutcome, BusError> {
        let target = self.target(source_path, bus)?;
        debug!("Router: {:?} from {} -> {:?}", request, source_path, target);

        if target.bmc {
            let suppressed = match self.bmc_selected {
                BmcSelectedPolicy::SuppressAll => true,
                BmcSelectedPolicy::SuppressShortPress => request.is_short(),
            };
            if suppressed {
                info!("Router: BMC selected, ignoring {:?}", request);
                return Ok(RouteOutcome::Suppressed);
            }
            // Anything past suppression power-cycles the sled, including the
            // escalation's chassis-off step.
            if !self.chassis_system_reset {
                info!("Router: BMC selected and sled cycle disabled, ignoring {:?}", request);
                return Ok(RouteOutcome::Ignored);
            }
            return self.issue(
                bus,
                paths::indexed(CHASSIS_SYSTEM_BASE, target.host),
                CHASSIS_STATE_IFACE,
                REQUESTED_POWER_TRANSITION,
                paths::CHASSIS_TRANSITION_POWER_CYCLE,
            );
        }

        let host_path = paths::indexed(HOST_STATE_BASE, target.host);
        let chassis_path = paths::indexed(CHASSIS_STATE_BASE, target.host);
        let host = |t| (host_path.clone(), HOST_STATE_IFACE, REQUESTED_HOST_TRANSITION, t);
        let chassis = |t| (chassis_path.clone(), CHASSIS_STATE_IFACE, REQUESTED_POWER_TRANSITION, t);

        let (path, iface, prop, transition) = match request {
            PowerRequest::Toggle => {
                if self.is_host_on(target.host, bus)? {
                    host(paths::HOST_TRANSITION_OFF)
                } else {
                    host(paths::HOST_TRANSITION_ON)
                }
            }
            PowerRequest::HostOn => host(paths::HOST_TRANSITION_ON),
            PowerRequest::HostOff => host(paths::HOST_TRANSITION_OFF),
            PowerRequest::Reset => {
                if !self.is_host_on(target.host, bus)? {
                    info!("Router: host {} is off, ignoring reset", target.host);
                    return Ok(RouteOutcome::Ignored);
                }
                if self.warm_reboot {
                    host(paths::HOST_TRANSITION_WARM_REBOOT)
                } else {
                    host(paths::HOST_TRANSITION_REBOOT)
                }
            }
            PowerRequest::LongPress => {
                if !self.is_host_on(target.host, bus)? {
                    info!("Router: host {} is off, ignoring long press", target.host);
                    return Ok(RouteOutcome::Ignored);
                }
                chassis(paths::CHASSIS_TRANSITION_OFF)
            }
            PowerRequest::LongerPress => chassis(paths::CHASSIS_TRANSITION_POWER_CYCLE),
            PowerRequest::ChassisOff => chassis(paths::CHASSIS_TRANSITION_OFF),
        };
        self.issue(bus, path, iface, prop, transition)
    }

    fn issue(
        &self,
        bus: &mut dyn StateBus,
        path: String,
        iface: &str,
        property: &'static str,
        transition: &'static str,
    ) -> Result<RouteOutcome, BusError> {
        let service = bus.get_service(&path, iface)?;
        bus.set_property(&service, &path, iface, property, Value::Str(transition.to_owned()))?;
        info!("Router: {} {} = {}", path, property, transition);
        Ok(RouteOutcome::Issued {
            path,
            property,
            transition,
        })
    }

    /// Flip the identify LED group.  Returns the new state.
    pub fn toggle_identify(&self, bus: &mut dyn StateBus) -> Result<bool, BusError> {
        let path = format!("{LED_GROUPS_BASE}/{}", self.id_led_group);
        let service = bus.get_service(&path, LED_GROUP_IFACE)?;
        let current = bus
            .get_property(&service, &path, LED_GROUP_IFACE, LED_ASSERTED_PROP)?
            .as_bool()
            .ok_or_else(|| BusError::TypeMismatch {
                path: path.clone(),
                name: LED_ASSERTED_PROP.to_owned(),
            })?;
        bus.set_property(&service, &path, LED_GROUP_IFACE, LED_ASSERTED_PROP, Value::Bool(!current))?;
        info!("Router: identify LED {} -> {}", self.id_led_group, !current);
        Ok(!current)
    }

    /// Advance a host selector hosted by another process.
    pub fn advance_remote_selector(&self, bus: &mut dyn StateBus) -> Result<usize, BusError> {
        let service = bus.get_service(HOST_SELECTOR_OBJECT, HOST_SELECTOR_IFACE)?;
        let pos = read_u64(bus, HOST_SELECTOR_OBJECT, HOST_SELECTOR_IFACE, POSITION_PROP)?;
        let max = read_u64(bus, HOST_SELECTOR_OBJECT, HOST_SELECTOR_IFACE, MAX_POSITION_PROP)?;
        let next = if pos < max { pos + 1 } else { 0 };
        bus.set_property(
            &service,
            HOST_SELECTOR_OBJECT,
            HOST_SELECTOR_IFACE,
            POSITION_PROP,
            Value::U64(next),
        )?;
        Ok(next as usize)
    }

    /// Power status as seen from `source_path`'s target.
    pub fn status<'a>(
        &'a self,
        source_path: &'a str,
        bus: &'a mut dyn StateBus,
    ) -> RoutedStatus<'a> {
        RoutedStatus {
            router: self,
            source_path,
            bus,
        }
    }
}

/// [`PowerStatus`] bound to one source button.
pub struct RoutedStatus<'a> {
    router: &'a HostRouter,
    source_path: &'a str,
    bus: &'a mut dyn StateBus,
}

impl PowerStatus for RoutedStatus<'_> {
    fn is_chassis_on(&mut self) -> Result<bool, BusError> {
        let target = self.router.target(self.source_path, &mut *self.bus)?;
        self.router.is_chassis_on(target.host, &mut *self.bus)
    }

    fn is_bmc_ready(&mut self) -> Result<bool, BusError> {
        self.router.is_bmc_ready(&mut *self.bus)
    }
}
