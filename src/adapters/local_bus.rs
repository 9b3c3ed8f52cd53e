//! In-process state bus adapter.
//!
//! Implements [`StateBus`] over an object table held in memory.  Our own
//! objects (buttons, selectors) and any external state objects seeded with
//! [`LocalBus::host_object`] live side by side; every property write and
//! signal is logged and kept for inspection.
//!
//! Used when the daemon runs without a system bus connection and by the
//! test suites.

use std::collections::BTreeMap;

use log::{debug, info};

use crate::app::ports::{StateBus, Value};
use crate::error::BusError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalRecord {
    pub path: String,
    pub interface: String,
    pub member: String,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyWrite {
    pub service: String,
    pub path: String,
    pub interface: String,
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Default)]
struct Object {
    service: String,
    props: BTreeMap<String, Value>,
}

pub const PROPERTIES_CHANGED: &str = "PropertiesChanged";

#[derive(Debug)]
pub struct LocalBus {
    service: String,
    objects: BTreeMap<(String, String), Object>,
    signals: Vec<SignalRecord>,
    writes: Vec<PropertyWrite>,
}

impl LocalBus {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            objects: BTreeMap::new(),
            signals: Vec::new(),
            writes: Vec::new(),
        }
    }

    /// Seed an object owned by another service.
    pub fn host_object<'a>(
        &mut self,
        service: &str,
        path: &str,
        interface: &str,
        props: impl IntoIterator<Item = (&'a str, Value)>,
    ) {
        let obj = self
            .objects
            .entry((path.to_owned(), interface.to_owned()))
            .or_default();
        obj.service = service.to_owned();
        for (name, value) in props {
            obj.props.insert(name.to_owned(), value);
        }
    }

    pub fn property(&self, path: &str, interface: &str, name: &str) -> Option<&Value> {
        self.objects
            .get(&(path.to_owned(), interface.to_owned()))
            .and_then(|o| o.props.get(name))
    }

    pub fn signals(&self) -> &[SignalRecord] {
        &self.signals
    }

    pub fn writes(&self) -> &[PropertyWrite] {
        &self.writes
    }

    fn object_mut(&mut self, path: &str, interface: &str) -> Result<&mut Object, BusError> {
        self.objects
            .get_mut(&(path.to_owned(), interface.to_owned()))
            .ok_or_else(|| BusError::ServiceUnknown {
                path: path.to_owned(),
                interface: interface.to_owned(),
            })
    }
}

impl StateBus for LocalBus {
    fn get_service(&mut self, path: &str, interface: &str) -> Result<String, BusError> {
        self.object_mut(path, interface).map(|o| o.service.clone())
    }

    fn get_property(
        &mut self,
        _service: &str,
        path: &str,
        interface: &str,
        name: &str,
    ) -> Result<Value, BusError> {
        let obj = self.object_mut(path, interface)?;
        obj.props
            .get(name)
            .cloned()
            .ok_or_else(|| BusError::NoSuchProperty {
                path: path.to_owned(),
                interface: interface.to_owned(),
                name: name.to_owned(),
            })
    }

    fn set_property(
        &mut self,
        service: &str,
        path: &str,
        interface: &str,
        name: &str,
        value: Value,
    ) -> Result<(), BusError> {
        let obj = self.object_mut(path, interface)?;
        obj.props.insert(name.to_owned(), value.clone());
        info!("Bus: set {} {}.{} = {:?}", path, interface, name, value);
        self.writes.push(PropertyWrite {
            service: service.to_owned(),
            path: path.to_owned(),
            interface: interface.to_owned(),
            name: name.to_owned(),
            value,
        });
        Ok(())
    }

    fn add_object(&mut self, path: &str, interface: &str) -> Result<(), BusError> {
        let service = self.service.clone();
        let obj = self
            .objects
            .entry((path.to_owned(), interface.to_owned()))
            .or_default();
        obj.service = service;
        debug!("Bus: added object {} ({})", path, interface);
        Ok(())
    }

    fn publish(
        &mut self,
        path: &str,
        interface: &str,
        name: &str,
        value: Value,
    ) -> Result<(), BusError> {
        let obj = self.object_mut(path, interface)?;
        if obj.props.get(name) == Some(&value) {
            return Ok(());
        }
        obj.props.insert(name.to_owned(), value.clone());
        self.emit_signal(
            path,
            interface,
            PROPERTIES_CHANGED,
            &[Value::Str(name.to_owned()), value],
        )
    }

    fn emit_signal(
        &mut self,
        path: &str,
        interface: &str,
        member: &str,
        args: &[Value],
    ) -> Result<(), BusError> {
        debug!("Bus: signal {} {}.{} {:?}", path, interface, member, args);
        self.signals.push(SignalRecord {
            path: path.to_owned(),
            interface: interface.to_owned(),
            member: member.to_owned(),
            args: args.to_vec(),
        });
        Ok(())
    }
}
