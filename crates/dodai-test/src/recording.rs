//! In-memory controller that records every driver call.
//!
//! The model enforces the controller's referential rules (a server port or an
//! outer-port association needs an existing region, a region cannot be created
//! twice) so ordering bugs in the orchestrator show up as faults.

use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use dodai_ofc_driver::{
    DatapathInfo, Dpid, OfcDriver, OfcError, OfcResult, PortInfo, PortNumber, PortType,
    RegionInfo, VlanId,
};

/// Kind of driver call, used for fault injection and counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    CreateRegion,
    DestroyRegion,
    ShowRegion,
    SetServerPort,
    ClearServerPort,
    ShowSwitchDatapathIds,
    ShowPorts,
    SetOuterPortAssociation,
    ClearOuterPortAssociation,
    Save,
}

impl CallKind {
    /// Remote operation name, as used in fault messages.
    pub fn operation(&self) -> &'static str {
        match self {
            CallKind::CreateRegion => "createRegion",
            CallKind::DestroyRegion => "destroyRegion",
            CallKind::ShowRegion => "showRegion",
            CallKind::SetServerPort => "setServerPort",
            CallKind::ClearServerPort => "clearServerPort",
            CallKind::ShowSwitchDatapathIds => "showDatapathId",
            CallKind::ShowPorts => "showPorts",
            CallKind::SetOuterPortAssociation => "setOuterPortAssociationSetting",
            CallKind::ClearOuterPortAssociation => "clearOuterPortAssociationSetting",
            CallKind::Save => "save",
        }
    }

    /// Returns true for calls that change controller configuration.
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            CallKind::ShowRegion
                | CallKind::ShowSwitchDatapathIds
                | CallKind::ShowPorts
                | CallKind::Save
        )
    }
}

/// One recorded driver call with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    CreateRegion(String),
    DestroyRegion(String),
    ShowRegion,
    SetServerPort {
        dpid: String,
        port: PortNumber,
        region: String,
    },
    ClearServerPort {
        dpid: String,
        port: PortNumber,
    },
    ShowSwitchDatapathIds,
    ShowPorts(String),
    SetOuterPortAssociation {
        dpid: String,
        outer_port: PortNumber,
        outer_vlan: u16,
        inner_vlan: u16,
        region: String,
    },
    ClearOuterPortAssociation {
        dpid: String,
        outer_port: PortNumber,
        outer_vlan: u16,
    },
    Save,
}

impl DriverCall {
    pub fn kind(&self) -> CallKind {
        match self {
            DriverCall::CreateRegion(_) => CallKind::CreateRegion,
            DriverCall::DestroyRegion(_) => CallKind::DestroyRegion,
            DriverCall::ShowRegion => CallKind::ShowRegion,
            DriverCall::SetServerPort { .. } => CallKind::SetServerPort,
            DriverCall::ClearServerPort { .. } => CallKind::ClearServerPort,
            DriverCall::ShowSwitchDatapathIds => CallKind::ShowSwitchDatapathIds,
            DriverCall::ShowPorts(_) => CallKind::ShowPorts,
            DriverCall::SetOuterPortAssociation { .. } => CallKind::SetOuterPortAssociation,
            DriverCall::ClearOuterPortAssociation { .. } => CallKind::ClearOuterPortAssociation,
            DriverCall::Save => CallKind::Save,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Fault {
    Always,
    Remaining(u32),
}

#[derive(Debug, Default)]
struct ControllerModel {
    regions: BTreeSet<String>,
    switches: BTreeMap<Dpid, BTreeMap<PortNumber, PortInfo>>,
    /// (dpid, outer port, outer vlan) -> region
    associations: BTreeMap<(Dpid, PortNumber, u16), String>,
    calls: Vec<DriverCall>,
    faults: HashMap<CallKind, Fault>,
    unsaved: usize,
}

impl ControllerModel {
    /// Decides whether an already recorded call of `kind` fails.
    fn admit(&mut self, kind: CallKind) -> OfcResult<()> {
        let fail = match self.faults.get_mut(&kind) {
            Some(Fault::Always) => true,
            Some(Fault::Remaining(n)) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        };
        if fail {
            return Err(OfcError::fault(kind.operation(), "injected fault"));
        }
        if kind.is_mutation() {
            self.unsaved += 1;
        }
        Ok(())
    }

    fn require_region(&self, kind: CallKind, region: &str) -> OfcResult<()> {
        if self.regions.contains(region) {
            Ok(())
        } else {
            Err(OfcError::fault(
                kind.operation(),
                format!("region {} does not exist", region),
            ))
        }
    }
}

/// Recording, fault-injecting [`OfcDriver`] backed by [`ControllerModel`].
#[derive(Debug, Default)]
pub struct RecordingDriver {
    model: Mutex<ControllerModel>,
    latency: Option<Duration>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every call, so concurrent callers interleave.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Adds a switch with the given ports (all unbound).
    pub fn with_switch(self, dpid: &str, ports: &[(PortNumber, &str)]) -> Self {
        {
            let mut model = self.model.lock();
            let entry = model.switches.entry(dpid_of(dpid)).or_default();
            for (number, kind) in ports {
                entry.insert(
                    *number,
                    PortInfo {
                        port_type: PortType::from(*kind),
                        region_name: None,
                        port_number: Some(*number),
                    },
                );
            }
        }
        self
    }

    /// Pre-creates a region.
    pub fn with_region(self, region: &str) -> Self {
        self.model.lock().regions.insert(region.to_string());
        self
    }

    /// Binds a port to a region without recording a call.
    pub fn with_binding(self, dpid: &str, port: PortNumber, region: &str) -> Self {
        {
            let mut model = self.model.lock();
            model.regions.insert(region.to_string());
            bind(&mut model, &dpid_of(dpid), port, Some(region));
        }
        self
    }

    /// Makes every subsequent call of `kind` fail.
    pub fn fail_on(&self, kind: CallKind) {
        self.model.lock().faults.insert(kind, Fault::Always);
    }

    /// Makes the next `times` calls of `kind` fail.
    pub fn fail_times(&self, kind: CallKind, times: u32) {
        self.model.lock().faults.insert(kind, Fault::Remaining(times));
    }

    pub fn clear_faults(&self) {
        self.model.lock().faults.clear();
    }

    /// Returns the calls recorded so far.
    pub fn calls(&self) -> Vec<DriverCall> {
        self.model.lock().calls.clone()
    }

    /// Returns the recorded calls, dropping read-only queries.
    pub fn mutations(&self) -> Vec<DriverCall> {
        self.model
            .lock()
            .calls
            .iter()
            .filter(|call| call.kind().is_mutation() || call.kind() == CallKind::Save)
            .cloned()
            .collect()
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.model
            .lock()
            .calls
            .iter()
            .filter(|call| call.kind() == kind)
            .count()
    }

    pub fn clear_calls(&self) {
        self.model.lock().calls.clear();
    }

    pub fn has_region(&self, region: &str) -> bool {
        self.model.lock().regions.contains(region)
    }

    pub fn regions(&self) -> Vec<String> {
        self.model.lock().regions.iter().cloned().collect()
    }

    /// Region a port is bound to, if any.
    pub fn binding(&self, dpid: &str, port: PortNumber) -> Option<String> {
        self.model
            .lock()
            .switches
            .get(&dpid_of(dpid))
            .and_then(|ports| ports.get(&port))
            .and_then(|info| info.region_name.clone())
    }

    /// Region an outer-port association points to, if any.
    pub fn association(&self, dpid: &str, outer_port: PortNumber, vlan: u16) -> Option<String> {
        self.model
            .lock()
            .associations
            .get(&(dpid_of(dpid), outer_port, vlan))
            .cloned()
    }

    /// Number of mutations applied since the last successful `save`.
    pub fn unsaved(&self) -> usize {
        self.model.lock().unsaved
    }

    /// Records the call, waits out the latency, then applies fault injection.
    /// A call cancelled during the wait stays in the log.
    async fn begin(&self, call: DriverCall) -> OfcResult<MutexGuard<'_, ControllerModel>> {
        let kind = call.kind();
        self.model.lock().calls.push(call);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let mut model = self.model.lock();
        model.admit(kind)?;
        Ok(model)
    }
}

fn dpid_of(raw: &str) -> Dpid {
    Dpid::new(raw).unwrap_or_else(|| panic!("invalid test dpid '{}'", raw))
}

fn bind(model: &mut ControllerModel, dpid: &Dpid, port: PortNumber, region: Option<&str>) {
    let info = model
        .switches
        .entry(dpid.clone())
        .or_default()
        .entry(port)
        .or_insert_with(|| PortInfo {
            port_type: PortType::ServerPort,
            region_name: None,
            port_number: Some(port),
        });
    info.port_type = PortType::ServerPort;
    info.region_name = region.map(str::to_string);
}

#[async_trait]
impl OfcDriver for RecordingDriver {
    fn name(&self) -> &str {
        "recording"
    }

    async fn create_region(&self, region_name: &str) -> OfcResult<()> {
        let mut model = self.begin(DriverCall::CreateRegion(region_name.to_string())).await?;
        if !model.regions.insert(region_name.to_string()) {
            return Err(OfcError::fault(
                CallKind::CreateRegion.operation(),
                format!("region {} already exists", region_name),
            ));
        }
        Ok(())
    }

    async fn destroy_region(&self, region_name: &str) -> OfcResult<()> {
        let mut model = self.begin(DriverCall::DestroyRegion(region_name.to_string())).await?;
        model.regions.remove(region_name);
        model.associations.retain(|_, region| region != region_name);
        Ok(())
    }

    async fn show_region(&self) -> OfcResult<Vec<RegionInfo>> {
        let model = self.begin(DriverCall::ShowRegion).await?;
        Ok(model.regions.iter().map(RegionInfo::new).collect())
    }

    async fn set_server_port(
        &self,
        dpid: &Dpid,
        port: PortNumber,
        region_name: &str,
    ) -> OfcResult<()> {
        let mut model = self
            .begin(DriverCall::SetServerPort {
                dpid: dpid.to_string(),
                port,
                region: region_name.to_string(),
            })
            .await?;
        model.require_region(CallKind::SetServerPort, region_name)?;
        bind(&mut model, dpid, port, Some(region_name));
        Ok(())
    }

    async fn clear_server_port(&self, dpid: &Dpid, port: PortNumber) -> OfcResult<()> {
        let mut model = self
            .begin(DriverCall::ClearServerPort {
                dpid: dpid.to_string(),
                port,
            })
            .await?;
        bind(&mut model, dpid, port, None);
        Ok(())
    }

    async fn show_switch_datapath_ids(&self) -> OfcResult<Vec<DatapathInfo>> {
        let model = self.begin(DriverCall::ShowSwitchDatapathIds).await?;
        Ok(model
            .switches
            .keys()
            .map(|dpid| DatapathInfo { dpid: dpid.clone() })
            .collect())
    }

    async fn show_ports(&self, dpid: &Dpid) -> OfcResult<Vec<PortInfo>> {
        let model = self.begin(DriverCall::ShowPorts(dpid.to_string())).await?;
        Ok(model
            .switches
            .get(dpid)
            .map(|ports| ports.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_outer_port_association(
        &self,
        dpid: &Dpid,
        outer_port: PortNumber,
        outer_vlan: VlanId,
        inner_vlan: u16,
        region_name: &str,
    ) -> OfcResult<()> {
        let mut model = self
            .begin(DriverCall::SetOuterPortAssociation {
                dpid: dpid.to_string(),
                outer_port,
                outer_vlan: outer_vlan.get(),
                inner_vlan,
                region: region_name.to_string(),
            })
            .await?;
        model.require_region(CallKind::SetOuterPortAssociation, region_name)?;
        model.associations.insert(
            (dpid.clone(), outer_port, outer_vlan.get()),
            region_name.to_string(),
        );
        Ok(())
    }

    async fn clear_outer_port_association(
        &self,
        dpid: &Dpid,
        outer_port: PortNumber,
        outer_vlan: VlanId,
    ) -> OfcResult<()> {
        let mut model = self
            .begin(DriverCall::ClearOuterPortAssociation {
                dpid: dpid.to_string(),
                outer_port,
                outer_vlan: outer_vlan.get(),
            })
            .await?;
        model
            .associations
            .remove(&(dpid.clone(), outer_port, outer_vlan.get()));
        Ok(())
    }

    async fn save(&self) -> OfcResult<()> {
        let mut model = self.begin(DriverCall::Save).await?;
        model.unsaved = 0;
        Ok(())
    }
}
