//! Native procedure table
//!
//! The exports a PassThru library provides differ between API revisions.
//! A session computes the callable set once after loading and checks it
//! before every call.

use std::collections::BTreeSet;
use std::fmt;

use passthru_core::ApiVersion;

/// A `PassThru*` export
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Procedure {
    Open,
    Close,
    Connect,
    Disconnect,
    LogicalConnect,
    LogicalDisconnect,
    Select,
    ReadMsgs,
    WriteMsgs,
    QueueMsgs,
    StartPeriodicMsg,
    StopPeriodicMsg,
    StartMsgFilter,
    StopMsgFilter,
    SetProgrammingVoltage,
    ReadVersion,
    GetLastError,
    Ioctl,
    ScanForDevices,
    GetNextDevice,
}

impl Procedure {
    pub const ALL: [Procedure; 20] = [
        Self::Open,
        Self::Close,
        Self::Connect,
        Self::Disconnect,
        Self::LogicalConnect,
        Self::LogicalDisconnect,
        Self::Select,
        Self::ReadMsgs,
        Self::WriteMsgs,
        Self::QueueMsgs,
        Self::StartPeriodicMsg,
        Self::StopPeriodicMsg,
        Self::StartMsgFilter,
        Self::StopMsgFilter,
        Self::SetProgrammingVoltage,
        Self::ReadVersion,
        Self::GetLastError,
        Self::Ioctl,
        Self::ScanForDevices,
        Self::GetNextDevice,
    ];

    /// Exported symbol name
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Open => "PassThruOpen",
            Self::Close => "PassThruClose",
            Self::Connect => "PassThruConnect",
            Self::Disconnect => "PassThruDisconnect",
            Self::LogicalConnect => "PassThruLogicalConnect",
            Self::LogicalDisconnect => "PassThruLogicalDisconnect",
            Self::Select => "PassThruSelect",
            Self::ReadMsgs => "PassThruReadMsgs",
            Self::WriteMsgs => "PassThruWriteMsgs",
            Self::QueueMsgs => "PassThruQueueMsgs",
            Self::StartPeriodicMsg => "PassThruStartPeriodicMsg",
            Self::StopPeriodicMsg => "PassThruStopPeriodicMsg",
            Self::StartMsgFilter => "PassThruStartMsgFilter",
            Self::StopMsgFilter => "PassThruStopMsgFilter",
            Self::SetProgrammingVoltage => "PassThruSetProgrammingVoltage",
            Self::ReadVersion => "PassThruReadVersion",
            Self::GetLastError => "PassThruGetLastError",
            Self::Ioctl => "PassThruIoctl",
            Self::ScanForDevices => "PassThruScanForDevices",
            Self::GetNextDevice => "PassThruGetNextDevice",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.symbol() == symbol)
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

const V0404_EXPORTS: &[Procedure] = &[
    Procedure::Open,
    Procedure::Close,
    Procedure::Connect,
    Procedure::Disconnect,
    Procedure::ReadMsgs,
    Procedure::WriteMsgs,
    Procedure::StartPeriodicMsg,
    Procedure::StopPeriodicMsg,
    Procedure::StartMsgFilter,
    Procedure::StopMsgFilter,
    Procedure::SetProgrammingVoltage,
    Procedure::ReadVersion,
    Procedure::GetLastError,
    Procedure::Ioctl,
];

const V0500_EXPORTS: &[Procedure] = &[
    Procedure::Open,
    Procedure::Close,
    Procedure::Connect,
    Procedure::Disconnect,
    Procedure::LogicalConnect,
    Procedure::LogicalDisconnect,
    Procedure::Select,
    Procedure::ReadMsgs,
    Procedure::QueueMsgs,
    Procedure::StartPeriodicMsg,
    Procedure::StopPeriodicMsg,
    Procedure::StartMsgFilter,
    Procedure::StopMsgFilter,
    Procedure::SetProgrammingVoltage,
    Procedure::ReadVersion,
    Procedure::GetLastError,
    Procedure::Ioctl,
    Procedure::ScanForDevices,
    Procedure::GetNextDevice,
];

/// Exports defined by an API revision
pub fn exports_for(version: ApiVersion) -> &'static [Procedure] {
    match version {
        ApiVersion::V0404 => V0404_EXPORTS,
        ApiVersion::V0500 => V0500_EXPORTS,
    }
}

/// Set of callable procedures
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcedureSet {
    procedures: BTreeSet<Procedure>,
}

impl ProcedureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every export the API revision defines
    pub fn full(version: ApiVersion) -> Self {
        exports_for(version).iter().copied().collect()
    }

    /// Keep the revision's exports that `resolve` finds in the library
    pub fn probe(version: ApiVersion, mut resolve: impl FnMut(&str) -> bool) -> Self {
        exports_for(version)
            .iter()
            .copied()
            .filter(|p| resolve(p.symbol()))
            .collect()
    }

    /// Intersect with the exports of an API revision
    pub fn restrict_to(&self, version: ApiVersion) -> Self {
        let exports = exports_for(version);
        self.procedures
            .iter()
            .copied()
            .filter(|p| exports.contains(p))
            .collect()
    }

    pub fn contains(&self, procedure: Procedure) -> bool {
        self.procedures.contains(&procedure)
    }

    pub fn insert(&mut self, procedure: Procedure) -> bool {
        self.procedures.insert(procedure)
    }

    pub fn remove(&mut self, procedure: Procedure) -> bool {
        self.procedures.remove(&procedure)
    }

    pub fn len(&self) -> usize {
        self.procedures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Procedure> + '_ {
        self.procedures.iter().copied()
    }
}

impl FromIterator<Procedure> for ProcedureSet {
    fn from_iter<I: IntoIterator<Item = Procedure>>(iter: I) -> Self {
        Self {
            procedures: iter.into_iter().collect(),
        }
    }
}

/// Version requirement attached to an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionReq {
    Any,
    /// Only this revision
    Exact(ApiVersion),
    /// This revision or later
    AtLeast(ApiVersion),
}

impl VersionReq {
    pub fn matches(self, version: ApiVersion) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(required) => version == required,
            Self::AtLeast(required) => version >= required,
        }
    }
}

impl fmt::Display for VersionReq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::Exact(v) => write!(f, "{}", v),
            Self::AtLeast(v) => write!(f, "{}+", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_version_specific_exports() {
        let v4 = ProcedureSet::full(ApiVersion::V0404);
        assert!(v4.contains(Procedure::WriteMsgs));
        assert!(!v4.contains(Procedure::LogicalConnect));
        assert!(!v4.contains(Procedure::Select));
        assert!(!v4.contains(Procedure::QueueMsgs));

        let v5 = ProcedureSet::full(ApiVersion::V0500);
        assert!(!v5.contains(Procedure::WriteMsgs));
        assert!(v5.contains(Procedure::LogicalConnect));
        assert!(v5.contains(Procedure::LogicalDisconnect));
        assert!(v5.contains(Procedure::Select));
        assert!(v5.contains(Procedure::QueueMsgs));
    }

    #[test]
    fn test_probe_keeps_resolved_symbols() {
        let set = ProcedureSet::probe(ApiVersion::V0404, |symbol| symbol != "PassThruIoctl");
        assert_eq!(set.len(), 13);
        assert!(!set.contains(Procedure::Ioctl));
        assert!(set.contains(Procedure::Open));
    }

    #[test]
    fn test_restrict_drops_foreign_exports() {
        let all: ProcedureSet = Procedure::ALL.into_iter().collect();
        assert_eq!(all.restrict_to(ApiVersion::V0404), ProcedureSet::full(ApiVersion::V0404));
    }

    #[test]
    fn test_symbol_lookup() {
        for p in Procedure::ALL {
            assert_eq!(Procedure::from_symbol(p.symbol()), Some(p));
        }
        assert_eq!(Procedure::from_symbol("PassThruFoo"), None);
    }

    #[test]
    fn test_version_requirements() {
        assert!(VersionReq::Exact(ApiVersion::V0404).matches(ApiVersion::V0404));
        assert!(!VersionReq::Exact(ApiVersion::V0404).matches(ApiVersion::V0500));
        assert!(VersionReq::AtLeast(ApiVersion::V0500).matches(ApiVersion::V0500));
        assert!(!VersionReq::AtLeast(ApiVersion::V0500).matches(ApiVersion::V0404));
        assert!(VersionReq::Any.matches(ApiVersion::V0500));

        assert_eq!(VersionReq::AtLeast(ApiVersion::V0500).to_string(), "05.00+");
        assert_eq!(VersionReq::Exact(ApiVersion::V0404).to_string(), "04.04");
    }
}
