//! Message classification and cross-event correlation.
//!
//! Turns a raw UCS syslog line into structured fields: type, severity,
//! lifecycle event, FSM stage, fault details, and a stable machineId
//! resolved over the management API. Processing is total; every failure
//! degrades to an empty field or an appended `error` description, never
//! a pipeline abort.

use crate::client::UcsClient;
use crate::config::FilterConfig;
use crate::record::Record;
use crate::registry::{EtcdRegistry, HostRegistry};
use crate::token::{Credentials, FileTokenStore, TokenManager};
use crate::transport::HttpTransport;
use anyhow::Result;
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, warn};

/// Generic chassis/blade coordinates as they appear in device dns.
static BLADE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"sys/chassis-\d+/blade-\d+").unwrap());
/// Workflow stage marker, e.g. `[FSM:BEGIN]`.
static STAGE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[FSM:(\w+)\]").unwrap());
/// UCS facility code, e.g. `%UCSM-6-EVENT`.
static FACILITY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"%UCSM-\d+-(\w+)").unwrap());
/// Adapter restarts report chassis/adapter/port, not a blade dn.
static ADAPTER_RESTART_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Adapter (\d+)/(\d+)/\d+ restarted").unwrap());
/// Fault lines carry four bracket groups: `[id][severity][mnemonic][dn]`.
static FAULT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\[([^\]]*)\]\[([^\]]*)\]\[([^\]]*)\]").unwrap());
/// Backslash-prefixed token of a domain-qualified username.
static DOMAIN_USER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\\[\w.-]+").unwrap());

/// Server lifecycle events detectable from a single event line.
#[derive(Debug, PartialEq, Eq)]
enum LifecycleEvent {
    Boot,
    SoftShutdown,
    HardShutdown,
    Restart,
    /// Inferred from an adapter-restart line; carries the coordinates
    /// needed to build a blade dn.
    InternalRestart { chassis: String, blade: String },
}

impl LifecycleEvent {
    fn label(&self) -> &'static str {
        match self {
            LifecycleEvent::Boot => "boot",
            LifecycleEvent::SoftShutdown => "soft shutdown",
            LifecycleEvent::HardShutdown => "hard shutdown",
            LifecycleEvent::Restart => "restart",
            LifecycleEvent::InternalRestart { .. } => "internal restart",
        }
    }
}

/// Match an event message against the known lifecycle patterns, in
/// priority order. No match is normal for most event lines.
fn determine_event(message: &str) -> Option<LifecycleEvent> {
    if message.contains("Power-on") {
        Some(LifecycleEvent::Boot)
    } else if message.contains("Soft shutdown") {
        Some(LifecycleEvent::SoftShutdown)
    } else if message.contains("Hard shutdown") {
        Some(LifecycleEvent::HardShutdown)
    } else if message.contains("Power-cycle") {
        Some(LifecycleEvent::Restart)
    } else if let Some(caps) = ADAPTER_RESTART_RE.captures(message) {
        Some(LifecycleEvent::InternalRestart {
            chassis: caps[1].to_string(),
            blade: caps[2].to_string(),
        })
    } else {
        None
    }
}

/// Subsystem name from the UCS facility code at the third `": "`
/// separated field. `None` means the line is not a UCS syslog message
/// we understand.
fn subsystem(message: &str) -> Option<String> {
    let field = message.split(": ").nth(2)?;
    FACILITY_RE.captures(field).map(|caps| caps[1].to_string())
}

/// Strip backslash-prefixed domain-qualified usernames, unless the
/// message mentions the configured service account itself. Already
/// redacted text has no backslash tokens left, so re-running is a no-op.
fn redact_usernames(message: &str, service_account: &str) -> String {
    if message.contains(service_account) {
        return message.to_string();
    }
    DOMAIN_USER_RE.replace_all(message, "").into_owned()
}

/// The enrichment filter. One instance per pipeline; processes records
/// one at a time, synchronously.
pub struct SyslogFilter {
    config: FilterConfig,
    client: UcsClient,
    registry: Option<Box<dyn HostRegistry>>,
    announced_hosts: HashSet<String>,
    service_account: String,
}

impl SyslogFilter {
    pub fn new(
        config: FilterConfig,
        client: UcsClient,
        registry: Option<Box<dyn HostRegistry>>,
    ) -> Self {
        let service_account = match &config.domain {
            Some(domain) if !domain.is_empty() => format!("{}\\{}", domain, config.username),
            _ => config.username.clone(),
        };
        Self {
            config,
            client,
            registry,
            announced_hosts: HashSet::new(),
            service_account,
        }
    }

    /// Wire up the production transport, file-backed token store and
    /// optional registry from configuration.
    pub fn from_config(config: FilterConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.api_timeout_secs);
        let transport = Arc::new(HttpTransport::new(timeout)?);
        let tokens = TokenManager::new(
            Box::new(FileTokenStore::new(&config.token_file)),
            transport.clone(),
            Credentials {
                domain: config.domain.clone(),
                username: config.username.clone(),
                password_file: config.password_file.clone(),
            },
        );
        let client = UcsClient::new(transport, tokens);
        let registry = match &config.registry_url {
            Some(url) => Some(Box::new(EtcdRegistry::new(url.clone(), timeout)?)
                as Box<dyn HostRegistry>),
            None => None,
        };
        Ok(Self::new(config, client, registry))
    }

    /// Enrich one record in place. Total: never fails the pipeline.
    pub fn process(&mut self, record: &mut Record) {
        record.reset_enrichment_fields();

        let host = record.get(&self.config.ucs_host_name_key).to_string();
        if !host.is_empty() {
            self.announce_host(&host, record);
        }

        let message = redact_usernames(record.get("message"), &self.service_account);
        record.set("message", message.clone());

        // Identity resolution is attempted for every record carrying
        // blade coordinates, whatever its type turns out to be.
        if let Some(coords) = BLADE_RE.find(&message) {
            let dn = coords.as_str().to_string();
            self.resolve_machine_id(record, &host, &dn);
        }

        let Some(subsystem) = subsystem(&message) else {
            // Not a UCS line we understand; leave the fields blank.
            return;
        };
        match subsystem.as_str() {
            "EVENT" => self.classify_event(record, &host, &message),
            "AUDIT" => {
                record.set("type", "audit");
                record.set("severity", "info");
            }
            _ => self.classify_fault(record, &host, &message),
        }
    }

    fn classify_event(&self, record: &mut Record, host: &str, message: &str) {
        record.set("type", "event");
        record.set("severity", "info");

        if let Some(caps) = STAGE_RE.captures(message) {
            record.set("stage", caps[1].to_lowercase());
        }

        let Some(event) = determine_event(message) else {
            return;
        };
        record.set("event", event.label());

        if let LifecycleEvent::InternalRestart { chassis, blade } = event {
            // UCS emits no FSM stage for adapter restarts; this line is
            // the opening half of the two-message sequence.
            record.set("stage", "begin");
            let dn = format!("sys/chassis-{chassis}/blade-{blade}");
            self.resolve_machine_id(record, host, &dn);
        }
    }

    fn classify_fault(&self, record: &mut Record, host: &str, message: &str) {
        record.set("type", "fault");

        let Some(caps) = FAULT_RE.captures(message) else {
            return;
        };
        let severity = caps[2].to_string();
        let mnemonic = caps[3].to_string();
        let device = caps[4].to_string();
        record.set("severity", severity.as_str());
        record.set("mnemonic", mnemonic.as_str());
        record.set("device", device.as_str());

        // A cleared link-down may be the tail of an internal restart.
        // Completion is re-derived from a live fault count every time,
        // never cached across records.
        if severity == "cleared" && mnemonic == "link-down" {
            if let Some(coords) = BLADE_RE.find(&device) {
                self.check_restart_complete(record, host, coords.as_str());
            }
        }
    }

    /// Probe for outstanding non-cleared link-down faults on the blade.
    /// Zero remaining means the internal restart has concluded.
    fn check_restart_complete(&self, record: &mut Record, host: &str, dn: &str) {
        match self
            .client
            .outstanding_faults(host, dn, "link-down", "cleared")
        {
            Ok(0) => {
                record.set("stage", "end");
                record.set("event", "internal restart");
            }
            Ok(remaining) => {
                debug!(dn, remaining, "link-down faults still outstanding");
            }
            Err(e) => {
                record.append_error(&format!("Error checking outstanding faults: {e}"));
            }
        }
    }

    fn resolve_machine_id(&self, record: &mut Record, host: &str, dn: &str) {
        match self.client.service_profile(host, dn) {
            Ok(profile) if !profile.is_empty() => {
                record.set(
                    "machineId",
                    format!("Cisco_UCS:{}:{}", self.config.coloregion, profile),
                );
            }
            Ok(_) => debug!(dn, "no service profile assigned"),
            Err(e) => record.append_error(&format!("Error getting service profile: {e}")),
        }
    }

    /// Tell the registry about a newly seen host, once per host per
    /// process lifetime. Best-effort only.
    fn announce_host(&mut self, host: &str, record: &mut Record) {
        if self.registry.is_none() || self.announced_hosts.contains(host) {
            return;
        }
        self.announced_hosts.insert(host.to_string());
        if let Some(registry) = &self.registry {
            if let Err(e) = registry.announce(host) {
                warn!(host, "host announcement failed: {e}");
                record.append_error(&format!("Error announcing host to registry: {e}"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subsystem_event() {
        let message = ": 2018 May  3 00:05:36 IST: %UCSM-6-EVENT: [E4195921][8743116][transition][ucs-HANATDIT][] [FSM:BEGIN]: Soft shutdown of server sys/chassis-4/blade-7(FSM:sam:dme:ComputePhysicalSoftShutdown)";
        assert_eq!(subsystem(message).as_deref(), Some("EVENT"));
    }

    #[test]
    fn test_subsystem_fault_mnemonic() {
        let message = ": 2018 May  4 23:04:53 IST: %UCSM-3-LINK_DOWN: [F0283][major][link-down][sys/chassis-4/blade-7/fabric-A/path-3/vc-1494] fc VIF 1494 down";
        assert_eq!(subsystem(message).as_deref(), Some("LINK_DOWN"));
    }

    #[test]
    fn test_subsystem_rejects_non_ucs_line() {
        // The timestamp colons have no trailing space, so the facility
        // code never lands at field index 2 here.
        let message = "2018 Feb  9 21:07:45 GMT: %UCSM-3-LINK_DOWN: [link-down][sys/chassis-4/blade-5/fabric-A/path-3/vc-1518]";
        assert_eq!(subsystem(message), None);
        assert_eq!(subsystem("free-form text with no facility"), None);
    }

    #[test]
    fn test_determine_event_priority_order() {
        assert_eq!(
            determine_event("Power-on of server sys/chassis-1/blade-2"),
            Some(LifecycleEvent::Boot)
        );
        assert_eq!(
            determine_event("Soft shutdown of server"),
            Some(LifecycleEvent::SoftShutdown)
        );
        assert_eq!(
            determine_event("Hard shutdown of server"),
            Some(LifecycleEvent::HardShutdown)
        );
        assert_eq!(
            determine_event("Power-cycle of server"),
            Some(LifecycleEvent::Restart)
        );
        assert_eq!(determine_event("routine transition"), None);
    }

    #[test]
    fn test_determine_event_adapter_restart_coordinates() {
        let event = determine_event("Adapter 4/7/3 restarted").unwrap();
        assert_eq!(
            event,
            LifecycleEvent::InternalRestart {
                chassis: "4".to_string(),
                blade: "7".to_string(),
            }
        );
        assert_eq!(event.label(), "internal restart");
    }

    #[test]
    fn test_redact_strips_foreign_usernames() {
        let message =
            "New user added with username ucs-HANATDI\\test-user.ucs - securityd";
        let redacted = redact_usernames(message, "testDomain\\testUsername");
        assert_eq!(
            redacted,
            "New user added with username ucs-HANATDI - securityd"
        );
    }

    #[test]
    fn test_redact_keeps_service_account() {
        let message =
            "New user added with username testDomain\\testUsername - securityd";
        let redacted = redact_usernames(message, "testDomain\\testUsername");
        assert_eq!(redacted, message);
    }

    #[test]
    fn test_redact_is_idempotent() {
        let message = "login by otherDomain\\some.user and acme\\svc-x done";
        let once = redact_usernames(message, "testDomain\\testUsername");
        let twice = redact_usernames(&once, "testDomain\\testUsername");
        assert_eq!(once, twice);
    }

    #[test]
    fn test_stage_capture_lowercased() {
        let caps = STAGE_RE.captures("[FSM:BEGIN]: Soft shutdown").unwrap();
        assert_eq!(caps[1].to_lowercase(), "begin");
    }

    #[test]
    fn test_blade_regex_multi_digit() {
        assert!(BLADE_RE.is_match("sys/chassis-14/blade-17/fabric-A"));
        assert_eq!(
            BLADE_RE.find("x sys/chassis-14/blade-17/fabric-A").unwrap().as_str(),
            "sys/chassis-14/blade-17"
        );
    }

    #[test]
    fn test_fault_bracket_groups() {
        let message = "[F0305][cleared][insufficiently-equipped][sys/chassis-4/blade-7] Server has insufficient DIMMs";
        let caps = FAULT_RE.captures(message).unwrap();
        assert_eq!(&caps[2], "cleared");
        assert_eq!(&caps[3], "insufficiently-equipped");
        assert_eq!(&caps[4], "sys/chassis-4/blade-7");
    }
}
