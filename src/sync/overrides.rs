//! Field-level overrides applied to a synced document.

use crate::config::ConfigOverrides;
use crate::model::ConfigDocument;

/// Replace every field that is set in `overrides`, including explicit
/// zero and empty values. The DNS block is replaced as a whole.
pub fn apply_overrides(document: &mut ConfigDocument, overrides: &ConfigOverrides) {
    if let Some(port) = overrides.mixed_port {
        document.mixed_port = port;
    }
    if let Some(allow_lan) = overrides.allow_lan {
        document.allow_lan = allow_lan;
    }
    if let Some(bind_address) = &overrides.bind_address {
        document.bind_address = bind_address.clone();
    }
    if let Some(mode) = &overrides.mode {
        document.mode = mode.clone();
    }
    if let Some(log_level) = &overrides.log_level {
        document.log_level = log_level.clone();
    }
    if let Some(controller) = &overrides.external_controller {
        document.external_controller = controller.clone();
    }
    if let Some(dns) = &overrides.dns {
        document.dns = dns.clone();
    }
}
