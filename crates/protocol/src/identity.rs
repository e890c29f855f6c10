use serde::{Deserialize, Serialize};

use crate::message::RegistrationBody;

/// Static identity of the device this agent runs on.
///
/// Supplied once at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Stable device identifier (e.g. `TV-ABCD1234`).
    pub id: String,
    pub model: String,
    pub brand: String,
    pub ip: String,
    /// Branch / group the device belongs to.
    pub group_id: String,
}

impl DeviceIdentity {
    /// Body shared by the `register` socket message and the HTTP
    /// registration call.
    pub fn registration_body(&self) -> RegistrationBody {
        RegistrationBody {
            tv_id: self.id.clone(),
            model: self.model.clone(),
            ip: self.ip.clone(),
            modeltv: self.brand.clone(),
            cabangid: self.group_id.clone(),
        }
    }

    /// Whether a command addressed to `target` is meant for this device.
    pub fn is_addressed_by(&self, target: &str) -> bool {
        target == self.id || target == crate::BROADCAST_TARGET
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> DeviceIdentity {
        DeviceIdentity {
            id: "TV-ABCD1234".into(),
            model: "UA43T6500".into(),
            brand: "Samsung".into(),
            ip: "10.0.0.12".into(),
            group_id: "BR-07".into(),
        }
    }

    #[test]
    fn registration_body_maps_wire_fields() {
        let body = identity().registration_body();
        assert_eq!(body.tv_id, "TV-ABCD1234");
        assert_eq!(body.model, "UA43T6500");
        assert_eq!(body.modeltv, "Samsung");
        assert_eq!(body.cabangid, "BR-07");
    }

    #[test]
    fn addressed_by_own_id_or_broadcast() {
        let id = identity();
        assert!(id.is_addressed_by("TV-ABCD1234"));
        assert!(id.is_addressed_by("all"));
        assert!(!id.is_addressed_by("TV-00000000"));
        assert!(!id.is_addressed_by("ALL"));
    }
}
