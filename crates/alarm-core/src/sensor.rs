//! Per-sensor trigger state (spec component: "Sensor state").

/// A hook-switch sensor. `disarm_delay == 0` means the sensor reports but
/// never arms (spec §3: "0 means 'never triggers an alarm' but still emits
/// events; 1 means 'immediate breach'").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sensor {
    pub id: String,
    pub device: Option<String>,
    pub disarm_delay: u32,
    pub triggered: bool,
}

impl Sensor {
    pub fn new(id: impl Into<String>, disarm_delay: u32) -> Sensor {
        Sensor {
            id: id.into(),
            device: None,
            disarm_delay,
            triggered: false,
        }
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Sensor {
        self.device = Some(device.into());
        self
    }
}

/// Resolve a sensor by name first, falling back to its configured device
/// string, per spec §4.2: "if sensor name is supplied use it; else look up
/// by device string."
pub fn resolve<'a>(
    sensors: &'a mut [Sensor],
    sensor_id: Option<&str>,
    device: Option<&str>,
) -> Option<&'a mut Sensor> {
    if let Some(id) = sensor_id {
        if let Some(pos) = sensors.iter().position(|s| s.id == id) {
            return Some(&mut sensors[pos]);
        }
    }
    if let Some(dev) = device {
        if let Some(pos) = sensors.iter().position(|s| s.device.as_deref() == Some(dev)) {
            return Some(&mut sensors[pos]);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_by_name_before_device() {
        let mut sensors = vec![
            Sensor::new("S1", 60).with_device("front-door"),
            Sensor::new("S2", 60).with_device("back-door"),
        ];
        let found = resolve(&mut sensors, Some("S2"), Some("front-door")).unwrap();
        assert_eq!(found.id, "S2");
    }

    #[test]
    fn falls_back_to_device_when_no_name() {
        let mut sensors = vec![Sensor::new("S1", 60).with_device("front-door")];
        let found = resolve(&mut sensors, None, Some("front-door")).unwrap();
        assert_eq!(found.id, "S1");
    }

    #[test]
    fn resolves_to_none_when_unmatched() {
        let mut sensors = vec![Sensor::new("S1", 60)];
        assert!(resolve(&mut sensors, Some("S9"), Some("nowhere")).is_none());
    }
}
